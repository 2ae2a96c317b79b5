// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Latency-driven switch controller.
//!
//! Consumes latency samples from the current provider; when the last `N`
//! samples all exceed the threshold (strictly), requests a switch to the
//! other vendor. Clearing the leaving provider's history on switch forces a
//! full fresh window before a reverse switch can fire.

use std::collections::HashMap;

use crate::config::GatewayConfig;
use crate::event::Provider;
use crate::provider::LatencySample;

/// Samples retained per provider. The decision only ever looks at the last
/// `N`, so the window just bounds memory.
const HISTORY_CAP: usize = 64;

/// Threshold policy, lifted from the global config.
#[derive(Debug, Clone, Copy)]
pub struct SwitchPolicy {
    pub threshold_ms: u64,
    pub failures: usize,
}

impl SwitchPolicy {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self { threshold_ms: config.latency_threshold_ms, failures: config.latency_failures }
    }
}

pub struct SwitchController {
    policy: SwitchPolicy,
    current: Provider,
    history: HashMap<Provider, Vec<u64>>,
}

impl SwitchController {
    pub fn new(initial: Provider, policy: SwitchPolicy) -> Self {
        Self { policy, current: initial, history: HashMap::new() }
    }

    pub fn current(&self) -> Provider {
        self.current
    }

    /// Record a sample. Returns the swap target when the threshold policy
    /// fires, updating the current provider and clearing the history of the
    /// provider being left.
    pub fn add_stats(&mut self, sample: &LatencySample) -> Option<Provider> {
        let history = self.history.entry(sample.provider).or_default();
        history.push(sample.latency_ms);
        if history.len() > HISTORY_CAP {
            let excess = history.len() - HISTORY_CAP;
            history.drain(..excess);
        }

        if sample.provider != self.current {
            return None;
        }
        let n = self.policy.failures;
        if n == 0 || history.len() < n {
            return None;
        }
        let degraded =
            history[history.len() - n..].iter().all(|latency| *latency > self.policy.threshold_ms);
        if !degraded {
            return None;
        }

        let target = self.current.other();
        tracing::info!(
            from = %self.current,
            to = %target,
            threshold_ms = self.policy.threshold_ms,
            window = n,
            "latency policy fired, requesting provider switch"
        );
        history.clear();
        self.current = target;
        Some(target)
    }
}

#[cfg(test)]
#[path = "switch_tests.rs"]
mod tests;
