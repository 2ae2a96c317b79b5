// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Publish/subscribe primitive for the per-session event graph.
//!
//! One emit, zero-or-more subscribers, delivered synchronously in
//! registration order on the caller's execution context. There is no
//! queueing, deduplication, or ordering relaxation — the session task is
//! the only dispatcher, so delivery order is the wiring order.

use std::sync::{Arc, Mutex};

use crate::event::Event;

/// A node in the per-session event graph.
///
/// `receive` must not panic; a failing node logs and returns so that later
/// subscribers still see the event.
pub trait BusNode: Send + Sync {
    fn receive(&self, event: &Event);
}

/// Ordered fan-out list owned by any node that emits events.
#[derive(Default)]
pub struct Subscribers {
    nodes: Mutex<Vec<Arc<dyn BusNode>>>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. Delivery follows registration order.
    pub fn subscribe(&self, node: Arc<dyn BusNode>) {
        if let Ok(mut nodes) = self.nodes.lock() {
            nodes.push(node);
        }
    }

    /// Deliver `event` to every subscriber, in order, on this call stack.
    pub fn emit(&self, event: &Event) {
        // Snapshot under the lock, deliver outside it, so a subscriber that
        // emits further events does not deadlock on re-entry.
        let snapshot: Vec<Arc<dyn BusNode>> = match self.nodes.lock() {
            Ok(nodes) => nodes.clone(),
            Err(_) => return,
        };
        for node in snapshot {
            node.receive(event);
        }
    }

    /// Drop all subscriber references.
    pub fn cleanup(&self) {
        if let Ok(mut nodes) = self.nodes.lock() {
            nodes.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.lock().map(|n| n.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
