// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Core event type and vendor dialect tags.

use std::fmt;

use serde_json::Value;

/// Wire dialect spoken by a client or vendor.
///
/// Every event carries the dialect its payload is shaped in; translators
/// convert between dialects, everything else is shape-agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiStyle {
    OpenAi,
    Gemini,
}

/// Upstream vendors are identified by the dialect they speak, so the same
/// tag set names both a wire format and a routing target.
pub type Provider = ApiStyle;

impl ApiStyle {
    /// Parse a wire tag (`rs_api` / `rs_core` query values).
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "OPENAI" => Some(Self::OpenAi),
            "GEMINI" => Some(Self::Gemini),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI",
            Self::Gemini => "GEMINI",
        }
    }

    /// The alternate vendor in a two-provider switch cycle.
    pub fn other(&self) -> Self {
        match self {
            Self::OpenAi => Self::Gemini,
            Self::Gemini => Self::OpenAi,
        }
    }
}

impl fmt::Display for ApiStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An opaque JSON-shaped event tagged with the dialect of its payload.
///
/// The gateway never rejects an unknown payload shape — components read the
/// fields they recognise and pass the rest through untouched.
#[derive(Debug, Clone)]
pub struct Event {
    pub src: ApiStyle,
    pub payload: Value,
}

impl Event {
    pub fn new(src: ApiStyle, payload: Value) -> Self {
        Self { src, payload }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
