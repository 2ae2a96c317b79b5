// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dialect translation: bus nodes that re-emit events reshaped from one
//! vendor wire format into the other.
//!
//! A translator owns one extractor and registers itself as the target of
//! each extractor callback. When the source and target dialects match, the
//! translator forwards events unchanged. Cross-dialect reshaping lives in
//! pure per-direction functions so it can be tested without any wiring.

pub mod gemini_to_openai;
pub mod openai_to_gemini;
pub mod schema;

use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::bus::{BusNode, Subscribers};
use crate::event::{ApiStyle, Event, Provider};
use crate::extract::{ClientEventsExtractor, ClientKind, ServerEventsExtractor, ServerKind};

/// Reshape a classified client-originated payload from one dialect into the
/// other. Returns zero events when required fields are missing, and may
/// return several (e.g. one tool response per function result).
pub fn translate_client(
    from: ApiStyle,
    to: ApiStyle,
    kind: ClientKind,
    payload: &Value,
) -> Vec<Value> {
    match (from, to) {
        (ApiStyle::OpenAi, ApiStyle::Gemini) => openai_to_gemini::client(kind, payload),
        (ApiStyle::Gemini, ApiStyle::OpenAi) => gemini_to_openai::client(kind, payload),
        _ => vec![payload.clone()],
    }
}

/// Reshape a classified server-originated payload from one dialect into the
/// other.
pub fn translate_server(
    from: ApiStyle,
    to: ApiStyle,
    kind: ServerKind,
    payload: &Value,
) -> Vec<Value> {
    match (from, to) {
        (ApiStyle::OpenAi, ApiStyle::Gemini) => openai_to_gemini::server(kind, payload),
        (ApiStyle::Gemini, ApiStyle::OpenAi) => gemini_to_openai::server(kind, payload),
        _ => vec![payload.clone()],
    }
}

/// Build the translator pair for a session: the client-facing `S→P`
/// translator and the upstream-facing `P→S` translator. Identity
/// translators fall out of `S == P`.
pub fn translator_pair(
    style: ApiStyle,
    provider: Provider,
) -> (Arc<ClientTranslator>, Arc<ServerTranslator>) {
    (
        Arc::new(ClientTranslator::new(style, provider)),
        Arc::new(ServerTranslator::new(provider, style)),
    )
}

/// Translates client-originated events from dialect `from` to dialect `to`.
pub struct ClientTranslator {
    from: ApiStyle,
    to: ApiStyle,
    extractor: Mutex<ClientEventsExtractor>,
    subscribers: Arc<Subscribers>,
}

impl ClientTranslator {
    pub fn new(from: ApiStyle, to: ApiStyle) -> Self {
        let subscribers = Arc::new(Subscribers::new());
        let mut extractor = ClientEventsExtractor::new(from);
        if from != to {
            for kind in [ClientKind::UserAudio, ClientKind::SessionUpdate, ClientKind::ToolResponse]
            {
                let subs = Arc::clone(&subscribers);
                extractor.register(
                    kind,
                    Box::new(move |event: &Event| {
                        for payload in translate_client(from, to, kind, &event.payload) {
                            subs.emit(&Event::new(to, payload));
                        }
                    }),
                );
            }
        }
        Self { from, to, extractor: Mutex::new(extractor), subscribers }
    }

    pub fn subscribe(&self, node: Arc<dyn BusNode>) {
        self.subscribers.subscribe(node);
    }

    /// Release the extractor callbacks and all subscriber references.
    pub fn cleanup(&self) {
        if let Ok(mut extractor) = self.extractor.lock() {
            extractor.cleanup();
        }
        self.subscribers.cleanup();
    }
}

impl BusNode for ClientTranslator {
    fn receive(&self, event: &Event) {
        if self.from == self.to {
            self.subscribers.emit(event);
            return;
        }
        if let Ok(mut extractor) = self.extractor.lock() {
            extractor.extract(event);
        }
    }
}

/// Translates server-originated events from dialect `from` to dialect `to`.
pub struct ServerTranslator {
    from: ApiStyle,
    to: ApiStyle,
    extractor: Mutex<ServerEventsExtractor>,
    subscribers: Arc<Subscribers>,
}

impl ServerTranslator {
    pub fn new(from: ApiStyle, to: ApiStyle) -> Self {
        let subscribers = Arc::new(Subscribers::new());
        let mut extractor = ServerEventsExtractor::new(from);
        if from != to {
            for kind in [
                ServerKind::UserTranscript,
                ServerKind::ResponseTranscript,
                ServerKind::ResponseAudio,
                ServerKind::ToolCall,
                ServerKind::TurnBoundary,
            ] {
                let subs = Arc::clone(&subscribers);
                extractor.register(
                    kind,
                    Box::new(move |event: &Event| {
                        for payload in translate_server(from, to, kind, &event.payload) {
                            subs.emit(&Event::new(to, payload));
                        }
                    }),
                );
            }
        }
        Self { from, to, extractor: Mutex::new(extractor), subscribers }
    }

    pub fn subscribe(&self, node: Arc<dyn BusNode>) {
        self.subscribers.subscribe(node);
    }

    /// Release the extractor callbacks and all subscriber references.
    pub fn cleanup(&self) {
        if let Ok(mut extractor) = self.extractor.lock() {
            extractor.cleanup();
        }
        self.subscribers.cleanup();
    }
}

impl BusNode for ServerTranslator {
    fn receive(&self, event: &Event) {
        if self.from == self.to {
            self.subscribers.emit(event);
            return;
        }
        if let Ok(mut extractor) = self.extractor.lock() {
            extractor.extract(event);
        }
    }
}

#[cfg(test)]
#[path = "translate_tests.rs"]
mod tests;
