// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event classification: maps a vendor-shape payload onto one of a fixed
//! set of semantic buckets, and dispatches to a registered callback.
//!
//! Exactly one callback (or none) fires per `extract` call. Unknown payload
//! shapes are logged at debug and dropped — the gateway never rejects them.

pub mod gemini;
pub mod openai;

use serde_json::Value;

use crate::event::{ApiStyle, Event};

/// Semantic buckets for client-originated events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKind {
    UserAudio,
    SessionUpdate,
    ToolResponse,
}

/// Semantic buckets for server-originated events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerKind {
    UserTranscript,
    ResponseTranscript,
    ResponseAudio,
    ToolCall,
    TurnBoundary,
}

/// Callback registered on an extractor slot. Owned by the extractor; the
/// back-edge to whatever registered it is broken by `cleanup`.
pub type EventCallback = Box<dyn FnMut(&Event) + Send>;

/// Classify a client-originated payload in the given dialect.
pub fn classify_client(style: ApiStyle, payload: &Value) -> Option<ClientKind> {
    match style {
        ApiStyle::OpenAi => openai::classify_client(payload),
        ApiStyle::Gemini => gemini::classify_client(payload),
    }
}

/// Classify a server-originated payload in the given dialect.
pub fn classify_server(style: ApiStyle, payload: &Value) -> Option<ServerKind> {
    match style {
        ApiStyle::OpenAi => openai::classify_server(payload),
        ApiStyle::Gemini => gemini::classify_server(payload),
    }
}

/// Pull the transcript delta text out of a user/response transcript event.
pub fn transcript_delta(style: ApiStyle, kind: ServerKind, payload: &Value) -> Option<String> {
    match style {
        ApiStyle::OpenAi => openai::transcript_delta(kind, payload),
        ApiStyle::Gemini => gemini::transcript_delta(kind, payload),
    }
}

/// Dispatches client-originated events (`user_audio`, `session_update`,
/// `tool_response`) for one dialect.
pub struct ClientEventsExtractor {
    style: ApiStyle,
    on_user_audio: Option<EventCallback>,
    on_session_update: Option<EventCallback>,
    on_tool_response: Option<EventCallback>,
}

impl ClientEventsExtractor {
    pub fn new(style: ApiStyle) -> Self {
        Self { style, on_user_audio: None, on_session_update: None, on_tool_response: None }
    }

    pub fn style(&self) -> ApiStyle {
        self.style
    }

    pub fn on_user_audio(&mut self, cb: EventCallback) {
        self.on_user_audio = Some(cb);
    }

    pub fn on_session_update(&mut self, cb: EventCallback) {
        self.on_session_update = Some(cb);
    }

    pub fn on_tool_response(&mut self, cb: EventCallback) {
        self.on_tool_response = Some(cb);
    }

    pub fn register(&mut self, kind: ClientKind, cb: EventCallback) {
        match kind {
            ClientKind::UserAudio => self.on_user_audio(cb),
            ClientKind::SessionUpdate => self.on_session_update(cb),
            ClientKind::ToolResponse => self.on_tool_response(cb),
        }
    }

    /// Classify `event` and fire the matching callback, if registered.
    pub fn extract(&mut self, event: &Event) {
        let slot = match classify_client(self.style, &event.payload) {
            Some(ClientKind::UserAudio) => &mut self.on_user_audio,
            Some(ClientKind::SessionUpdate) => &mut self.on_session_update,
            Some(ClientKind::ToolResponse) => &mut self.on_tool_response,
            None => {
                tracing::debug!(style = %self.style, "unrecognised client event shape, dropping");
                return;
            }
        };
        if let Some(cb) = slot {
            cb(event);
        }
    }

    /// Release all registered callbacks.
    pub fn cleanup(&mut self) {
        self.on_user_audio = None;
        self.on_session_update = None;
        self.on_tool_response = None;
    }
}

/// Dispatches server-originated events (`user_transcript`,
/// `response_transcript`, `response_audio`, `tool_call`, `turn_boundary`)
/// for one dialect.
pub struct ServerEventsExtractor {
    style: ApiStyle,
    on_user_transcript: Option<EventCallback>,
    on_response_transcript: Option<EventCallback>,
    on_response_audio: Option<EventCallback>,
    on_tool_call: Option<EventCallback>,
    on_turn_boundary: Option<EventCallback>,
}

impl ServerEventsExtractor {
    pub fn new(style: ApiStyle) -> Self {
        Self {
            style,
            on_user_transcript: None,
            on_response_transcript: None,
            on_response_audio: None,
            on_tool_call: None,
            on_turn_boundary: None,
        }
    }

    pub fn style(&self) -> ApiStyle {
        self.style
    }

    pub fn on_user_transcript(&mut self, cb: EventCallback) {
        self.on_user_transcript = Some(cb);
    }

    pub fn on_response_transcript(&mut self, cb: EventCallback) {
        self.on_response_transcript = Some(cb);
    }

    pub fn on_response_audio(&mut self, cb: EventCallback) {
        self.on_response_audio = Some(cb);
    }

    pub fn on_tool_call(&mut self, cb: EventCallback) {
        self.on_tool_call = Some(cb);
    }

    pub fn on_turn_boundary(&mut self, cb: EventCallback) {
        self.on_turn_boundary = Some(cb);
    }

    pub fn register(&mut self, kind: ServerKind, cb: EventCallback) {
        match kind {
            ServerKind::UserTranscript => self.on_user_transcript(cb),
            ServerKind::ResponseTranscript => self.on_response_transcript(cb),
            ServerKind::ResponseAudio => self.on_response_audio(cb),
            ServerKind::ToolCall => self.on_tool_call(cb),
            ServerKind::TurnBoundary => self.on_turn_boundary(cb),
        }
    }

    /// Classify `event` and fire the matching callback, if registered.
    pub fn extract(&mut self, event: &Event) {
        let slot = match classify_server(self.style, &event.payload) {
            Some(ServerKind::UserTranscript) => &mut self.on_user_transcript,
            Some(ServerKind::ResponseTranscript) => &mut self.on_response_transcript,
            Some(ServerKind::ResponseAudio) => &mut self.on_response_audio,
            Some(ServerKind::ToolCall) => &mut self.on_tool_call,
            Some(ServerKind::TurnBoundary) => &mut self.on_turn_boundary,
            None => {
                tracing::debug!(style = %self.style, "unrecognised server event shape, dropping");
                return;
            }
        };
        if let Some(cb) = slot {
            cb(event);
        }
    }

    /// Release all registered callbacks.
    pub fn cleanup(&mut self) {
        self.on_user_transcript = None;
        self.on_response_transcript = None;
        self.on_response_audio = None;
        self.on_tool_call = None;
        self.on_turn_boundary = None;
    }
}

#[cfg(test)]
#[path = "extract_tests.rs"]
mod tests;
