// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gemini Live dialect: classification keys off the presence of marker
//! sub-objects rather than a type string.

use serde_json::Value;

use super::{ClientKind, ServerKind};

pub fn classify_client(payload: &Value) -> Option<ClientKind> {
    if payload.get("realtimeInput").is_some() {
        return Some(ClientKind::UserAudio);
    }
    if payload.get("setup").is_some() {
        return Some(ClientKind::SessionUpdate);
    }
    if payload.get("toolResponse").is_some() {
        return Some(ClientKind::ToolResponse);
    }
    None
}

pub fn classify_server(payload: &Value) -> Option<ServerKind> {
    if payload.get("toolCall").is_some() {
        return Some(ServerKind::ToolCall);
    }
    let content = payload.get("serverContent")?;
    if content.get("inputTranscription").is_some() {
        return Some(ServerKind::UserTranscript);
    }
    if content.get("outputTranscription").is_some() {
        return Some(ServerKind::ResponseTranscript);
    }
    if content.get("modelTurn").is_some() {
        return Some(ServerKind::ResponseAudio);
    }
    if content.get("generationComplete").is_some()
        || content.get("interrupted").is_some()
        || content.get("turnComplete").is_some()
    {
        return Some(ServerKind::TurnBoundary);
    }
    None
}

pub fn transcript_delta(kind: ServerKind, payload: &Value) -> Option<String> {
    let content = payload.get("serverContent")?;
    let holder = match kind {
        ServerKind::UserTranscript => content.get("inputTranscription")?,
        ServerKind::ResponseTranscript => content.get("outputTranscription")?,
        _ => return None,
    };
    holder.get("text").and_then(|t| t.as_str()).map(str::to_owned)
}
