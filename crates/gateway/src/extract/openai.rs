// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OpenAI Realtime dialect: classification keys off the `type` string.

use serde_json::Value;

use super::{ClientKind, ServerKind};

pub fn classify_client(payload: &Value) -> Option<ClientKind> {
    match payload.get("type").and_then(|t| t.as_str())? {
        "input_audio_buffer.append" => Some(ClientKind::UserAudio),
        "session.update" => Some(ClientKind::SessionUpdate),
        "conversation.item.create" => {
            let item_type = payload.get("item").and_then(|i| i.get("type")).and_then(|t| t.as_str());
            if item_type == Some("function_call_output") {
                Some(ClientKind::ToolResponse)
            } else {
                None
            }
        }
        _ => None,
    }
}

pub fn classify_server(payload: &Value) -> Option<ServerKind> {
    match payload.get("type").and_then(|t| t.as_str())? {
        "conversation.item.input_audio_transcription.delta" => Some(ServerKind::UserTranscript),
        "response.audio_transcript.delta" => Some(ServerKind::ResponseTranscript),
        "response.audio.delta" => Some(ServerKind::ResponseAudio),
        "response.output_item.done" => {
            let item_type = payload.get("item").and_then(|i| i.get("type")).and_then(|t| t.as_str());
            if item_type == Some("function_call") {
                Some(ServerKind::ToolCall)
            } else {
                None
            }
        }
        "response.done" => {
            let status = payload
                .get("response")
                .and_then(|r| r.get("status"))
                .and_then(|s| s.as_str());
            match status {
                Some("completed" | "cancelled") => Some(ServerKind::TurnBoundary),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Both transcript deltas carry the text in a top-level `delta` field.
pub fn transcript_delta(kind: ServerKind, payload: &Value) -> Option<String> {
    match kind {
        ServerKind::UserTranscript | ServerKind::ResponseTranscript => {
            payload.get("delta").and_then(|d| d.as_str()).map(str::to_owned)
        }
        _ => None,
    }
}
