// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;

use super::*;
use crate::event::ApiStyle;

// ── OpenAI client classification ──────────────────────────────────────

#[test]
fn openai_client_audio_append() {
    let payload = json!({"type": "input_audio_buffer.append", "audio": "AAAA"});
    assert_eq!(classify_client(ApiStyle::OpenAi, &payload), Some(ClientKind::UserAudio));
}

#[test]
fn openai_client_session_update() {
    let payload = json!({"type": "session.update", "session": {"voice": "x"}});
    assert_eq!(classify_client(ApiStyle::OpenAi, &payload), Some(ClientKind::SessionUpdate));
}

#[test]
fn openai_client_tool_response_requires_function_call_output() {
    let tool = json!({
        "type": "conversation.item.create",
        "item": {"type": "function_call_output", "call_id": "c1", "output": "{}"}
    });
    assert_eq!(classify_client(ApiStyle::OpenAi, &tool), Some(ClientKind::ToolResponse));

    let message = json!({
        "type": "conversation.item.create",
        "item": {"type": "message", "role": "user"}
    });
    assert_eq!(classify_client(ApiStyle::OpenAi, &message), None);
}

#[test]
fn openai_client_unknown_type_is_none() {
    assert_eq!(classify_client(ApiStyle::OpenAi, &json!({"type": "response.create"})), None);
    assert_eq!(classify_client(ApiStyle::OpenAi, &json!({"no_type": true})), None);
}

// ── OpenAI server classification ──────────────────────────────────────

#[test]
fn openai_server_transcript_deltas() {
    let user = json!({"type": "conversation.item.input_audio_transcription.delta", "delta": "yo"});
    assert_eq!(classify_server(ApiStyle::OpenAi, &user), Some(ServerKind::UserTranscript));

    let agent = json!({"type": "response.audio_transcript.delta", "delta": "he"});
    assert_eq!(classify_server(ApiStyle::OpenAi, &agent), Some(ServerKind::ResponseTranscript));
}

#[test]
fn openai_server_audio_delta() {
    let payload = json!({"type": "response.audio.delta", "delta": "b64"});
    assert_eq!(classify_server(ApiStyle::OpenAi, &payload), Some(ServerKind::ResponseAudio));
}

#[test]
fn openai_server_tool_call() {
    let payload = json!({
        "type": "response.output_item.done",
        "item": {"type": "function_call", "call_id": "c", "name": "f", "arguments": "{}"}
    });
    assert_eq!(classify_server(ApiStyle::OpenAi, &payload), Some(ServerKind::ToolCall));

    let other = json!({"type": "response.output_item.done", "item": {"type": "message"}});
    assert_eq!(classify_server(ApiStyle::OpenAi, &other), None);
}

#[test]
fn openai_server_turn_boundary_requires_terminal_status() {
    let done = json!({"type": "response.done", "response": {"status": "completed"}});
    assert_eq!(classify_server(ApiStyle::OpenAi, &done), Some(ServerKind::TurnBoundary));

    let cancelled = json!({"type": "response.done", "response": {"status": "cancelled"}});
    assert_eq!(classify_server(ApiStyle::OpenAi, &cancelled), Some(ServerKind::TurnBoundary));

    let in_progress = json!({"type": "response.done", "response": {"status": "in_progress"}});
    assert_eq!(classify_server(ApiStyle::OpenAi, &in_progress), None);
}

// ── Gemini client classification ──────────────────────────────────────

#[test]
fn gemini_client_markers() {
    let audio = json!({"realtimeInput": {"audio": {"mimeType": "audio/pcm", "data": "AAAA"}}});
    assert_eq!(classify_client(ApiStyle::Gemini, &audio), Some(ClientKind::UserAudio));

    let setup = json!({"setup": {"model": "m"}});
    assert_eq!(classify_client(ApiStyle::Gemini, &setup), Some(ClientKind::SessionUpdate));

    let tool = json!({"toolResponse": {"functionResponses": []}});
    assert_eq!(classify_client(ApiStyle::Gemini, &tool), Some(ClientKind::ToolResponse));

    assert_eq!(classify_client(ApiStyle::Gemini, &json!({"other": 1})), None);
}

// ── Gemini server classification ──────────────────────────────────────

#[test]
fn gemini_server_markers() {
    let user = json!({"serverContent": {"inputTranscription": {"text": "yo"}}});
    assert_eq!(classify_server(ApiStyle::Gemini, &user), Some(ServerKind::UserTranscript));

    let agent = json!({"serverContent": {"outputTranscription": {"text": "hi"}}});
    assert_eq!(classify_server(ApiStyle::Gemini, &agent), Some(ServerKind::ResponseTranscript));

    let audio = json!({"serverContent": {"modelTurn": {"parts": [{"inlineData": {"data": "b"}}]}}});
    assert_eq!(classify_server(ApiStyle::Gemini, &audio), Some(ServerKind::ResponseAudio));

    let call = json!({"toolCall": {"functionCalls": [{"id": "1", "name": "f", "args": {}}]}});
    assert_eq!(classify_server(ApiStyle::Gemini, &call), Some(ServerKind::ToolCall));

    for boundary in ["generationComplete", "interrupted", "turnComplete"] {
        let mut payload = json!({"serverContent": {}});
        payload["serverContent"][boundary] = json!(true);
        assert_eq!(classify_server(ApiStyle::Gemini, &payload), Some(ServerKind::TurnBoundary));
    }

    assert_eq!(classify_server(ApiStyle::Gemini, &json!({"setupComplete": {}})), None);
}

// ── transcript_delta ──────────────────────────────────────────────────

#[test]
fn transcript_delta_per_style() {
    let a = json!({"type": "response.audio_transcript.delta", "delta": "he"});
    assert_eq!(
        transcript_delta(ApiStyle::OpenAi, ServerKind::ResponseTranscript, &a),
        Some("he".to_owned())
    );

    let b = json!({"serverContent": {"inputTranscription": {"text": "yo"}}});
    assert_eq!(
        transcript_delta(ApiStyle::Gemini, ServerKind::UserTranscript, &b),
        Some("yo".to_owned())
    );

    assert_eq!(transcript_delta(ApiStyle::OpenAi, ServerKind::ResponseAudio, &a), None);
}

// ── callback dispatch ─────────────────────────────────────────────────

#[test]
fn exactly_one_callback_fires_per_extract() {
    let mut extractor = ClientEventsExtractor::new(ApiStyle::OpenAi);
    let audio_hits = Arc::new(AtomicUsize::new(0));
    let update_hits = Arc::new(AtomicUsize::new(0));

    let hits = Arc::clone(&audio_hits);
    extractor.on_user_audio(Box::new(move |_| {
        hits.fetch_add(1, Ordering::Relaxed);
    }));
    let hits = Arc::clone(&update_hits);
    extractor.on_session_update(Box::new(move |_| {
        hits.fetch_add(1, Ordering::Relaxed);
    }));

    let event =
        Event::new(ApiStyle::OpenAi, json!({"type": "input_audio_buffer.append", "audio": "x"}));
    extractor.extract(&event);

    assert_eq!(audio_hits.load(Ordering::Relaxed), 1);
    assert_eq!(update_hits.load(Ordering::Relaxed), 0);
}

#[test]
fn unknown_shape_fires_nothing() {
    let mut extractor = ServerEventsExtractor::new(ApiStyle::OpenAi);
    let hits = Arc::new(AtomicUsize::new(0));
    let h = Arc::clone(&hits);
    extractor.on_turn_boundary(Box::new(move |_| {
        h.fetch_add(1, Ordering::Relaxed);
    }));

    extractor.extract(&Event::new(ApiStyle::OpenAi, json!({"type": "session.created"})));
    assert_eq!(hits.load(Ordering::Relaxed), 0);
}

#[test]
fn cleanup_releases_callbacks() {
    let mut extractor = ClientEventsExtractor::new(ApiStyle::OpenAi);
    let hits = Arc::new(AtomicUsize::new(0));
    let h = Arc::clone(&hits);
    extractor.on_session_update(Box::new(move |_| {
        h.fetch_add(1, Ordering::Relaxed);
    }));

    extractor.cleanup();
    extractor.cleanup(); // idempotent

    extractor.extract(&Event::new(ApiStyle::OpenAi, json!({"type": "session.update"})));
    assert_eq!(hits.load(Ordering::Relaxed), 0);
}
