// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reshaping from the OpenAI Realtime dialect into the Gemini Live dialect.

use serde_json::{json, Map, Value};

use crate::extract::{ClientKind, ServerKind};
use crate::translate::schema;

/// Translate a client-originated OpenAI event into Gemini shape.
pub fn client(kind: ClientKind, payload: &Value) -> Vec<Value> {
    match kind {
        ClientKind::UserAudio => user_audio(payload).into_iter().collect(),
        ClientKind::SessionUpdate => vec![session_update(payload)],
        ClientKind::ToolResponse => tool_response(payload).into_iter().collect(),
    }
}

/// Translate a server-originated OpenAI event into Gemini shape.
pub fn server(kind: ServerKind, payload: &Value) -> Vec<Value> {
    match kind {
        ServerKind::UserTranscript => delta_text(payload)
            .map(|text| json!({"serverContent": {"inputTranscription": {"text": text}}}))
            .into_iter()
            .collect(),
        ServerKind::ResponseTranscript => delta_text(payload)
            .map(|text| json!({"serverContent": {"outputTranscription": {"text": text}}}))
            .into_iter()
            .collect(),
        ServerKind::ResponseAudio => delta_text(payload)
            .map(|data| {
                json!({
                    "serverContent": {
                        "modelTurn": {
                            "parts": [{"inlineData": {"mimeType": "audio/pcm", "data": data}}]
                        }
                    }
                })
            })
            .into_iter()
            .collect(),
        ServerKind::ToolCall => tool_call(payload).into_iter().collect(),
        ServerKind::TurnBoundary => turn_boundary(payload),
    }
}

fn user_audio(payload: &Value) -> Option<Value> {
    let audio = payload.get("audio").and_then(|a| a.as_str())?;
    Some(json!({
        "realtimeInput": {"audio": {"mimeType": "audio/pcm", "data": audio}}
    }))
}

/// `session.update` becomes a Gemini `setup`. The `voice` field has no
/// Gemini counterpart and is dropped silently.
fn session_update(payload: &Value) -> Value {
    let empty = Map::new();
    let session = payload.get("session").and_then(|s| s.as_object()).unwrap_or(&empty);

    let mut setup = Map::new();
    if let Some(model) = session.get("model") {
        setup.insert("model".to_owned(), model.clone());
    }
    if let Some(instructions) = session.get("instructions").and_then(|i| i.as_str()) {
        setup.insert(
            "systemInstruction".to_owned(),
            json!({"parts": [{"text": instructions}]}),
        );
    }
    if let Some(temperature) = session.get("temperature") {
        setup.insert("generationConfig".to_owned(), json!({"temperature": temperature}));
    }
    if let Some(tools) = session.get("tools").and_then(|t| t.as_array()) {
        let declarations: Vec<Value> = tools.iter().filter_map(function_declaration).collect();
        if !declarations.is_empty() {
            setup.insert("tools".to_owned(), json!([{"functionDeclarations": declarations}]));
        }
    }

    json!({"setup": setup})
}

/// One OpenAI tool definition → one Gemini function declaration, with
/// schema type tokens uppercased.
fn function_declaration(tool: &Value) -> Option<Value> {
    let name = tool.get("name").and_then(|n| n.as_str())?;
    let mut declaration = Map::new();
    declaration.insert("name".to_owned(), json!(name));
    if let Some(description) = tool.get("description") {
        declaration.insert("description".to_owned(), description.clone());
    }
    if let Some(parameters) = tool.get("parameters") {
        let mut parameters = parameters.clone();
        schema::uppercase_types(&mut parameters);
        declaration.insert("parameters".to_owned(), parameters);
    }
    Some(Value::Object(declaration))
}

/// `function_call_output` carries no tool name in the OpenAI dialect, so
/// the Gemini side gets `name: ""`. The `output` JSON string is parsed
/// back into a structured response where possible.
fn tool_response(payload: &Value) -> Option<Value> {
    let item = payload.get("item")?;
    let call_id = item.get("call_id").and_then(|c| c.as_str()).unwrap_or("");
    let response = match item.get("output") {
        Some(Value::String(raw)) => {
            serde_json::from_str::<Value>(raw).unwrap_or_else(|_| json!({"result": raw}))
        }
        Some(other) => other.clone(),
        None => json!({}),
    };
    Some(json!({
        "toolResponse": {
            "functionResponses": [{"id": call_id, "name": "", "response": response}]
        }
    }))
}

fn tool_call(payload: &Value) -> Option<Value> {
    let item = payload.get("item")?;
    let call_id = item.get("call_id").and_then(|c| c.as_str()).unwrap_or("");
    let name = item.get("name").and_then(|n| n.as_str()).unwrap_or("");
    let args = match item.get("arguments").and_then(|a| a.as_str()) {
        Some(raw) => serde_json::from_str::<Value>(raw).unwrap_or_else(|_| json!({})),
        None => json!({}),
    };
    Some(json!({
        "toolCall": {"functionCalls": [{"id": call_id, "name": name, "args": args}]}
    }))
}

/// A terminal `response.done` maps onto the Gemini boundary sequence:
/// `generationComplete` (or `interrupted` on cancel), then `turnComplete`.
fn turn_boundary(payload: &Value) -> Vec<Value> {
    let status =
        payload.get("response").and_then(|r| r.get("status")).and_then(|s| s.as_str());
    let boundary = match status {
        Some("completed") => json!({"serverContent": {"generationComplete": true}}),
        Some("cancelled") => json!({"serverContent": {"interrupted": true}}),
        _ => return Vec::new(),
    };
    vec![boundary, json!({"serverContent": {"turnComplete": true}})]
}

fn delta_text(payload: &Value) -> Option<&str> {
    payload.get("delta").and_then(|d| d.as_str())
}
