// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reshaping from the Gemini Live dialect into the OpenAI Realtime dialect.

use serde_json::{json, Map, Value};

use crate::extract::{ClientKind, ServerKind};
use crate::translate::schema;

/// Translate a client-originated Gemini event into OpenAI shape.
pub fn client(kind: ClientKind, payload: &Value) -> Vec<Value> {
    match kind {
        ClientKind::UserAudio => user_audio(payload).into_iter().collect(),
        ClientKind::SessionUpdate => vec![session_update(payload)],
        ClientKind::ToolResponse => tool_response(payload),
    }
}

/// Translate a server-originated Gemini event into OpenAI shape.
pub fn server(kind: ServerKind, payload: &Value) -> Vec<Value> {
    match kind {
        ServerKind::UserTranscript => transcription_text(payload, "inputTranscription")
            .map(|text| {
                json!({"type": "conversation.item.input_audio_transcription.delta", "delta": text})
            })
            .into_iter()
            .collect(),
        ServerKind::ResponseTranscript => transcription_text(payload, "outputTranscription")
            .map(|text| json!({"type": "response.audio_transcript.delta", "delta": text}))
            .into_iter()
            .collect(),
        ServerKind::ResponseAudio => model_turn_audio(payload)
            .map(|data| json!({"type": "response.audio.delta", "delta": data}))
            .into_iter()
            .collect(),
        ServerKind::ToolCall => tool_calls(payload),
        ServerKind::TurnBoundary => turn_boundary(payload).into_iter().collect(),
    }
}

fn user_audio(payload: &Value) -> Option<Value> {
    let input = payload.get("realtimeInput")?;
    let data = input
        .get("audio")
        .and_then(|a| a.get("data"))
        .or_else(|| {
            // Older Gemini clients send audio as the first media chunk.
            input.get("mediaChunks").and_then(|c| c.get(0)).and_then(|c| c.get("data"))
        })
        .and_then(|d| d.as_str())?;
    Some(json!({"type": "input_audio_buffer.append", "audio": data}))
}

/// A Gemini `setup` becomes an OpenAI `session.update`.
fn session_update(payload: &Value) -> Value {
    let empty = Map::new();
    let setup = payload.get("setup").and_then(|s| s.as_object()).unwrap_or(&empty);

    let mut session = Map::new();
    if let Some(model) = setup.get("model") {
        session.insert("model".to_owned(), model.clone());
    }
    if let Some(parts) = setup
        .get("systemInstruction")
        .and_then(|si| si.get("parts"))
        .and_then(|p| p.as_array())
    {
        let texts: Vec<&str> =
            parts.iter().filter_map(|p| p.get("text").and_then(|t| t.as_str())).collect();
        if !texts.is_empty() {
            session.insert("instructions".to_owned(), json!(texts.join("\n")));
        }
    }
    if let Some(temperature) =
        setup.get("generationConfig").and_then(|g| g.get("temperature"))
    {
        session.insert("temperature".to_owned(), temperature.clone());
    }
    let declarations: Vec<Value> = setup
        .get("tools")
        .and_then(|t| t.as_array())
        .map(|tools| {
            tools
                .iter()
                .filter_map(|t| t.get("functionDeclarations").and_then(|d| d.as_array()))
                .flatten()
                .filter_map(openai_tool)
                .collect()
        })
        .unwrap_or_default();
    if !declarations.is_empty() {
        session.insert("tools".to_owned(), Value::Array(declarations));
    }

    json!({"type": "session.update", "session": session})
}

/// One Gemini function declaration → one OpenAI tool definition, with
/// schema type tokens lowercased.
fn openai_tool(declaration: &Value) -> Option<Value> {
    let name = declaration.get("name").and_then(|n| n.as_str())?;
    let mut tool = Map::new();
    tool.insert("type".to_owned(), json!("function"));
    tool.insert("name".to_owned(), json!(name));
    if let Some(description) = declaration.get("description") {
        tool.insert("description".to_owned(), description.clone());
    }
    if let Some(parameters) = declaration.get("parameters") {
        let mut parameters = parameters.clone();
        schema::lowercase_types(&mut parameters);
        tool.insert("parameters".to_owned(), parameters);
    }
    Some(Value::Object(tool))
}

/// One `conversation.item.create` per function response; the structured
/// response becomes a JSON-encoded `output` string.
fn tool_response(payload: &Value) -> Vec<Value> {
    let responses = payload
        .get("toolResponse")
        .and_then(|t| t.get("functionResponses"))
        .and_then(|r| r.as_array());
    let Some(responses) = responses else {
        return Vec::new();
    };
    responses
        .iter()
        .map(|response| {
            let id = response.get("id").and_then(|i| i.as_str()).unwrap_or("");
            let output = response
                .get("response")
                .map(|r| serde_json::to_string(r).unwrap_or_default())
                .unwrap_or_default();
            json!({
                "type": "conversation.item.create",
                "item": {"type": "function_call_output", "call_id": id, "output": output}
            })
        })
        .collect()
}

/// One `response.output_item.done` per function call; `args` becomes a
/// JSON-encoded `arguments` string.
fn tool_calls(payload: &Value) -> Vec<Value> {
    let calls =
        payload.get("toolCall").and_then(|t| t.get("functionCalls")).and_then(|c| c.as_array());
    let Some(calls) = calls else {
        return Vec::new();
    };
    calls
        .iter()
        .map(|call| {
            let id = call.get("id").and_then(|i| i.as_str()).unwrap_or("");
            let name = call.get("name").and_then(|n| n.as_str()).unwrap_or("");
            let arguments = call
                .get("args")
                .map(|a| serde_json::to_string(a).unwrap_or_default())
                .unwrap_or_else(|| "{}".to_owned());
            json!({
                "type": "response.output_item.done",
                "item": {
                    "type": "function_call",
                    "call_id": id,
                    "name": name,
                    "arguments": arguments
                }
            })
        })
        .collect()
}

/// `generationComplete`/`interrupted` carry the boundary; the trailing
/// `turnComplete` is swallowed so one turn yields one `response.done`.
fn turn_boundary(payload: &Value) -> Option<Value> {
    let content = payload.get("serverContent")?;
    if content.get("generationComplete").is_some() {
        return Some(json!({"type": "response.done", "response": {"status": "completed"}}));
    }
    if content.get("interrupted").is_some() {
        return Some(json!({"type": "response.done", "response": {"status": "cancelled"}}));
    }
    None
}

fn transcription_text<'a>(payload: &'a Value, field: &str) -> Option<&'a str> {
    payload
        .get("serverContent")
        .and_then(|c| c.get(field))
        .and_then(|t| t.get("text"))
        .and_then(|t| t.as_str())
}

fn model_turn_audio(payload: &Value) -> Option<&str> {
    payload
        .get("serverContent")
        .and_then(|c| c.get("modelTurn"))
        .and_then(|t| t.get("parts"))
        .and_then(|p| p.as_array())?
        .iter()
        .find_map(|part| part.get("inlineData").and_then(|d| d.get("data")).and_then(|d| d.as_str()))
}
