// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session configuration capture, merge, persistence, and replay.
//!
//! The store wraps a client-events extractor for the session's own dialect.
//! Every `session_update` the client sends is shallow-merged into the
//! stored config (last writer wins per top-level field of the `session` /
//! `setup` sub-map) and persisted fire-and-forget. On every provider
//! (re-)connect the merged config — enriched with the prior conversation
//! transcript — is replayed upstream.

use std::sync::{Arc, Mutex};

use serde_json::{json, Map, Value};

use crate::bus::{BusNode, Subscribers};
use crate::event::{ApiStyle, Event};
use crate::extract::ClientEventsExtractor;
use crate::persist::Persistence;

/// Sentence prepended to a replayed transcript so the model treats it as
/// context rather than fresh input.
pub const REPLAY_PREFIX: &str = "Here is the prior conversation to continue:";

pub struct SessionConfigStore {
    style: ApiStyle,
    account_id: String,
    session_id: String,
    persistence: Arc<dyn Persistence>,
    config: Arc<Mutex<Option<Event>>>,
    extractor: Mutex<ClientEventsExtractor>,
    subscribers: Arc<Subscribers>,
}

impl SessionConfigStore {
    pub fn new(
        style: ApiStyle,
        account_id: &str,
        session_id: &str,
        persistence: Arc<dyn Persistence>,
    ) -> Self {
        let config: Arc<Mutex<Option<Event>>> = Arc::new(Mutex::new(None));
        let mut extractor = ClientEventsExtractor::new(style);

        {
            let config = Arc::clone(&config);
            let persistence = Arc::clone(&persistence);
            let account_id = account_id.to_owned();
            let session_id = session_id.to_owned();
            extractor.on_session_update(Box::new(move |event: &Event| {
                let merged = {
                    let Ok(mut stored) = config.lock() else { return };
                    match stored.as_mut() {
                        None => {
                            *stored = Some(event.clone());
                            event.payload.clone()
                        }
                        Some(existing) => {
                            merge_session_update(event.src, &mut existing.payload, &event.payload);
                            existing.payload.clone()
                        }
                    }
                };
                persist_config(&persistence, &account_id, &session_id, &merged);
            }));
        }

        let store = Self {
            style,
            account_id: account_id.to_owned(),
            session_id: session_id.to_owned(),
            persistence,
            config,
            extractor: Mutex::new(extractor),
            subscribers: Arc::new(Subscribers::new()),
        };
        store.spawn_initial_load();
        store
    }

    /// Non-blocking load of a previously persisted config. A config merged
    /// in before the load completes wins.
    fn spawn_initial_load(&self) {
        let persistence = Arc::clone(&self.persistence);
        let config = Arc::clone(&self.config);
        let account_id = self.account_id.clone();
        let session_id = self.session_id.clone();
        let style = self.style;
        tokio::spawn(async move {
            match persistence.read(&account_id, "sessions", &session_id).await {
                Ok(Some(text)) => match serde_json::from_str::<Value>(&text) {
                    Ok(payload) => {
                        if let Ok(mut stored) = config.lock() {
                            if stored.is_none() {
                                *stored = Some(Event::new(style, payload));
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(%session_id, err = %e, "persisted session config is malformed");
                    }
                },
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(%session_id, err = %e, "failed to load session config");
                }
            }
        });
    }

    pub fn subscribe(&self, node: Arc<dyn BusNode>) {
        self.subscribers.subscribe(node);
    }

    /// Drop all subscriber references (used when the swap rewires the graph).
    pub fn unsubscribe_all(&self) {
        self.subscribers.cleanup();
    }

    /// Snapshot of the stored config, if any.
    pub fn current(&self) -> Option<Event> {
        self.config.lock().ok().and_then(|stored| stored.clone())
    }

    /// Reload the merged config from persistence (to catch cross-instance
    /// writes), then clone it with the prior conversation transcript
    /// appended to the instructions field. `None` when no `session_update`
    /// was ever seen.
    pub async fn get_for_replay(&self) -> Option<Event> {
        match self.persistence.read(&self.account_id, "sessions", &self.session_id).await {
            Ok(Some(text)) => match serde_json::from_str::<Value>(&text) {
                Ok(payload) => {
                    if let Ok(mut stored) = self.config.lock() {
                        *stored = Some(Event::new(self.style, payload));
                    }
                }
                Err(e) => {
                    tracing::warn!(session_id = %self.session_id, err = %e, "persisted session config is malformed");
                }
            },
            Ok(None) => {}
            Err(e) => {
                tracing::error!(session_id = %self.session_id, err = %e, "failed to reload session config");
            }
        }

        let mut replay = self.current()?;

        let transcript =
            match self.persistence.read(&self.account_id, "conversations", &self.session_id).await {
                Ok(Some(text)) if !text.is_empty() => Some(text),
                Ok(_) => None,
                Err(e) => {
                    tracing::error!(session_id = %self.session_id, err = %e, "failed to read prior conversation");
                    None
                }
            };
        if let Some(transcript) = transcript {
            append_transcript(self.style, &mut replay.payload, &transcript);
        }
        Some(replay)
    }

    /// Release the extractor callbacks and all subscriber references.
    pub fn cleanup(&self) {
        if let Ok(mut extractor) = self.extractor.lock() {
            extractor.cleanup();
        }
        self.subscribers.cleanup();
    }
}

impl BusNode for SessionConfigStore {
    /// Extract (capturing any `session_update`), then re-emit the event
    /// unconditionally.
    fn receive(&self, event: &Event) {
        if let Ok(mut extractor) = self.extractor.lock() {
            extractor.extract(event);
        }
        self.subscribers.emit(event);
    }
}

/// The sub-map holding session fields in each dialect.
fn config_key(style: ApiStyle) -> &'static str {
    match style {
        ApiStyle::OpenAi => "session",
        ApiStyle::Gemini => "setup",
    }
}

/// Shallow merge, last writer wins at the sub-map's top level: every field
/// named in `update` replaces the stored field entirely (arrays included);
/// fields absent from `update` are preserved.
pub fn merge_session_update(style: ApiStyle, stored: &mut Value, update: &Value) {
    let key = config_key(style);
    let Some(update_map) = update.get(key).and_then(|u| u.as_object()) else {
        return;
    };
    let Some(stored_map) = stored.as_object_mut() else {
        return;
    };
    let entry = stored_map.entry(key.to_owned()).or_insert_with(|| Value::Object(Map::new()));
    let Some(target) = entry.as_object_mut() else {
        *entry = Value::Object(update_map.clone());
        return;
    };
    for (field, value) in update_map {
        target.insert(field.clone(), value.clone());
    }
}

/// Append the prior transcript to the dialect's instructions field,
/// creating the path as needed.
fn append_transcript(style: ApiStyle, payload: &mut Value, transcript: &str) {
    let addition = format!("\n\n{REPLAY_PREFIX}\n{transcript}");
    match style {
        ApiStyle::OpenAi => {
            let Some(session) = ensure_object(payload, "session") else { return };
            let existing =
                session.get("instructions").and_then(|i| i.as_str()).unwrap_or_default();
            let combined = format!("{existing}{addition}");
            session.insert("instructions".to_owned(), json!(combined));
        }
        ApiStyle::Gemini => {
            let Some(setup) = ensure_object_value(payload, "setup") else { return };
            let Some(instruction) = ensure_object_value(setup, "systemInstruction") else {
                return;
            };
            let Some(instruction_map) = instruction.as_object_mut() else { return };
            let parts =
                instruction_map.entry("parts".to_owned()).or_insert_with(|| json!([]));
            if !parts.is_array() {
                *parts = json!([]);
            }
            let Some(parts) = parts.as_array_mut() else { return };
            if parts.is_empty() {
                parts.push(json!({"text": ""}));
            }
            let Some(first) = parts.first_mut() else { return };
            if !first.is_object() {
                *first = json!({"text": ""});
            }
            let Some(part) = first.as_object_mut() else { return };
            let existing = part.get("text").and_then(|t| t.as_str()).unwrap_or_default();
            let combined = format!("{existing}{addition}");
            part.insert("text".to_owned(), json!(combined));
        }
    }
}

fn ensure_object<'a>(value: &'a mut Value, key: &str) -> Option<&'a mut Map<String, Value>> {
    ensure_object_value(value, key)?.as_object_mut()
}

fn ensure_object_value<'a>(value: &'a mut Value, key: &str) -> Option<&'a mut Value> {
    let map = value.as_object_mut()?;
    let entry = map.entry(key.to_owned()).or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    Some(entry)
}

/// Fire-and-forget persist of the merged config.
fn persist_config(
    persistence: &Arc<dyn Persistence>,
    account_id: &str,
    session_id: &str,
    merged: &Value,
) {
    let text = match serde_json::to_string(merged) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(%session_id, err = %e, "failed to serialise session config");
            return;
        }
    };
    let persistence = Arc::clone(persistence);
    let account_id = account_id.to_owned();
    let session_id = session_id.to_owned();
    tokio::spawn(async move {
        if let Err(e) = persistence.overwrite(&account_id, "sessions", &session_id, &text).await {
            tracing::error!(%session_id, err = %e, "failed to persist session config");
        }
    });
}

#[cfg(test)]
#[path = "config_store_tests.rs"]
mod tests;
