// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON-schema `type` case mapping for tool definitions.
//!
//! OpenAI tool parameters use lowercase schema type tokens (`"object"`,
//! `"string"`); Gemini uses uppercase (`"OBJECT"`, `"STRING"`). Translation
//! rewrites every `type` string in the schema tree, including the
//! `"type": ["string", "null"]` union form.

use serde_json::Value;

/// Rewrite every schema `type` token to uppercase (OpenAI → Gemini).
pub fn uppercase_types(value: &mut Value) {
    map_types(value, &str::to_ascii_uppercase);
}

/// Rewrite every schema `type` token to lowercase (Gemini → OpenAI).
pub fn lowercase_types(value: &mut Value) {
    map_types(value, &str::to_ascii_lowercase);
}

fn map_types(value: &mut Value, f: &dyn Fn(&str) -> String) {
    match value {
        Value::Object(map) => {
            for (key, v) in map.iter_mut() {
                if key == "type" {
                    match v {
                        Value::String(s) => {
                            *v = Value::String(f(s));
                            continue;
                        }
                        Value::Array(tokens) => {
                            for token in tokens.iter_mut() {
                                if let Value::String(s) = token {
                                    *token = Value::String(f(s));
                                }
                            }
                            continue;
                        }
                        _ => {}
                    }
                }
                map_types(v, f);
            }
        }
        Value::Array(items) => {
            for item in items {
                map_types(item, f);
            }
        }
        _ => {}
    }
}
