// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Account key lookup for handshake authentication.
//!
//! Keys come from the process-global `accountId=key` configuration string
//! first; on a miss they fall back to the persistence-backed `accounts`
//! table, when record storage is available.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;

use crate::persist::Persistence;

pub struct AccountManager {
    static_keys: HashMap<String, String>,
    persistence: Option<Arc<dyn Persistence>>,
}

impl AccountManager {
    pub fn new(account_keys: &str, persistence: Option<Arc<dyn Persistence>>) -> Self {
        Self { static_keys: parse_account_keys(account_keys), persistence }
    }

    /// Resolve the signing key for an account, or `None` if unknown.
    pub async fn lookup(&self, account_id: &str) -> Option<String> {
        if let Some(key) = self.static_keys.get(account_id) {
            return Some(key.clone());
        }
        let persistence = self.persistence.as_ref()?;
        match persistence.read_record("accounts", json!({"account_id": account_id})).await {
            Ok(record) => record
                .and_then(|r| r.get("key").and_then(|k| k.as_str()).map(str::to_owned)),
            Err(e) => {
                tracing::error!(account_id, err = %e, "account lookup failed");
                None
            }
        }
    }
}

/// Parse a comma-separated `accountId=key` configuration string. Malformed
/// pairs are skipped.
fn parse_account_keys(raw: &str) -> HashMap<String, String> {
    let mut keys = HashMap::new();
    for pair in raw.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        match pair.split_once('=') {
            Some((id, key)) if !id.is_empty() && !key.is_empty() => {
                keys.insert(id.to_owned(), key.to_owned());
            }
            _ => tracing::warn!(pair, "skipping malformed account key pair"),
        }
    }
    keys
}

#[cfg(test)]
#[path = "accounts_tests.rs"]
mod tests;
