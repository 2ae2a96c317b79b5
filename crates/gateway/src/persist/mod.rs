// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable storage consumed by the session components.
//!
//! Entity data (`"sessions"`, `"conversations"`) is keyed by
//! `(account, entity, session)`; record tables back the account manager and
//! usage accounting. The gateway shares one handle per process by default;
//! persistence failures are logged by callers and never propagate into a
//! running session.

pub mod file;
pub mod memory;

use async_trait::async_trait;
use serde_json::Value;

/// Aggregated token usage for an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageSummary {
    pub total_tokens: u64,
}

#[async_trait]
pub trait Persistence: Send + Sync {
    /// Append `content` to the entity stream. Creates the stream if absent.
    async fn append(
        &self,
        account_id: &str,
        entity: &str,
        session_id: &str,
        content: &str,
    ) -> anyhow::Result<()>;

    /// Replace the entity contents wholesale.
    async fn overwrite(
        &self,
        account_id: &str,
        entity: &str,
        session_id: &str,
        content: &str,
    ) -> anyhow::Result<()>;

    /// Read the full entity contents; `None` when the key was never written.
    async fn read(
        &self,
        account_id: &str,
        entity: &str,
        session_id: &str,
    ) -> anyhow::Result<Option<String>>;

    /// Remove the entity. Removing an absent key is not an error.
    async fn delete(&self, account_id: &str, entity: &str, session_id: &str)
        -> anyhow::Result<()>;

    async fn exists(
        &self,
        account_id: &str,
        entity: &str,
        session_id: &str,
    ) -> anyhow::Result<bool>;

    /// Insert a record into a table.
    async fn insert(&self, table: &str, data: Value) -> anyhow::Result<()>;

    /// Shallow-merge `data` into every record matching `filter`.
    async fn update(&self, table: &str, data: Value, filter: Value) -> anyhow::Result<()>;

    /// Read the first record matching `filter`.
    async fn read_record(&self, table: &str, filter: Value) -> anyhow::Result<Option<Value>>;

    /// Delete every record matching `filter`.
    async fn delete_record(&self, table: &str, filter: Value) -> anyhow::Result<()>;

    /// Sum `total_tokens` over the `usage` table for one account, optionally
    /// bounded to `[from_ms, to_ms]` over the record `ts_ms` field. `None`
    /// when the account has no usage rows in range.
    async fn usage_sum(
        &self,
        account_id: &str,
        from_ms: Option<u64>,
        to_ms: Option<u64>,
    ) -> anyhow::Result<Option<UsageSummary>>;

    async fn flush(&self) -> anyhow::Result<()>;

    async fn cleanup(&self) -> anyhow::Result<()>;
}

/// Whether every field of `filter` matches the same field of `record`.
pub(crate) fn record_matches(record: &Value, filter: &Value) -> bool {
    match filter.as_object() {
        Some(fields) => fields.iter().all(|(key, expected)| record.get(key) == Some(expected)),
        None => false,
    }
}
