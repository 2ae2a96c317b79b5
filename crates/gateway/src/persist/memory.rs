// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory persistence backend, used by tests and ephemeral deployments.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::{record_matches, Persistence, UsageSummary};

#[derive(Default)]
pub struct MemoryPersistence {
    entities: Mutex<HashMap<(String, String, String), String>>,
    tables: Mutex<HashMap<String, Vec<Value>>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(account_id: &str, entity: &str, session_id: &str) -> (String, String, String) {
        (account_id.to_owned(), entity.to_owned(), session_id.to_owned())
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn append(
        &self,
        account_id: &str,
        entity: &str,
        session_id: &str,
        content: &str,
    ) -> anyhow::Result<()> {
        if let Ok(mut entities) = self.entities.lock() {
            entities
                .entry(Self::key(account_id, entity, session_id))
                .or_default()
                .push_str(content);
        }
        Ok(())
    }

    async fn overwrite(
        &self,
        account_id: &str,
        entity: &str,
        session_id: &str,
        content: &str,
    ) -> anyhow::Result<()> {
        if let Ok(mut entities) = self.entities.lock() {
            entities.insert(Self::key(account_id, entity, session_id), content.to_owned());
        }
        Ok(())
    }

    async fn read(
        &self,
        account_id: &str,
        entity: &str,
        session_id: &str,
    ) -> anyhow::Result<Option<String>> {
        Ok(self
            .entities
            .lock()
            .ok()
            .and_then(|entities| entities.get(&Self::key(account_id, entity, session_id)).cloned()))
    }

    async fn delete(
        &self,
        account_id: &str,
        entity: &str,
        session_id: &str,
    ) -> anyhow::Result<()> {
        if let Ok(mut entities) = self.entities.lock() {
            entities.remove(&Self::key(account_id, entity, session_id));
        }
        Ok(())
    }

    async fn exists(
        &self,
        account_id: &str,
        entity: &str,
        session_id: &str,
    ) -> anyhow::Result<bool> {
        Ok(self
            .entities
            .lock()
            .map(|entities| entities.contains_key(&Self::key(account_id, entity, session_id)))
            .unwrap_or(false))
    }

    async fn insert(&self, table: &str, data: Value) -> anyhow::Result<()> {
        if let Ok(mut tables) = self.tables.lock() {
            tables.entry(table.to_owned()).or_default().push(data);
        }
        Ok(())
    }

    async fn update(&self, table: &str, data: Value, filter: Value) -> anyhow::Result<()> {
        let fields = match data.as_object() {
            Some(fields) => fields.clone(),
            None => anyhow::bail!("update data must be an object"),
        };
        if let Ok(mut tables) = self.tables.lock() {
            if let Some(records) = tables.get_mut(table) {
                for record in records.iter_mut() {
                    if record_matches(record, &filter) {
                        if let Some(target) = record.as_object_mut() {
                            for (key, value) in &fields {
                                target.insert(key.clone(), value.clone());
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn read_record(&self, table: &str, filter: Value) -> anyhow::Result<Option<Value>> {
        Ok(self.tables.lock().ok().and_then(|tables| {
            tables
                .get(table)
                .and_then(|records| {
                    records.iter().find(|record| record_matches(record, &filter)).cloned()
                })
        }))
    }

    async fn delete_record(&self, table: &str, filter: Value) -> anyhow::Result<()> {
        if let Ok(mut tables) = self.tables.lock() {
            if let Some(records) = tables.get_mut(table) {
                records.retain(|record| !record_matches(record, &filter));
            }
        }
        Ok(())
    }

    async fn usage_sum(
        &self,
        account_id: &str,
        from_ms: Option<u64>,
        to_ms: Option<u64>,
    ) -> anyhow::Result<Option<UsageSummary>> {
        let mut total: u64 = 0;
        let mut matched = false;
        if let Ok(tables) = self.tables.lock() {
            for record in tables.get("usage").map(Vec::as_slice).unwrap_or_default() {
                if record.get("account_id").and_then(|a| a.as_str()) != Some(account_id) {
                    continue;
                }
                let ts = record.get("ts_ms").and_then(|t| t.as_u64()).unwrap_or(0);
                if from_ms.is_some_and(|from| ts < from) || to_ms.is_some_and(|to| ts > to) {
                    continue;
                }
                matched = true;
                total += record.get("total_tokens").and_then(|t| t.as_u64()).unwrap_or(0);
            }
        }
        Ok(matched.then_some(UsageSummary { total_tokens: total }))
    }

    async fn flush(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn cleanup(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
