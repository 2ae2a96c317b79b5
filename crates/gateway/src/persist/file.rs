// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-tree persistence backend.
//!
//! Entity data lives at `{root}/{account}/{entity}/{session}.txt`; record
//! tables are JSON-lines files at `{root}/tables/{table}.jsonl`. Overwrites
//! go through a tmp file + rename; appends rely on the platform's atomic
//! append semantics. One instance is shared process-wide, so table
//! mutations are serialised through a lock.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{record_matches, Persistence, UsageSummary};

pub struct FilePersistence {
    root: PathBuf,
    /// Guards read-modify-write cycles on table files.
    table_lock: Mutex<()>,
}

impl FilePersistence {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), table_lock: Mutex::new(()) }
    }

    fn entity_path(&self, account_id: &str, entity: &str, session_id: &str) -> anyhow::Result<PathBuf> {
        for component in [account_id, entity, session_id] {
            if !safe_component(component) {
                bail!("unsafe storage key component: {component:?}");
            }
        }
        Ok(self.root.join(account_id).join(entity).join(format!("{session_id}.txt")))
    }

    fn table_path(&self, table: &str) -> anyhow::Result<PathBuf> {
        if !safe_component(table) {
            bail!("unsafe table name: {table:?}");
        }
        Ok(self.root.join("tables").join(format!("{table}.jsonl")))
    }

    async fn read_table(&self, table: &str) -> anyhow::Result<Vec<Value>> {
        let path = self.table_path(table)?;
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).context("read table"),
        };
        let mut records = Vec::new();
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(table, err = %e, "skipping malformed table record"),
            }
        }
        Ok(records)
    }

    async fn write_table(&self, table: &str, records: &[Value]) -> anyhow::Result<()> {
        let path = self.table_path(table)?;
        let mut contents = String::new();
        for record in records {
            contents.push_str(&serde_json::to_string(record)?);
            contents.push('\n');
        }
        write_atomic(&path, contents.as_bytes()).await
    }
}

/// Storage key components must not escape the tree.
fn safe_component(s: &str) -> bool {
    !s.is_empty() && s != "." && s != ".." && !s.contains(['/', '\\'])
}

/// Write via tmp file + rename so readers never observe a partial file.
async fn write_atomic(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.context("create storage dir")?;
    }
    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, contents).await.context("write tmp file")?;
    tokio::fs::rename(&tmp_path, path).await.context("rename tmp file")?;
    Ok(())
}

#[async_trait]
impl Persistence for FilePersistence {
    async fn append(
        &self,
        account_id: &str,
        entity: &str,
        session_id: &str,
        content: &str,
    ) -> anyhow::Result<()> {
        let path = self.entity_path(account_id, entity, session_id)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.context("create storage dir")?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .context("open for append")?;
        file.write_all(content.as_bytes()).await.context("append")?;
        file.flush().await.context("flush append")?;
        Ok(())
    }

    async fn overwrite(
        &self,
        account_id: &str,
        entity: &str,
        session_id: &str,
        content: &str,
    ) -> anyhow::Result<()> {
        let path = self.entity_path(account_id, entity, session_id)?;
        write_atomic(&path, content.as_bytes()).await
    }

    async fn read(
        &self,
        account_id: &str,
        entity: &str,
        session_id: &str,
    ) -> anyhow::Result<Option<String>> {
        let path = self.entity_path(account_id, entity, session_id)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).context("read entity"),
        }
    }

    async fn delete(
        &self,
        account_id: &str,
        entity: &str,
        session_id: &str,
    ) -> anyhow::Result<()> {
        let path = self.entity_path(account_id, entity, session_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("delete entity"),
        }
    }

    async fn exists(
        &self,
        account_id: &str,
        entity: &str,
        session_id: &str,
    ) -> anyhow::Result<bool> {
        let path = self.entity_path(account_id, entity, session_id)?;
        Ok(tokio::fs::try_exists(&path).await.unwrap_or(false))
    }

    async fn insert(&self, table: &str, data: Value) -> anyhow::Result<()> {
        let _guard = self.table_lock.lock().await;
        let path = self.table_path(table)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.context("create tables dir")?;
        }
        let mut line = serde_json::to_string(&data)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .context("open table for append")?;
        file.write_all(line.as_bytes()).await.context("append record")?;
        file.flush().await.context("flush record")?;
        Ok(())
    }

    async fn update(&self, table: &str, data: Value, filter: Value) -> anyhow::Result<()> {
        let _guard = self.table_lock.lock().await;
        let mut records = self.read_table(table).await?;
        let fields = match data.as_object() {
            Some(fields) => fields,
            None => bail!("update data must be an object"),
        };
        for record in records.iter_mut() {
            if record_matches(record, &filter) {
                if let Some(target) = record.as_object_mut() {
                    for (key, value) in fields {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        self.write_table(table, &records).await
    }

    async fn read_record(&self, table: &str, filter: Value) -> anyhow::Result<Option<Value>> {
        let records = self.read_table(table).await?;
        Ok(records.into_iter().find(|record| record_matches(record, &filter)))
    }

    async fn delete_record(&self, table: &str, filter: Value) -> anyhow::Result<()> {
        let _guard = self.table_lock.lock().await;
        let mut records = self.read_table(table).await?;
        records.retain(|record| !record_matches(record, &filter));
        self.write_table(table, &records).await
    }

    async fn usage_sum(
        &self,
        account_id: &str,
        from_ms: Option<u64>,
        to_ms: Option<u64>,
    ) -> anyhow::Result<Option<UsageSummary>> {
        let records = self.read_table("usage").await?;
        let mut total: u64 = 0;
        let mut matched = false;
        for record in &records {
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
        Ok(matched.then_some(UsageSummary { total_tokens: total }))
    }

    async fn flush(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn cleanup(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod tests;
