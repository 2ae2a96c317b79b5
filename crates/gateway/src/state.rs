// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::accounts::AccountManager;
use crate::config::GatewayConfig;
use crate::event::{ApiStyle, Provider};
use crate::persist::Persistence;

/// Shared gateway state.
pub struct GatewayState {
    pub config: GatewayConfig,
    pub accounts: AccountManager,
    /// Process-wide persistence handle, shared by every session.
    pub persistence: Arc<dyn Persistence>,
    pub sessions: RwLock<HashMap<String, SessionHandle>>,
    pub shutdown: CancellationToken,
}

impl GatewayState {
    pub fn new(
        config: GatewayConfig,
        accounts: AccountManager,
        persistence: Arc<dyn Persistence>,
        shutdown: CancellationToken,
    ) -> Self {
        Self { config, accounts, persistence, sessions: RwLock::new(HashMap::new()), shutdown }
    }

    pub async fn register_session(&self, session_id: &str, handle: SessionHandle) {
        self.sessions.write().await.insert(session_id.to_owned(), handle);
    }

    pub async fn remove_session(&self, session_id: &str) {
        self.sessions.write().await.remove(session_id);
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Bookkeeping for one live session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub account_id: String,
    pub style: ApiStyle,
    pub provider: Provider,
    pub started_at: Instant,
}

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
