// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! voxgate: a real-time voice-AI switching gateway.
//!
//! Clients stream audio and events over one WebSocket in either the OpenAI
//! Realtime or Gemini Live dialect; the gateway routes to either vendor,
//! translating both directions live, and fails over to the alternate vendor
//! mid-conversation when latency degrades — replaying the merged session
//! config and prior transcript so the conversation continues coherently.

pub mod accounts;
pub mod bus;
pub mod config;
pub mod error;
pub mod event;
pub mod extract;
pub mod persist;
pub mod provider;
pub mod session;
pub mod state;
pub mod translate;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::accounts::AccountManager;
use crate::config::GatewayConfig;
use crate::persist::file::FilePersistence;
use crate::persist::Persistence;
use crate::state::GatewayState;
use crate::transport::build_router;

/// Run the gateway until shutdown.
pub async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let persistence: Arc<dyn Persistence> =
        Arc::new(FilePersistence::new(config.storage_dir.clone()));
    let accounts = AccountManager::new(&config.account_keys, Some(Arc::clone(&persistence)));
    let state = Arc::new(GatewayState::new(config, accounts, persistence, shutdown.clone()));

    tracing::info!("voxgate listening on {addr}");
    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}
