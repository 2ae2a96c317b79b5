// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client-facing WebSocket handler: handshake authentication, pipeline
//! instantiation, and the per-session event loop.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::GatewayError;
use crate::event::ApiStyle;
use crate::provider::connection::ProviderSignal;
use crate::provider::{ConnectionTimings, ProviderEndpoints};
use crate::session::pipeline::{Pipeline, SessionParams};
use crate::session::switch::SwitchPolicy;
use crate::state::{GatewayState, SessionHandle};
use crate::transport::auth;

/// Query parameters for the session handshake.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayWsQuery {
    pub rs_accid: Option<String>,
    pub rs_u_sessid: Option<String>,
    /// `HMAC-SHA256(key, session_id)`, hex lowercase.
    pub rs_auth: Option<String>,
    /// Client dialect tag; defaults to `OPENAI`.
    pub rs_api: Option<String>,
    /// Initial provider tag; defaults to the client dialect.
    pub rs_core: Option<String>,
}

/// `GET /ws` — WebSocket upgrade for a gateway session.
pub async fn ws_handler(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<GatewayWsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let (Some(account_id), Some(session_id), Some(presented)) =
        (query.rs_accid.clone(), query.rs_u_sessid.clone(), query.rs_auth.clone())
    else {
        return GatewayError::MissingParams
            .to_http_response("rs_accid, rs_u_sessid, and rs_auth are required")
            .into_response();
    };

    let Some(key) = state.accounts.lookup(&account_id).await else {
        tracing::warn!(%account_id, "handshake for unknown account");
        return GatewayError::Forbidden.to_http_response("forbidden").into_response();
    };
    if !auth::verify_session_token(&key, &session_id, &presented) {
        tracing::warn!(%account_id, %session_id, "handshake authentication failed");
        return GatewayError::Forbidden.to_http_response("forbidden").into_response();
    }

    let style = match query.rs_api.as_deref() {
        None => ApiStyle::OpenAi,
        Some(tag) => match ApiStyle::parse(tag) {
            Some(style) => style,
            None => {
                return GatewayError::BadRequest
                    .to_http_response("unknown rs_api tag")
                    .into_response()
            }
        },
    };
    let provider = match query.rs_core.as_deref() {
        None => style,
        Some(tag) => match ApiStyle::parse(tag) {
            Some(provider) => provider,
            None => {
                return GatewayError::BadRequest
                    .to_http_response("unknown rs_core tag")
                    .into_response()
            }
        },
    };

    let params = SessionParams { style, provider, account_id, session_id };
    ws.on_upgrade(move |socket| handle_session(socket, state, params)).into_response()
}

enum Step {
    Client(Value),
    Signal(ProviderSignal),
    Downstream(String),
    Stop,
}

/// Per-session event loop. Everything the pipeline dispatches runs on this
/// task, so no two session event handlers ever execute concurrently.
async fn handle_session(socket: WebSocket, state: Arc<GatewayState>, params: SessionParams) {
    tracing::info!(
        session_id = %params.session_id,
        account_id = %params.account_id,
        style = %params.style,
        provider = %params.provider,
        "session started"
    );
    state
        .register_session(
            &params.session_id,
            SessionHandle {
                account_id: params.account_id.clone(),
                style: params.style,
                provider: params.provider,
                started_at: Instant::now(),
            },
        )
        .await;

    let (downstream_tx, mut downstream_rx) = mpsc::unbounded_channel::<String>();
    let mut pipeline = Pipeline::new(
        params.clone(),
        downstream_tx,
        Arc::clone(&state.persistence),
        ProviderEndpoints::from_config(&state.config),
        ConnectionTimings::from_config(&state.config),
        SwitchPolicy::from_config(&state.config),
    );

    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        let step = tokio::select! {
            _ = state.shutdown.cancelled() => Step::Stop,

            out = downstream_rx.recv() => match out {
                Some(text) => Step::Downstream(text),
                None => Step::Stop,
            },

            signal = pipeline.next_signal() => match signal {
                Some(signal) => Step::Signal(signal),
                None => Step::Stop,
            },

            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => match serde_json::from_str(&text) {
                    Ok(payload) => Step::Client(payload),
                    Err(e) => {
                        tracing::error!(
                            session_id = %params.session_id,
                            err = %e,
                            "malformed client frame, dropping"
                        );
                        continue;
                    }
                },
                Some(Ok(Message::Close(_))) | None => Step::Stop,
                Some(Err(e)) => {
                    tracing::debug!(session_id = %params.session_id, err = %e, "client socket error");
                    Step::Stop
                }
                _ => continue, // ping/pong/binary
            },
        };

        match step {
            Step::Client(payload) => pipeline.receive_event(payload),
            Step::Signal(signal) => pipeline.handle_signal(signal).await,
            Step::Downstream(text) => {
                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            Step::Stop => break,
        }
    }

    pipeline.cleanup();
    state.remove_session(&params.session_id).await;
    tracing::info!(session_id = %params.session_id, "session ended");
}
