// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent WebSocket connection to one upstream vendor.
//!
//! The connection runs its socket loop in a spawned task and talks to the
//! session task over channels: outbound payloads go in through an mpsc
//! queue, inbound frames / connect notifications / latency samples come
//! back as [`ProviderSignal`]s. An unsolicited close triggers reconnection
//! with exponential backoff; `cleanup` closes for good.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::bus::BusNode;
use crate::event::{Event, Provider};
use crate::provider::{ConnectionTimings, LatencySample, ProviderEndpoint};
use crate::state::epoch_ms;

/// Notifications delivered to the owning session task.
#[derive(Debug)]
pub enum ProviderSignal {
    /// Fired once per successful open, including reconnects.
    Connected,
    /// A parsed inbound frame, tagged with the vendor's dialect.
    Inbound(Event),
    /// A liveness probe round trip completed.
    Latency(LatencySample),
    /// Reconnect attempts are exhausted; the connection is inert.
    Lost,
}

/// Handle to a live (or reconnecting) vendor connection.
pub struct ProviderConnection {
    provider: Provider,
    outbound_tx: mpsc::UnboundedSender<String>,
    open: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl ProviderConnection {
    /// Spawn the socket loop and return the handle. `signal_tx` is the
    /// session's intake for everything this connection produces.
    pub fn connect(
        provider: Provider,
        endpoint: ProviderEndpoint,
        timings: ConnectionTimings,
        signal_tx: mpsc::UnboundedSender<ProviderSignal>,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        tokio::spawn(run_loop(
            provider,
            endpoint,
            timings,
            cancel.clone(),
            Arc::clone(&open),
            signal_tx,
            outbound_rx,
        ));

        Self { provider, outbound_tx, open, cancel }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    /// Self-initiated close: no reconnect, further `receive` calls are
    /// no-ops. Idempotent.
    pub fn cleanup(&self) {
        self.open.store(false, Ordering::Relaxed);
        self.cancel.cancel();
    }
}

impl BusNode for ProviderConnection {
    /// Serialise the payload and queue it for the socket; dropped while the
    /// connection is not open.
    fn receive(&self, event: &Event) {
        if !self.is_open() {
            tracing::debug!(provider = %self.provider, "connection not open, dropping outbound event");
            return;
        }
        match serde_json::to_string(&event.payload) {
            Ok(text) => {
                let _ = self.outbound_tx.send(text);
            }
            Err(e) => {
                tracing::error!(provider = %self.provider, err = %e, "failed to serialise outbound event");
            }
        }
    }
}

impl Drop for ProviderConnection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_loop(
    provider: Provider,
    endpoint: ProviderEndpoint,
    timings: ConnectionTimings,
    cancel: CancellationToken,
    open: Arc<AtomicBool>,
    signal_tx: mpsc::UnboundedSender<ProviderSignal>,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
) {
    let mut backoff_ms = 100u64;
    let mut failures = 0u32;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let request = match build_request(provider, &endpoint) {
            Ok(request) => request,
            Err(e) => {
                tracing::error!(provider = %provider, err = %e, "invalid upstream request");
                let _ = signal_tx.send(ProviderSignal::Lost);
                return;
            }
        };

        match tokio::time::timeout(
            timings.connect_timeout,
            tokio_tungstenite::connect_async(request),
        )
        .await
        {
            Ok(Ok((ws_stream, _response))) => {
                backoff_ms = 100;
                failures = 0;
                open.store(true, Ordering::Relaxed);
                tracing::debug!(provider = %provider, "upstream connected");
                let _ = signal_tx.send(ProviderSignal::Connected);

                let (mut write, mut read) = ws_stream.split();
                let mut ping_timer = tokio::time::interval(timings.ping_interval);
                ping_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            let _ = write.send(Message::Close(None)).await;
                            open.store(false, Ordering::Relaxed);
                            return;
                        }

                        _ = ping_timer.tick() => {
                            let payload = epoch_ms().to_be_bytes().to_vec();
                            if write.send(Message::Ping(payload.into())).await.is_err() {
                                tracing::debug!(provider = %provider, "ping write failed");
                                break;
                            }
                        }

                        msg = read.next() => {
                            match msg {
                                Some(Ok(Message::Text(text))) => {
                                    match serde_json::from_str(&text) {
                                        Ok(payload) => {
                                            let _ = signal_tx.send(ProviderSignal::Inbound(
                                                Event::new(provider, payload),
                                            ));
                                        }
                                        Err(e) => {
                                            tracing::error!(provider = %provider, err = %e, "malformed upstream frame, dropping");
                                        }
                                    }
                                }
                                Some(Ok(Message::Pong(payload))) => {
                                    if let Some(sample) = latency_sample(provider, payload.as_ref()) {
                                        let _ = signal_tx.send(ProviderSignal::Latency(sample));
                                    }
                                }
                                Some(Ok(Message::Close(_))) | None => {
                                    tracing::debug!(provider = %provider, "upstream closed");
                                    break;
                                }
                                Some(Err(e)) => {
                                    tracing::debug!(provider = %provider, err = %e, "upstream read error");
                                    break;
                                }
                                _ => {} // ping/binary ignored
                            }
                        }

                        out = outbound_rx.recv() => {
                            match out {
                                Some(text) => {
                                    if write.send(Message::Text(text.into())).await.is_err() {
                                        tracing::debug!(provider = %provider, "upstream write failed");
                                        break;
                                    }
                                }
                                None => return, // handle dropped
                            }
                        }
                    }
                }

                // Unsolicited close: fall through into the reconnect path.
                open.store(false, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                tracing::warn!(provider = %provider, err = %e, backoff_ms, "upstream connect failed");
            }
            Err(_) => {
                tracing::warn!(provider = %provider, backoff_ms, "upstream connect timed out");
            }
        }

        if cancel.is_cancelled() {
            break;
        }

        failures += 1;
        if failures > timings.reconnect_max_attempts {
            tracing::error!(
                provider = %provider,
                attempts = failures - 1,
                "reconnect attempts exhausted, giving up"
            );
            let _ = signal_tx.send(ProviderSignal::Lost);
            break;
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)) => {}
        }
        backoff_ms = next_backoff(backoff_ms, timings.reconnect_max_backoff.as_millis() as u64);
    }

    open.store(false, Ordering::Relaxed);
}

/// Exponential backoff, doubling up to the configured ceiling.
fn next_backoff(current_ms: u64, max_ms: u64) -> u64 {
    current_ms.saturating_mul(2).min(max_ms)
}

/// Decode the echoed send timestamp from a pong and compute the round trip.
fn latency_sample(provider: Provider, payload: &[u8]) -> Option<LatencySample> {
    let echoed: [u8; 8] = payload.try_into().ok()?;
    let sent_ms = u64::from_be_bytes(echoed);
    let now_ms = epoch_ms();
    Some(LatencySample {
        timestamp_ms: now_ms,
        latency_ms: now_ms.saturating_sub(sent_ms),
        provider,
    })
}

/// Build the vendor handshake request. OpenAI authenticates via headers,
/// Gemini via a `key` query parameter.
fn build_request(
    provider: Provider,
    endpoint: &ProviderEndpoint,
) -> anyhow::Result<tokio_tungstenite::tungstenite::handshake::client::Request> {
    match provider {
        Provider::OpenAi => {
            let mut request =
                endpoint.url.as_str().into_client_request().context("bad upstream url")?;
            if let Some(key) = &endpoint.api_key {
                let bearer: HeaderValue =
                    format!("Bearer {key}").parse().context("bad api key header")?;
                request.headers_mut().insert("Authorization", bearer);
                request
                    .headers_mut()
                    .insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));
            }
            Ok(request)
        }
        Provider::Gemini => {
            let url = match &endpoint.api_key {
                Some(key) => append_query(&endpoint.url, &format!("key={key}")),
                None => endpoint.url.clone(),
            };
            url.as_str().into_client_request().context("bad upstream url")
        }
    }
}

fn append_query(url: &str, param: &str) -> String {
    if url.contains('?') {
        format!("{url}&{param}")
    } else {
        format!("{url}?{param}")
    }
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
