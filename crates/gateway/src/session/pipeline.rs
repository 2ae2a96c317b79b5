// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-session pipeline: wires the config store, translators, provider
//! connection, checkpointer, and switch into one graph, and owns the swap
//! transaction that replaces the vendor mid-conversation.
//!
//! All event dispatch runs on the session's own task: the WebSocket handler
//! feeds client frames into `receive_event` and drains provider signals
//! through `next_signal`/`handle_signal`. A swap executes synchronously
//! between events, so no handler ever observes a half-rewired graph.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::bus::BusNode;
use crate::event::{ApiStyle, Event, Provider};
use crate::persist::Persistence;
use crate::provider::connection::{ProviderConnection, ProviderSignal};
use crate::provider::{ConnectionTimings, ProviderEndpoints};
use crate::session::checkpoint::Checkpointer;
use crate::session::config_store::SessionConfigStore;
use crate::session::switch::{SwitchController, SwitchPolicy};
use crate::translate::{translator_pair, ClientTranslator, ServerTranslator};

/// Identity of one gateway session.
#[derive(Debug, Clone)]
pub struct SessionParams {
    /// Dialect the client speaks. Fixed for the session's lifetime.
    pub style: ApiStyle,
    /// Initial upstream vendor; may differ from `style`.
    pub provider: Provider,
    pub account_id: String,
    pub session_id: String,
}

/// Bus node that serialises events onto the client's WebSocket writer.
pub struct DownstreamSink {
    tx: mpsc::UnboundedSender<String>,
}

impl DownstreamSink {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }
}

impl BusNode for DownstreamSink {
    fn receive(&self, event: &Event) {
        match serde_json::to_string(&event.payload) {
            Ok(text) => {
                let _ = self.tx.send(text);
            }
            Err(e) => {
                tracing::error!(err = %e, "failed to serialise downstream event");
            }
        }
    }
}

pub struct Pipeline {
    params: SessionParams,
    current_provider: Provider,
    endpoints: ProviderEndpoints,
    timings: ConnectionTimings,
    config_store: Arc<SessionConfigStore>,
    checkpointer: Arc<Checkpointer>,
    switch: SwitchController,
    client_translator: Arc<ClientTranslator>,
    server_translator: Arc<ServerTranslator>,
    connection: Arc<ProviderConnection>,
    downstream: Arc<DownstreamSink>,
    signal_rx: mpsc::UnboundedReceiver<ProviderSignal>,
    cleaned_up: bool,
}

impl Pipeline {
    pub fn new(
        params: SessionParams,
        downstream_tx: mpsc::UnboundedSender<String>,
        persistence: Arc<dyn Persistence>,
        endpoints: ProviderEndpoints,
        timings: ConnectionTimings,
        policy: SwitchPolicy,
    ) -> Self {
        let config_store = Arc::new(SessionConfigStore::new(
            params.style,
            &params.account_id,
            &params.session_id,
            Arc::clone(&persistence),
        ));
        // The checkpointer observes events in the client's dialect,
        // regardless of which vendor is currently upstream.
        let checkpointer = Arc::new(Checkpointer::new(
            params.style,
            &params.account_id,
            &params.session_id,
            persistence,
            false,
        ));
        let switch = SwitchController::new(params.provider, policy);
        let (client_translator, server_translator) = translator_pair(params.style, params.provider);
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let connection = Arc::new(ProviderConnection::connect(
            params.provider,
            endpoints.get(params.provider).clone(),
            timings,
            signal_tx,
        ));
        let downstream = Arc::new(DownstreamSink::new(downstream_tx));

        let pipeline = Self {
            current_provider: params.provider,
            params,
            endpoints,
            timings,
            config_store,
            checkpointer,
            switch,
            client_translator,
            server_translator,
            connection,
            downstream,
            signal_rx,
            cleaned_up: false,
        };
        pipeline.wire();
        pipeline
    }

    /// ConfigStore → ClientTranslator → ProviderConnection, and
    /// ServerTranslator → {downstream sink, Checkpointer}.
    fn wire(&self) {
        self.config_store.subscribe(Arc::clone(&self.client_translator) as Arc<dyn BusNode>);
        self.client_translator.subscribe(Arc::clone(&self.connection) as Arc<dyn BusNode>);
        self.server_translator.subscribe(Arc::clone(&self.downstream) as Arc<dyn BusNode>);
        self.server_translator.subscribe(Arc::clone(&self.checkpointer) as Arc<dyn BusNode>);
    }

    pub fn current_provider(&self) -> Provider {
        self.current_provider
    }

    pub fn checkpointer(&self) -> &Arc<Checkpointer> {
        &self.checkpointer
    }

    /// Feed one raw client frame into the graph.
    pub fn receive_event(&self, raw: Value) {
        if self.cleaned_up {
            return;
        }
        let event = Event::new(self.params.style, raw);
        self.config_store.receive(&event);
    }

    /// Next notification from the current provider connection. `None` once
    /// the connection is gone for good.
    pub async fn next_signal(&mut self) -> Option<ProviderSignal> {
        self.signal_rx.recv().await
    }

    pub async fn handle_signal(&mut self, signal: ProviderSignal) {
        match signal {
            ProviderSignal::Connected => self.handle_provider_connected().await,
            ProviderSignal::Inbound(event) => self.server_translator.receive(&event),
            ProviderSignal::Latency(sample) => {
                if let Some(target) = self.switch.add_stats(&sample) {
                    self.perform_swap(target);
                }
            }
            ProviderSignal::Lost => {
                tracing::error!(
                    session_id = %self.params.session_id,
                    provider = %self.current_provider,
                    "upstream connection lost for good"
                );
            }
        }
    }

    /// Fires on the first connect and every reconnect, including after a
    /// swap: replay the merged config (plus prior transcript) upstream.
    /// The replay bypasses the config store so it is not re-persisted.
    async fn handle_provider_connected(&self) {
        if let Some(config) = self.config_store.get_for_replay().await {
            tracing::debug!(
                session_id = %self.params.session_id,
                provider = %self.current_provider,
                "replaying session config upstream"
            );
            self.client_translator.receive(&config);
        }
    }

    /// The atomic swap: replace the provider connection and both
    /// translators; the config store, checkpointer, switch, and downstream
    /// sink survive. Runs synchronously between events, so anything the
    /// client sends mid-swap is simply dropped by the closed connection.
    pub fn perform_swap(&mut self, target: Provider) {
        tracing::info!(
            session_id = %self.params.session_id,
            from = %self.current_provider,
            to = %target,
            "swapping provider"
        );

        // Flush buffered transcript and mark the log, so the replay sent to
        // the new vendor carries everything heard so far.
        self.checkpointer.create_checkpoint(Some("provider swap"));

        self.connection.cleanup();
        self.client_translator.cleanup();
        self.server_translator.cleanup();
        self.config_store.unsubscribe_all();

        let (client_translator, server_translator) = translator_pair(self.params.style, target);
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let connection = Arc::new(ProviderConnection::connect(
            target,
            self.endpoints.get(target).clone(),
            self.timings,
            signal_tx,
        ));

        self.client_translator = client_translator;
        self.server_translator = server_translator;
        self.connection = connection;
        self.signal_rx = signal_rx;
        self.current_provider = target;
        self.wire();
        // Replay fires when the new connection's Connected signal arrives.
    }

    /// Tear down every owned component. The downstream socket belongs to
    /// the caller and is left open. Idempotent.
    pub fn cleanup(&mut self) {
        if self.cleaned_up {
            return;
        }
        self.cleaned_up = true;
        self.config_store.cleanup();
        self.connection.cleanup();
        self.server_translator.cleanup();
        self.client_translator.cleanup();
        self.checkpointer.cleanup();
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
