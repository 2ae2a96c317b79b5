// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use super::*;
use crate::persist::memory::MemoryPersistence;
use crate::provider::{LatencySample, ProviderEndpoint};
use crate::state::epoch_ms;

/// A scriptable in-process vendor: collects every frame the gateway sends
/// upstream and pushes canned frames back.
struct FakeVendor {
    port: u16,
    received: mpsc::UnboundedReceiver<Value>,
    send_tx: mpsc::UnboundedSender<String>,
}

impl FakeVendor {
    async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let (recv_tx, received) = mpsc::unbounded_channel();
        let (send_tx, mut send_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else { return };
                let Ok(ws) = tokio_tungstenite::accept_async(stream).await else { continue };
                let (mut ws_tx, mut ws_rx) = ws.split();
                loop {
                    tokio::select! {
                        msg = ws_rx.next() => match msg {
                            Some(Ok(Message::Text(text))) => {
                                if let Ok(value) = serde_json::from_str(&text) {
                                    let _ = recv_tx.send(value);
                                }
                            }
                            Some(Ok(_)) => {}
                            _ => break,
                        },
                        out = send_rx.recv() => match out {
                            Some(text) => {
                                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                                    break;
                                }
                            }
                            None => return,
                        },
                    }
                }
            }
        });

        Self { port, received, send_tx }
    }

    fn endpoint(&self) -> ProviderEndpoint {
        ProviderEndpoint { url: format!("ws://127.0.0.1:{}", self.port), api_key: None }
    }

    fn push(&self, payload: Value) {
        let _ = self.send_tx.send(payload.to_string());
    }

    async fn next_received(&mut self) -> Value {
        tokio::time::timeout(Duration::from_secs(5), self.received.recv())
            .await
            .expect("timed out waiting for upstream frame")
            .expect("vendor channel closed")
    }
}

fn test_timings() -> ConnectionTimings {
    ConnectionTimings {
        connect_timeout: Duration::from_secs(1),
        ping_interval: Duration::from_secs(60),
        reconnect_max_backoff: Duration::from_millis(200),
        reconnect_max_attempts: 3,
    }
}

fn build_pipeline(
    style: ApiStyle,
    provider: Provider,
    openai: ProviderEndpoint,
    gemini: ProviderEndpoint,
    persistence: Arc<dyn Persistence>,
) -> (Pipeline, mpsc::UnboundedReceiver<String>) {
    let params = SessionParams {
        style,
        provider,
        account_id: "acc".to_owned(),
        session_id: "sess".to_owned(),
    };
    let (downstream_tx, downstream_rx) = mpsc::unbounded_channel();
    let pipeline = Pipeline::new(
        params,
        downstream_tx,
        persistence,
        ProviderEndpoints::new(openai, gemini),
        test_timings(),
        SwitchPolicy { threshold_ms: 500, failures: 3 },
    );
    (pipeline, downstream_rx)
}

/// Drain signals until the provider reports connected (handling everything
/// along the way, replay included).
async fn pump_until_connected(pipeline: &mut Pipeline) {
    loop {
        let signal = tokio::time::timeout(Duration::from_secs(5), pipeline.next_signal())
            .await
            .expect("timed out waiting for Connected")
            .expect("signal channel closed");
        let connected = matches!(signal, ProviderSignal::Connected);
        pipeline.handle_signal(signal).await;
        if connected {
            return;
        }
    }
}

/// Drain signals until `n` inbound provider events have been dispatched.
async fn pump_inbound(pipeline: &mut Pipeline, mut n: usize) {
    while n > 0 {
        let signal = tokio::time::timeout(Duration::from_secs(5), pipeline.next_signal())
            .await
            .expect("timed out waiting for Inbound")
            .expect("signal channel closed");
        if matches!(signal, ProviderSignal::Inbound(_)) {
            n -= 1;
        }
        pipeline.handle_signal(signal).await;
    }
}

async fn next_downstream(rx: &mut mpsc::UnboundedReceiver<String>) -> Value {
    let text = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for downstream frame")
        .expect("downstream channel closed");
    serde_json::from_str(&text).expect("downstream frame is JSON")
}

fn degraded(provider: Provider) -> ProviderSignal {
    ProviderSignal::Latency(LatencySample {
        timestamp_ms: epoch_ms(),
        latency_ms: 600,
        provider,
    })
}

// ── Scenario: identity pipeline (A, A) ────────────────────────────────

#[tokio::test]
async fn identity_pipeline_passes_events_through_unchanged() {
    let mut vendor = FakeVendor::spawn().await;
    let persistence = Arc::new(MemoryPersistence::new());
    let (mut pipeline, mut downstream_rx) = build_pipeline(
        ApiStyle::OpenAi,
        Provider::OpenAi,
        vendor.endpoint(),
        FakeVendor::spawn().await.endpoint(),
        Arc::clone(&persistence) as _,
    );

    pump_until_connected(&mut pipeline).await;

    let update = json!({"type": "session.update", "session": {"voice": "x", "instructions": "hi"}});
    pipeline.receive_event(update.clone());
    assert_eq!(vendor.next_received().await, update);

    vendor.push(json!({"type": "response.audio_transcript.delta", "delta": "he"}));
    vendor.push(json!({"type": "response.audio_transcript.delta", "delta": "llo"}));
    vendor.push(json!({"type": "response.done", "response": {"status": "completed"}}));
    pump_inbound(&mut pipeline, 3).await;

    assert_eq!(
        next_downstream(&mut downstream_rx).await,
        json!({"type": "response.audio_transcript.delta", "delta": "he"})
    );
    assert_eq!(
        next_downstream(&mut downstream_rx).await,
        json!({"type": "response.audio_transcript.delta", "delta": "llo"})
    );
    assert_eq!(
        next_downstream(&mut downstream_rx).await,
        json!({"type": "response.done", "response": {"status": "completed"}})
    );

    pipeline.checkpointer().flush();
    pipeline.checkpointer().sync().await;
    assert_eq!(
        persistence.read("acc", "conversations", "sess").await.unwrap(),
        Some("agent:hello".to_owned())
    );

    pipeline.cleanup();
}

// ── Scenario: cross translation (A, B) ────────────────────────────────

#[tokio::test]
async fn cross_pipeline_translates_both_directions() {
    let mut vendor = FakeVendor::spawn().await;
    let persistence = Arc::new(MemoryPersistence::new());
    let (mut pipeline, mut downstream_rx) = build_pipeline(
        ApiStyle::OpenAi,
        Provider::Gemini,
        FakeVendor::spawn().await.endpoint(),
        vendor.endpoint(),
        persistence,
    );

    pump_until_connected(&mut pipeline).await;

    pipeline.receive_event(json!({
        "type": "session.update",
        "session": {
            "instructions": "hi",
            "tools": [{
                "type": "function",
                "name": "f",
                "parameters": {"type": "object", "properties": {"x": {"type": "string"}}}
            }]
        }
    }));

    let setup = vendor.next_received().await;
    assert_eq!(setup["setup"]["systemInstruction"]["parts"][0]["text"], "hi");
    let declaration = &setup["setup"]["tools"][0]["functionDeclarations"][0];
    assert_eq!(declaration["parameters"]["type"], "OBJECT");
    assert_eq!(declaration["parameters"]["properties"]["x"]["type"], "STRING");

    vendor.push(json!({"serverContent": {"inputTranscription": {"text": "yo"}}}));
    pump_inbound(&mut pipeline, 1).await;
    assert_eq!(
        next_downstream(&mut downstream_rx).await,
        json!({"type": "conversation.item.input_audio_transcription.delta", "delta": "yo"})
    );

    pipeline.cleanup();
}

// ── Scenario: merge then swap ─────────────────────────────────────────

#[tokio::test]
async fn merge_then_swap_replays_the_merged_config_first() {
    let mut openai_vendor = FakeVendor::spawn().await;
    let mut gemini_vendor = FakeVendor::spawn().await;
    let persistence = Arc::new(MemoryPersistence::new());
    let (mut pipeline, _downstream_rx) = build_pipeline(
        ApiStyle::OpenAi,
        Provider::OpenAi,
        openai_vendor.endpoint(),
        gemini_vendor.endpoint(),
        persistence,
    );

    pump_until_connected(&mut pipeline).await;

    pipeline
        .receive_event(json!({"type": "session.update", "session": {"voice": "a", "instructions": "i"}}));
    pipeline.receive_event(json!({"type": "session.update", "session": {"voice": "b"}}));
    let _ = openai_vendor.next_received().await;
    let _ = openai_vendor.next_received().await;

    // Three degraded probes on the current provider trigger the swap.
    for _ in 0..3 {
        pipeline.handle_signal(degraded(Provider::OpenAi)).await;
    }
    assert_eq!(pipeline.current_provider(), Provider::Gemini);

    // Anything the client sends mid-swap is dropped, not queued.
    pipeline.receive_event(json!({"type": "input_audio_buffer.append", "audio": "AAAA"}));

    pump_until_connected(&mut pipeline).await;

    // The first frame the new vendor sees must be the merged config.
    let first = gemini_vendor.next_received().await;
    let text = first["setup"]["systemInstruction"]["parts"][0]["text"].as_str().unwrap();
    assert!(text.starts_with('i'), "instructions should lead the replayed setup: {text:?}");
    // voice has no Gemini representation and is dropped silently.
    assert!(first["setup"].get("voice").is_none());

    pipeline.cleanup();
}

// ── Scenario: conversation replay ─────────────────────────────────────

#[tokio::test]
async fn prior_conversation_rides_along_on_reconnect() {
    let mut openai_vendor = FakeVendor::spawn().await;
    let mut gemini_vendor = FakeVendor::spawn().await;
    let persistence = Arc::new(MemoryPersistence::new());
    persistence.append("acc", "conversations", "sess", "user:hello\nagent:hi").await.unwrap();

    let (mut pipeline, _downstream_rx) = build_pipeline(
        ApiStyle::OpenAi,
        Provider::OpenAi,
        openai_vendor.endpoint(),
        gemini_vendor.endpoint(),
        Arc::clone(&persistence) as _,
    );

    pump_until_connected(&mut pipeline).await;
    pipeline.receive_event(json!({"type": "session.update", "session": {"instructions": "i"}}));
    let _ = openai_vendor.next_received().await;

    // Force a reconnect replay by swapping away and pumping the new
    // connection: the first frame the new vendor sees must carry the
    // stored transcript inside the replayed instructions.
    pipeline.perform_swap(Provider::Gemini);
    pump_until_connected(&mut pipeline).await;

    let first = gemini_vendor.next_received().await;
    let text = first["setup"]["systemInstruction"]["parts"][0]["text"].as_str().unwrap();
    assert!(text.starts_with('i'));
    assert!(text.contains("user:hello\nagent:hi"));

    pipeline.cleanup();
}

// ── Cleanup ───────────────────────────────────────────────────────────

#[tokio::test]
async fn cleanup_is_idempotent_and_silences_the_graph() {
    let mut vendor = FakeVendor::spawn().await;
    let persistence = Arc::new(MemoryPersistence::new());
    let (mut pipeline, _downstream_rx) = build_pipeline(
        ApiStyle::OpenAi,
        Provider::OpenAi,
        vendor.endpoint(),
        FakeVendor::spawn().await.endpoint(),
        persistence,
    );

    pump_until_connected(&mut pipeline).await;

    pipeline.cleanup();
    pipeline.cleanup();

    // Events after cleanup go nowhere.
    pipeline.receive_event(json!({"type": "session.update", "session": {"voice": "x"}}));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(vendor.received.try_recv().is_err());
}
