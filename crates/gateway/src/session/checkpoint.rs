// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conversation checkpointing: buffers user/agent transcript deltas and
//! appends them to durable conversation storage.
//!
//! Writes never block the audio hot path: flushes reset the buffer
//! immediately and hand the serialised chunk to a per-session writer task,
//! which appends through the shared persistence handle in order. At most
//! the last un-flushed buffer (≤ the flush threshold) is lost on a crash.

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};

use crate::bus::BusNode;
use crate::event::{ApiStyle, Event};
use crate::extract::{self, ServerEventsExtractor, ServerKind};
use crate::persist::Persistence;

/// Buffered characters above which a flush is scheduled.
const FLUSH_THRESHOLD_CHARS: usize = 200;

/// Conversation log entry kinds, as written to storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    User,
    Agent,
    AgentSummary,
    AgentCheckpoint,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
            Self::AgentSummary => "agent_summary",
            Self::AgentCheckpoint => "agent_checkpoint",
        }
    }
}

/// In-memory transcript buffer. Contiguous same-kind deltas concatenate
/// with no separator; a kind change introduces one newline and a fresh
/// `kind:` prefix.
#[derive(Default)]
pub struct TranscriptBuffer {
    current_kind: Option<EntryKind>,
    chunks: Vec<String>,
    total_chars: usize,
}

impl TranscriptBuffer {
    pub fn push(&mut self, kind: EntryKind, delta: &str) {
        if self.current_kind == Some(kind) && !self.chunks.is_empty() {
            self.chunks.push(delta.to_owned());
        } else {
            if !self.chunks.is_empty() {
                self.chunks.push("\n".to_owned());
            }
            self.chunks.push(format!("{}:{}", kind.as_str(), delta));
            self.current_kind = Some(kind);
        }
        self.total_chars += delta.len();
    }

    pub fn should_flush(&self) -> bool {
        self.total_chars > FLUSH_THRESHOLD_CHARS
    }

    /// Serialise and reset. `None` when nothing is buffered.
    pub fn take(&mut self) -> Option<String> {
        self.current_kind = None;
        self.total_chars = 0;
        if self.chunks.is_empty() {
            return None;
        }
        let joined = self.chunks.concat();
        self.chunks.clear();
        Some(joined)
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn total_chars(&self) -> usize {
        self.total_chars
    }
}

enum WriterCommand {
    Append(String),
    /// Ack once every previously queued append has been persisted.
    Sync(oneshot::Sender<()>),
}

/// Observes server-side events in the session's own dialect and persists
/// the user/agent transcript. Audio, tool calls, and turn boundaries flow
/// through the pipeline but are not logged.
pub struct Checkpointer {
    extractor: Mutex<ServerEventsExtractor>,
    buffer: Arc<Mutex<TranscriptBuffer>>,
    writer_tx: mpsc::UnboundedSender<WriterCommand>,
    persistence: Arc<dyn Persistence>,
    /// File-backed persistence owned by this session alone is closed on
    /// cleanup; the process-wide singleton is left open.
    exclusive_persistence: bool,
}

impl Checkpointer {
    pub fn new(
        style: ApiStyle,
        account_id: &str,
        session_id: &str,
        persistence: Arc<dyn Persistence>,
        exclusive_persistence: bool,
    ) -> Self {
        let buffer: Arc<Mutex<TranscriptBuffer>> = Arc::new(Mutex::new(TranscriptBuffer::default()));
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        tokio::spawn(writer_loop(
            account_id.to_owned(),
            session_id.to_owned(),
            Arc::clone(&persistence),
            writer_rx,
        ));

        let mut extractor = ServerEventsExtractor::new(style);
        for (server_kind, entry_kind) in [
            (ServerKind::UserTranscript, EntryKind::User),
            (ServerKind::ResponseTranscript, EntryKind::Agent),
        ] {
            let buffer = Arc::clone(&buffer);
            let writer_tx = writer_tx.clone();
            extractor.register(
                server_kind,
                Box::new(move |event: &Event| {
                    let Some(delta) = extract::transcript_delta(event.src, server_kind, &event.payload)
                    else {
                        return;
                    };
                    push_delta(&buffer, &writer_tx, entry_kind, &delta);
                }),
            );
        }

        Self {
            extractor: Mutex::new(extractor),
            buffer,
            writer_tx,
            persistence,
            exclusive_persistence,
        }
    }

    /// Schedule a flush of whatever is buffered. Non-blocking.
    pub fn flush(&self) {
        let chunk = self.buffer.lock().ok().and_then(|mut buffer| buffer.take());
        if let Some(chunk) = chunk {
            let _ = self.writer_tx.send(WriterCommand::Append(chunk));
        }
    }

    /// Flush, write a checkpoint marker entry, flush again. Non-blocking.
    pub fn create_checkpoint(&self, reason: Option<&str>) {
        self.flush();
        let stamp = chrono::Utc::now().to_rfc3339();
        let text = format!("Checkpoint: {} - {}", reason.unwrap_or("manual"), stamp);
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.push(EntryKind::AgentCheckpoint, &text);
        }
        self.flush();
    }

    /// Wait until every append scheduled so far has reached persistence.
    pub async fn sync(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.writer_tx.send(WriterCommand::Sync(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Fire-and-forget final flush, release extractor callbacks, and close
    /// per-session exclusive persistence. Idempotent.
    pub fn cleanup(&self) {
        self.flush();
        if let Ok(mut extractor) = self.extractor.lock() {
            extractor.cleanup();
        }
        if self.exclusive_persistence {
            let persistence = Arc::clone(&self.persistence);
            tokio::spawn(async move {
                if let Err(e) = persistence.cleanup().await {
                    tracing::warn!(err = %e, "persistence cleanup failed");
                }
            });
        }
    }
}

impl BusNode for Checkpointer {
    fn receive(&self, event: &Event) {
        if let Ok(mut extractor) = self.extractor.lock() {
            extractor.extract(event);
        }
    }
}

fn push_delta(
    buffer: &Arc<Mutex<TranscriptBuffer>>,
    writer_tx: &mpsc::UnboundedSender<WriterCommand>,
    kind: EntryKind,
    delta: &str,
) {
    let chunk = {
        let Ok(mut buffer) = buffer.lock() else { return };
        buffer.push(kind, delta);
        if buffer.should_flush() {
            buffer.take()
        } else {
            None
        }
    };
    if let Some(chunk) = chunk {
        let _ = writer_tx.send(WriterCommand::Append(chunk));
    }
}

async fn writer_loop(
    account_id: String,
    session_id: String,
    persistence: Arc<dyn Persistence>,
    mut rx: mpsc::UnboundedReceiver<WriterCommand>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            WriterCommand::Append(chunk) => {
                if let Err(e) =
                    persistence.append(&account_id, "conversations", &session_id, &chunk).await
                {
                    tracing::error!(%session_id, err = %e, "transcript append failed");
                }
            }
            WriterCommand::Sync(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

#[cfg(test)]
#[path = "checkpoint_tests.rs"]
mod tests;
