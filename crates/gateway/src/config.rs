// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Configuration for the voxgate gateway.
#[derive(Debug, Clone, clap::Parser)]
pub struct GatewayConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "VOXGATE_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 9700, env = "VOXGATE_PORT")]
    pub port: u16,

    /// Comma-separated `accountId=key` pairs for handshake authentication.
    /// Looked up before the persistence-backed account table.
    #[arg(long, default_value = "", env = "VOXGATE_ACCOUNT_KEYS")]
    pub account_keys: String,

    /// Round-trip latency above which a probe counts as degraded, in ms.
    #[arg(long, default_value_t = 500, env = "VOXGATE_LATENCY_THRESHOLD_MS")]
    pub latency_threshold_ms: u64,

    /// Consecutive degraded probes before failing over to the other vendor.
    #[arg(long, default_value_t = 3, env = "VOXGATE_LATENCY_FAILURES")]
    pub latency_failures: usize,

    /// Liveness probe interval in milliseconds.
    #[arg(long, default_value_t = 5000, env = "VOXGATE_PING_INTERVAL_MS")]
    pub ping_interval_ms: u64,

    /// Upstream connect timeout in milliseconds.
    #[arg(long, default_value_t = 5000, env = "VOXGATE_CONNECT_TIMEOUT_MS")]
    pub connect_timeout_ms: u64,

    /// Maximum reconnect backoff in milliseconds.
    #[arg(long, default_value_t = 30000, env = "VOXGATE_RECONNECT_MAX_BACKOFF_MS")]
    pub reconnect_max_backoff_ms: u64,

    /// Maximum consecutive reconnect attempts before giving up on a vendor.
    #[arg(long, default_value_t = 10, env = "VOXGATE_RECONNECT_MAX_ATTEMPTS")]
    pub reconnect_max_attempts: u32,

    /// Root directory for file-backed persistence.
    #[arg(long, default_value = "./voxgate-data", env = "VOXGATE_STORAGE_DIR")]
    pub storage_dir: std::path::PathBuf,

    /// OpenAI realtime WebSocket URL.
    #[arg(
        long,
        default_value = "wss://api.openai.com/v1/realtime?model=gpt-4o-realtime-preview-2024-12-17",
        env = "VOXGATE_OPENAI_URL"
    )]
    pub openai_url: String,

    /// OpenAI API key.
    #[arg(long, env = "VOXGATE_OPENAI_API_KEY")]
    pub openai_api_key: Option<String>,

    /// Gemini Live WebSocket URL.
    #[arg(
        long,
        default_value = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1alpha.GenerativeService.BidiGenerateContent",
        env = "VOXGATE_GEMINI_URL"
    )]
    pub gemini_url: String,

    /// Gemini API key.
    #[arg(long, env = "VOXGATE_GEMINI_API_KEY")]
    pub gemini_api_key: Option<String>,
}

impl GatewayConfig {
    pub fn ping_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.ping_interval_ms)
    }

    pub fn connect_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnect_max_backoff(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.reconnect_max_backoff_ms)
    }
}
