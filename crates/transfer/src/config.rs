//! Manager configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Upper bound on the ticker period.
pub const MAX_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Tunables for a [`TransferManager`](crate::TransferManager).
///
/// Every field has a default, so a partial TOML/JSON document is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Timeout applied when a request passes 0. Zero disables timeouts.
    pub default_timeout_secs: u32,

    /// Progress interval applied when a request passes 0.
    /// Zero reports on every tick.
    pub progress_interval_percent: u8,

    /// Ticker period in milliseconds, capped at one second.
    pub tick_interval_ms: u64,

    /// Roots a download destination must live under. Empty allows any
    /// absolute path.
    pub allowed_roots: Vec<PathBuf>,

    /// Downloads landing under one of these roots are handed to the
    /// content registry.
    pub media_roots: Vec<PathBuf>,

    /// Base URI that upload destinations are resolved against.
    pub upload_base_uri: Option<String>,

    /// Largest body `download_to_buffer` will hold in memory.
    pub max_buffer_size: usize,

    /// Read size used when streaming an upload source.
    pub chunk_size: usize,

    /// TCP connect timeout for the HTTP transport.
    pub connect_timeout_secs: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 0,
            progress_interval_percent: 0,
            tick_interval_ms: 1000,
            allowed_roots: Vec::new(),
            media_roots: Vec::new(),
            upload_base_uri: None,
            max_buffer_size: 64 * 1024 * 1024,
            chunk_size: 256 * 1024,
            connect_timeout_secs: 30,
        }
    }
}

impl ManagerConfig {
    /// Effective ticker period: `min(1s, tick_interval_ms)`, never zero.
    pub fn tick_interval(&self) -> Duration {
        let configured = Duration::from_millis(self.tick_interval_ms.max(1));
        configured.min(MAX_TICK_INTERVAL)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Upload read size, never zero.
    pub fn effective_chunk_size(&self) -> usize {
        if self.chunk_size == 0 {
            ManagerConfig::default().chunk_size
        } else {
            self.chunk_size
        }
    }
}
