//! Realtime engine configuration

use serde::Deserialize;

use super::error::ValidationError;

/// Tuning knobs for the realtime synchronization engine
#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// Minimum gap between consecutive connect attempts, in milliseconds
    #[serde(default = "default_reconnect_min_gap_ms")]
    pub reconnect_min_gap_ms: u64,

    /// Keep the change-stream subscription alive while backgrounded
    #[serde(default)]
    pub keep_alive_in_background: bool,

    /// Number of recently seen message keys held for deduplication
    #[serde(default = "default_dedup_cache_size")]
    pub dedup_cache_size: usize,

    /// Publish typing indicator events from broadcast frames
    #[serde(default = "default_typing_events")]
    pub typing_events: bool,
}

impl RealtimeConfig {
    /// Validate realtime configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.reconnect_min_gap_ms < 100 {
            return Err(ValidationError::ReconnectGapTooSmall);
        }
        if self.dedup_cache_size == 0 {
            return Err(ValidationError::EmptyDedupCache);
        }
        Ok(())
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            reconnect_min_gap_ms: default_reconnect_min_gap_ms(),
            keep_alive_in_background: false,
            dedup_cache_size: default_dedup_cache_size(),
            typing_events: default_typing_events(),
        }
    }
}

fn default_reconnect_min_gap_ms() -> u64 {
    1000
}

fn default_dedup_cache_size() -> usize {
    512
}

fn default_typing_events() -> bool {
    true
}
