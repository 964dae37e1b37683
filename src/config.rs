//! Element configuration.
//!
//! Mirrors `audio_player::config::PlaybackConfig`'s shape (a plain `Default`-able struct)
//! but adds `serde::Deserialize` since this config is meant to be constructed from host
//! properties rather than parsed from a CLI.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Configuration accepted by the element, per its external interface.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// WebSocket URI to connect to. Required; must be `ws://` or `wss://`.
    pub uri: String,
    pub sample_rate_hz: u32,
    pub channels: u8,
    pub frame_duration_ms: u32,
    pub max_queue_size: usize,
    pub initial_buffer_count: usize,
    pub reconnect_enabled: bool,
    pub initial_reconnect_delay_ms: u64,
    pub max_backoff_ms: u64,
    pub max_reconnects: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            uri: String::new(),
            sample_rate_hz: 16000,
            channels: 1,
            frame_duration_ms: 250,
            max_queue_size: 100,
            initial_buffer_count: 3,
            reconnect_enabled: true,
            initial_reconnect_delay_ms: 1000,
            max_backoff_ms: 30_000,
            max_reconnects: 10,
        }
    }
}

impl Config {
    /// Validate bounds from the external interface. Called at `prepare()`.
    pub fn validate(&self) -> Result<()> {
        if self.uri.is_empty() {
            return Err(Error::Config("uri is required".into()));
        }
        if !(self.uri.starts_with("ws://") || self.uri.starts_with("wss://")) {
            return Err(Error::Config(format!("uri must start with ws:// or wss://: {}", self.uri)));
        }
        if !(1..=2).contains(&self.channels) {
            return Err(Error::Config(format!("channels {} out of range 1-2", self.channels)));
        }
        if !(10..=1000).contains(&self.frame_duration_ms) {
            return Err(Error::Config(format!(
                "frame-duration-ms {} out of range 10-1000",
                self.frame_duration_ms
            )));
        }
        if !(1..=1000).contains(&self.max_queue_size) {
            return Err(Error::Config(format!(
                "max-queue-size {} out of range 1-1000",
                self.max_queue_size
            )));
        }
        if self.initial_buffer_count > 100 {
            return Err(Error::Config(format!(
                "initial-buffer-count {} out of range 0-100",
                self.initial_buffer_count
            )));
        }
        if !(100..=5000).contains(&self.initial_reconnect_delay_ms) {
            return Err(Error::Config(format!(
                "initial-reconnect-delay-ms {} out of range 100-5000",
                self.initial_reconnect_delay_ms
            )));
        }
        if !(1000..=60_000).contains(&self.max_backoff_ms) {
            return Err(Error::Config(format!(
                "max-backoff-ms {} out of range 1000-60000",
                self.max_backoff_ms
            )));
        }
        if self.max_reconnects > 100 {
            return Err(Error::Config(format!(
                "max-reconnects {} out of range 0-100",
                self.max_reconnects
            )));
        }
        Ok(())
    }

    pub fn frame_duration(&self) -> Duration {
        Duration::from_millis(self.frame_duration_ms as u64)
    }

    pub fn initial_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.initial_reconnect_delay_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.sample_rate_hz, 16000);
        assert_eq!(cfg.channels, 1);
        assert_eq!(cfg.frame_duration_ms, 250);
        assert_eq!(cfg.max_queue_size, 100);
        assert_eq!(cfg.initial_buffer_count, 3);
        assert!(cfg.reconnect_enabled);
        assert_eq!(cfg.initial_reconnect_delay_ms, 1000);
        assert_eq!(cfg.max_backoff_ms, 30_000);
        assert_eq!(cfg.max_reconnects, 10);
    }

    #[test]
    fn missing_uri_is_config_error() {
        let cfg = Config::default();
        assert_eq!(cfg.validate(), Err(Error::Config("uri is required".into())));
    }

    #[test]
    fn rejects_non_ws_scheme() {
        let mut cfg = Config::default();
        cfg.uri = "http://example.com".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn accepts_wss_uri() {
        let mut cfg = Config::default();
        cfg.uri = "wss://example.com/socket".into();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_frame_duration() {
        let mut cfg = Config::default();
        cfg.uri = "ws://127.0.0.1:9999".into();
        cfg.frame_duration_ms = 5;
        assert!(cfg.validate().is_err());
    }
}
