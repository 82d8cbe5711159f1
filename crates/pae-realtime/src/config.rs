//! Streaming configuration

use pae_core::{EqError, EqResult};
use serde::{Deserialize, Serialize};

/// Real-time layer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Frames per processed block
    pub buffer_size: usize,
    /// Headroom added to the block duration for the latency budget (ms)
    pub latency_margin_ms: f64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1024,
            latency_margin_ms: 20.0,
        }
    }
}

impl RealtimeConfig {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size,
            ..Default::default()
        }
    }

    pub fn with_latency_margin(mut self, ms: f64) -> Self {
        self.latency_margin_ms = ms;
        self
    }

    pub fn validate(&self) -> EqResult<()> {
        if self.buffer_size == 0 {
            return Err(EqError::InvalidConfig("buffer_size must be > 0".into()));
        }
        if !self.latency_margin_ms.is_finite() || self.latency_margin_ms < 0.0 {
            return Err(EqError::InvalidConfig(format!(
                "latency_margin_ms must be >= 0, got {}",
                self.latency_margin_ms
            )));
        }
        Ok(())
    }

    /// Wall-clock budget for one block (ms)
    pub fn latency_budget_ms(&self, sample_rate: u32) -> f64 {
        self.buffer_size as f64 / sample_rate.max(1) as f64 * 1000.0 + self.latency_margin_ms
    }

    pub fn from_json(json: &str) -> EqResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> EqResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
