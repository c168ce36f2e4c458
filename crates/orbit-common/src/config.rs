//! Configuration types for Orbit
//!
//! This module defines the configuration surface consumed from the
//! config-loading layer. The structs here are plain serde types; the
//! evictor converts them into its runtime configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Persistence discipline for servant state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceMode {
    /// Every mutation writes through to the store before returning.
    Immediate,
    /// Load/mutate/save wrapped in store transactions.
    Transactional,
    /// Mutations mark entries dirty; a background sweeper flushes them.
    Background,
}

impl Default for PersistenceMode {
    fn default() -> Self {
        PersistenceMode::Immediate
    }
}

/// When eviction sweeps run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SweepTriggerSetting {
    /// Sweep when a use count returns to zero.
    OnFinished,
    /// Sweep on the background interval only.
    Periodic,
    /// Both of the above.
    Both,
}

impl Default for SweepTriggerSetting {
    fn default() -> Self {
        SweepTriggerSetting::OnFinished
    }
}

/// Evictor configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EvictorSettings {
    /// Cache capacity in entries
    pub capacity: usize,
    /// Persistence mode
    pub mode: PersistenceMode,
    /// Background flush interval in milliseconds (background mode and
    /// periodic sweeps)
    pub flush_interval_ms: u64,
    /// Eviction sweep trigger
    pub sweep_trigger: SweepTriggerSetting,
    /// How long deactivation waits for in-flight requests, in milliseconds
    pub drain_timeout_ms: u64,
}

impl Default for EvictorSettings {
    fn default() -> Self {
        Self {
            capacity: 1000,
            mode: PersistenceMode::default(),
            flush_interval_ms: 1000,
            sweep_trigger: SweepTriggerSetting::default(),
            drain_timeout_ms: 30_000,
        }
    }
}

impl EvictorSettings {
    /// Background flush interval as a [`Duration`]
    #[must_use]
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Deactivation drain timeout as a [`Duration`]
    #[must_use]
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = EvictorSettings::default();
        assert_eq!(settings.capacity, 1000);
        assert_eq!(settings.mode, PersistenceMode::Immediate);
        assert_eq!(settings.sweep_trigger, SweepTriggerSetting::OnFinished);
        assert_eq!(settings.flush_interval(), Duration::from_millis(1000));
    }

    #[test]
    fn test_deserialize_from_config_layer() {
        let json = r#"{
            "capacity": 128,
            "mode": "background",
            "flush_interval_ms": 100,
            "sweep_trigger": "both"
        }"#;
        let settings: EvictorSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.capacity, 128);
        assert_eq!(settings.mode, PersistenceMode::Background);
        assert_eq!(settings.sweep_trigger, SweepTriggerSetting::Both);
        // Unspecified fields fall back to defaults
        assert_eq!(settings.drain_timeout_ms, 30_000);
    }

    #[test]
    fn test_mode_round_trip() {
        for mode in [
            PersistenceMode::Immediate,
            PersistenceMode::Transactional,
            PersistenceMode::Background,
        ] {
            let s = serde_json::to_string(&mode).unwrap();
            let back: PersistenceMode = serde_json::from_str(&s).unwrap();
            assert_eq!(mode, back);
        }
    }
}
