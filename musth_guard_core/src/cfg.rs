use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GuardError, Result};

/// Per-signal tuning for one `BehaviorTrack`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackCfg {
    /// Detector label routed to this track (exact match).
    pub label: String,
    /// Minimum confidence for a positive vote.
    pub vote_threshold: f32,
    /// Fraction of the signal window that must be positive to count as sustained.
    pub sustain_fraction: f64,
    /// Signal window length in events.
    pub signal_capacity: usize,
    /// Escalation window length in events.
    pub escalation_capacity: usize,
}

impl TrackCfg {
    pub fn tail() -> Self {
        Self {
            label: "Aggressive_tail".to_string(),
            vote_threshold: 0.4,
            sustain_fraction: 0.5,
            signal_capacity: 150, // 5s at 30fps
            escalation_capacity: 200,
        }
    }

    pub fn ear() -> Self {
        Self {
            label: "Aggressive_ear".to_string(),
            vote_threshold: 0.3,
            sustain_fraction: 0.3,
            signal_capacity: 150,
            escalation_capacity: 200,
        }
    }

    /// Positive votes needed in the signal window for the sustain test,
    /// i.e. the smallest count satisfying `count >= sustain_fraction * signal_capacity`.
    pub fn sustain_votes(&self) -> usize {
        let exact = self.sustain_fraction * self.signal_capacity as f64;
        // absorb representation error so 0.3 * 150 stays 45
        (exact - 1e-9).ceil().max(0.0) as usize
    }

    fn validate(&self, which: &str) -> Result<()> {
        if self.label.is_empty() {
            return Err(GuardError::Config(format!("{which}: label must not be empty")));
        }
        if self.signal_capacity == 0 || self.escalation_capacity == 0 {
            return Err(GuardError::Config(format!("{which}: window capacities must be positive")));
        }
        if !in_unit(self.vote_threshold as f64) {
            return Err(GuardError::Config(format!(
                "{which}: vote_threshold {} outside [0, 1]",
                self.vote_threshold
            )));
        }
        if !in_unit(self.sustain_fraction) {
            return Err(GuardError::Config(format!(
                "{which}: sustain_fraction {} outside [0, 1]",
                self.sustain_fraction
            )));
        }
        Ok(())
    }
}

#[inline]
fn in_unit(x: f64) -> bool {
    x.is_finite() && (0.0..=1.0).contains(&x)
}

/// Escalation counts that must be strictly exceeded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    pub warn_tail: usize,
    pub warn_ear: usize,
    pub alert_tail: usize,
    pub alert_ear: usize,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            warn_tail: 100,
            warn_ear: 50,
            alert_tail: 75,
            alert_ear: 25,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawAlertCfg")]
pub struct AlertCfg {
    pub tail: TrackCfg,
    pub ear: TrackCfg,
    pub thresholds: AlertThresholds,
    /// Events after a combined alert during which the sink is not called again.
    /// 0 calls the sink on every event where the combined condition holds.
    pub alert_cooldown_events: u32,
}

impl Default for AlertCfg {
    fn default() -> Self {
        Self {
            tail: TrackCfg::tail(),
            ear: TrackCfg::ear(),
            thresholds: AlertThresholds::default(),
            alert_cooldown_events: 0,
        }
    }
}

/// Partial track table as written in a config file; unset keys keep the
/// defaults of the track it overrides.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct TrackOverride {
    label: Option<String>,
    vote_threshold: Option<f32>,
    sustain_fraction: Option<f64>,
    signal_capacity: Option<usize>,
    escalation_capacity: Option<usize>,
}

impl TrackOverride {
    fn apply(self, base: TrackCfg) -> TrackCfg {
        TrackCfg {
            label: self.label.unwrap_or(base.label),
            vote_threshold: self.vote_threshold.unwrap_or(base.vote_threshold),
            sustain_fraction: self.sustain_fraction.unwrap_or(base.sustain_fraction),
            signal_capacity: self.signal_capacity.unwrap_or(base.signal_capacity),
            escalation_capacity: self.escalation_capacity.unwrap_or(base.escalation_capacity),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawAlertCfg {
    tail: TrackOverride,
    ear: TrackOverride,
    thresholds: AlertThresholds,
    alert_cooldown_events: u32,
}

impl From<RawAlertCfg> for AlertCfg {
    fn from(raw: RawAlertCfg) -> Self {
        Self {
            tail: raw.tail.apply(TrackCfg::tail()),
            ear: raw.ear.apply(TrackCfg::ear()),
            thresholds: raw.thresholds,
            alert_cooldown_events: raw.alert_cooldown_events,
        }
    }
}

impl AlertCfg {
    pub fn validate(&self) -> Result<()> {
        self.tail.validate("tail")?;
        self.ear.validate("ear")?;
        Ok(())
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: AlertCfg = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }
}
