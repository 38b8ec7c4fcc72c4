use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two behavioral signals tracked by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    Tail,
    Ear,
}

impl Signal {
    pub const ALL: [Signal; 2] = [Signal::Tail, Signal::Ear];
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Tail => f.write_str("tail"),
            Signal::Ear => f.write_str("ear"),
        }
    }
}

/// One detected object in one frame, as reported by the external detector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub label: String,
    /// Detector score in [0, 1].
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
}

impl DetectionEvent {
    pub fn new(label: impl Into<String>, confidence: f32, timestamp: DateTime<Utc>) -> Self {
        Self {
            label: label.into(),
            confidence,
            timestamp,
        }
    }

    /// Convenience constructor stamped with the current time.
    pub fn now(label: impl Into<String>, confidence: f32) -> Self {
        Self::new(label, confidence, Utc::now())
    }
}
