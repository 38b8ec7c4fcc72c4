//! Domain adapter layer: convert raw detector output into `musth_guard_core::DetectionEvent`s.
//!
//! This module is intentionally small and policy-light:
//! - No IO
//! - No model loading
//! - No drawing
//!
//! Callers provide an `EventBuilder` (or use the provided `BasicEventBuilder`) to
//! map `DetectorRow`s into detection events.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use musth_guard_core::DetectionEvent;

/// One detector output row: class index, normalized box corners and score.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectorRow {
    pub class_id: usize,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

impl DetectorRow {
    pub fn new(class_id: usize, confidence: f32) -> Self {
        Self {
            class_id,
            x1: 0.0,
            y1: 0.0,
            x2: 1.0,
            y2: 1.0,
            confidence,
        }
    }

    pub fn with_box(mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        self.x1 = x1;
        self.y1 = y1;
        self.x2 = x2;
        self.y2 = y2;
        self
    }
}

/// Class index to label table, as shipped with the detector weights.
#[derive(Clone, Debug, Default)]
pub struct ClassNames {
    names: HashMap<usize, String>,
}

impl ClassNames {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(|s| -> String { s.into() }).enumerate().collect(),
        }
    }

    /// Label for `class_id`; unknown ids become `class_<id>`, which match no track.
    pub fn label(&self, class_id: usize) -> String {
        match self.names.get(&class_id) {
            Some(name) => name.clone(),
            None => format!("class_{class_id}"),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Lightweight normalization of detector scores.
#[derive(Clone, Copy, Debug)]
pub struct Normalizer {
    /// Clamp confidence into [0, 1]; non-finite scores become 0.
    pub clamp_confidence: bool,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            clamp_confidence: true,
        }
    }
}

impl Normalizer {
    #[inline]
    fn clamp01(x: f32) -> f32 {
        if !x.is_finite() {
            return 0.0;
        }
        x.clamp(0.0, 1.0)
    }

    pub fn confidence(&self, raw: f32) -> f32 {
        if self.clamp_confidence {
            Self::clamp01(raw)
        } else {
            raw
        }
    }
}

/// Trait: map a `DetectorRow` into a `DetectionEvent`.
pub trait EventBuilder {
    fn build(&self, row: &DetectorRow, timestamp: DateTime<Utc>) -> DetectionEvent;
}

/// Builder that resolves labels through `ClassNames` and normalizes the score.
#[derive(Clone, Debug, Default)]
pub struct BasicEventBuilder {
    pub classes: ClassNames,
    pub normalizer: Normalizer,
}

impl BasicEventBuilder {
    pub fn new(classes: ClassNames) -> Self {
        Self {
            classes,
            normalizer: Normalizer::default(),
        }
    }
}

impl EventBuilder for BasicEventBuilder {
    fn build(&self, row: &DetectorRow, timestamp: DateTime<Utc>) -> DetectionEvent {
        DetectionEvent::new(
            self.classes.label(row.class_id),
            self.normalizer.confidence(row.confidence),
            timestamp,
        )
    }
}

/// Helper: build events for all rows of one frame, in detector order.
pub fn build_event_batch<B: EventBuilder + ?Sized>(
    builder: &B,
    rows: &[DetectorRow],
    timestamp: DateTime<Utc>,
) -> Vec<DetectionEvent> {
    rows.iter().map(|r| builder.build(r, timestamp)).collect()
}

/// Pixel-space box for overlay/cropping by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelBox {
    pub class_id: usize,
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

/// Boxes worth drawing: rows scoring at least `min_confidence`, scaled to a
/// `width` x `height` frame.
pub fn annotation_boxes(rows: &[DetectorRow], min_confidence: f32, width: u32, height: u32) -> Vec<PixelBox> {
    let scale = |v: f32, dim: u32| -> u32 { (v.clamp(0.0, 1.0) * dim as f32) as u32 };
    rows.iter()
        .filter(|r| r.confidence >= min_confidence)
        .map(|r| PixelBox {
            class_id: r.class_id,
            x1: scale(r.x1, width),
            y1: scale(r.y1, height),
            x2: scale(r.x2, width),
            y2: scale(r.y2, height),
        })
        .collect()
}
