//! Replay of recorded detection logs.
//!
//! Input is JSON lines, one frame per line:
//! `{"source": "cam-0", "timestamp": "...", "frame": "img.jpg", "detections": [{"label": "Aggressive_tail", "confidence": 0.9}]}`
//!
//! `timestamp` defaults to the time of replay, `frame` to an empty image and
//! `detections` to none. Blank lines are skipped.

use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use musth_guard_core::{AlertKind, DetectionEvent, EvidenceSink, GuardError};

use crate::supervisor::GuardSupervisor;

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: bad frame record: {source}")]
    Record {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("line {line}: cannot read frame {path}: {source}")]
    Frame {
        line: usize,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Guard(#[from] GuardError),
}

#[derive(Clone, Debug, Deserialize)]
pub struct FrameRecord {
    pub source: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub frame: Option<PathBuf>,
    #[serde(default)]
    pub detections: Vec<RecordedDetection>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RecordedDetection {
    pub label: String,
    pub confidence: f32,
}

/// Decision counts over a replay.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub frames: usize,
    /// Keyed `none`, `warning_tail`, `warning_ear`, `combined_alert`.
    pub tally: BTreeMap<String, usize>,
    pub sink_failures: usize,
}

impl ReplaySummary {
    pub fn count(&self, key: &str) -> usize {
        self.tally.get(key).copied().unwrap_or(0)
    }
}

pub fn kind_key(kind: AlertKind) -> String {
    match kind {
        AlertKind::None => "none".to_string(),
        AlertKind::Warning(signal) => format!("warning_{signal}"),
        AlertKind::CombinedAlert => "combined_alert".to_string(),
    }
}

/// Feed every record in `reader` through `supervisor`, in order.
pub fn replay<R, S>(supervisor: &GuardSupervisor, reader: R, sink: &mut S) -> Result<ReplaySummary, ReplayError>
where
    R: BufRead,
    S: EvidenceSink<Frame = [u8]> + ?Sized,
{
    let mut summary = ReplaySummary::default();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let lineno = idx + 1;
        let record: FrameRecord =
            serde_json::from_str(&line).map_err(|source| ReplayError::Record { line: lineno, source })?;
        summary.frames += 1;

        let timestamp = record.timestamp.unwrap_or_else(Utc::now);
        let events: Vec<DetectionEvent> = record
            .detections
            .iter()
            .map(|d| DetectionEvent::new(d.label.clone(), d.confidence, timestamp))
            .collect();

        let frame_bytes = match &record.frame {
            Some(path) => std::fs::read(path).map_err(|source| ReplayError::Frame {
                line: lineno,
                path: path.clone(),
                source,
            })?,
            None => Vec::new(),
        };

        for eval in supervisor.ingest_events(&record.source, &events, frame_bytes.as_slice(), &mut *sink)? {
            *summary.tally.entry(kind_key(eval.decision.kind)).or_default() += 1;
            if let Some(Err(_)) = eval.evidence {
                summary.sink_failures += 1;
            }
        }
    }

    Ok(summary)
}
