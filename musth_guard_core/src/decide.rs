//musth_guard_core/decide.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cfg::AlertCfg;
use crate::detection::{DetectionEvent, Signal};
use crate::error::Result;
use crate::evidence::{ArtifactId, EvidenceSink, SinkError};
use crate::track::BehaviorTrack;

/// Message handed to the evidence sink on a combined alert.
pub const COMBINED_ALERT_MESSAGE: &str = "Aggressive elephant detected; evidence image saved.";

/// Outcome of one evaluation, highest precedence first.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum AlertKind {
    None,
    Warning(Signal),
    CombinedAlert,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlertDecision {
    pub kind: AlertKind,
    /// Timestamp of the event that produced this decision.
    pub timestamp: DateTime<Utc>,
}

impl AlertDecision {
    #[inline]
    pub fn is_alert(&self) -> bool {
        self.kind == AlertKind::CombinedAlert
    }
}

/// Decision plus the result of the evidence sink, when it was called.
#[derive(Debug)]
pub struct Evaluation {
    pub decision: AlertDecision,
    pub evidence: Option<std::result::Result<ArtifactId, SinkError>>,
}

/// Pure precedence rule over the two escalation counts.
pub fn decide_kind(tail: usize, ear: usize, cfg: &AlertCfg) -> AlertKind {
    let t = &cfg.thresholds;
    if tail > t.alert_tail && ear > t.alert_ear {
        AlertKind::CombinedAlert
    } else if ear > t.warn_ear {
        AlertKind::Warning(Signal::Ear)
    } else if tail > t.warn_tail {
        AlertKind::Warning(Signal::Tail)
    } else {
        AlertKind::None
    }
}

/// Per-stream alert engine. Owns both tracks; feed it one source's events in
/// frame order. Separate streams need separate engines.
#[derive(Clone, Debug)]
pub struct AlertEngine {
    cfg: AlertCfg,
    pub(crate) tail: BehaviorTrack,
    pub(crate) ear: BehaviorTrack,
    pub(crate) events_seen: u64,
    /// Events left before the sink may be called again.
    pub(crate) cooldown_left: u32,
    last_kind: AlertKind,
}

impl AlertEngine {
    pub fn new(cfg: AlertCfg) -> Result<Self> {
        cfg.validate()?;
        Ok(Self::new_unchecked(cfg))
    }

    pub(crate) fn new_unchecked(cfg: AlertCfg) -> Self {
        Self {
            tail: BehaviorTrack::new(&cfg.tail),
            ear: BehaviorTrack::new(&cfg.ear),
            cfg,
            events_seen: 0,
            cooldown_left: 0,
            last_kind: AlertKind::None,
        }
    }

    pub fn cfg(&self) -> &AlertCfg {
        &self.cfg
    }

    pub fn track(&self, signal: Signal) -> &BehaviorTrack {
        match signal {
            Signal::Tail => &self.tail,
            Signal::Ear => &self.ear,
        }
    }

    #[inline]
    pub fn escalation(&self, signal: Signal) -> usize {
        self.track(signal).escalation_count()
    }

    #[inline]
    pub fn vote_count(&self, signal: Signal) -> usize {
        self.track(signal).vote_count()
    }

    #[inline]
    pub fn events_seen(&self) -> u64 {
        self.events_seen
    }

    #[inline]
    pub fn last_kind(&self) -> AlertKind {
        self.last_kind
    }

    /// True while a combined-alert cooldown is suppressing the sink.
    #[inline]
    pub fn alert_fired_recently(&self) -> bool {
        self.cooldown_left > 0
    }

    /// Advance every track by one event and decide. No side effects.
    pub fn observe(&mut self, event: &DetectionEvent) -> AlertDecision {
        // both tracks advance on every event; the non-matching one takes a zero vote
        self.tail.update(event);
        self.ear.update(event);
        self.events_seen += 1;

        let tail = self.tail.escalation_count();
        let ear = self.ear.escalation_count();
        let kind = decide_kind(tail, ear, &self.cfg);

        tracing::debug!(
            label = %event.label,
            confidence = event.confidence,
            tail_votes = self.tail.vote_count(),
            ear_votes = self.ear.vote_count(),
            tail_escalation = tail,
            ear_escalation = ear,
            "event evaluated"
        );

        if kind != self.last_kind {
            tracing::info!(from = ?self.last_kind, to = ?kind, tail, ear, "alert state changed");
        }
        if let AlertKind::Warning(signal) = kind {
            tracing::warn!(%signal, tail, ear, "sustained aggressive signal");
        }
        self.last_kind = kind;

        AlertDecision {
            kind,
            timestamp: event.timestamp,
        }
    }

    /// Evaluate one event and, on a combined alert, hand the frame to `sink`.
    ///
    /// A sink failure is logged and returned in `Evaluation::evidence`; it
    /// never rolls back the windows.
    pub fn evaluate<S>(&mut self, event: &DetectionEvent, frame: &S::Frame, sink: &mut S) -> Evaluation
    where
        S: EvidenceSink + ?Sized,
    {
        let cooling = self.cooldown_left > 0;
        self.cooldown_left = self.cooldown_left.saturating_sub(1);

        let decision = self.observe(event);
        if !decision.is_alert() {
            return Evaluation { decision, evidence: None };
        }

        tracing::warn!(
            tail = self.tail.escalation_count(),
            ear = self.ear.escalation_count(),
            "aggressive elephant detected"
        );

        if cooling {
            tracing::debug!(cooldown_left = self.cooldown_left, "evidence suppressed by cooldown");
            return Evaluation { decision, evidence: None };
        }
        self.cooldown_left = self.cfg.alert_cooldown_events;

        let result = sink.persist_and_notify(frame, COMBINED_ALERT_MESSAGE);
        match &result {
            Ok(id) => tracing::info!(artifact = %id, "alert evidence persisted"),
            Err(e) => tracing::warn!(error = %e, "evidence sink failed"),
        }

        Evaluation {
            decision,
            evidence: Some(result),
        }
    }

    /// Evaluate every detection of one frame in order. A frame with no
    /// detections leaves the engine untouched.
    pub fn evaluate_frame<'a, S, I>(&mut self, events: I, frame: &S::Frame, sink: &mut S) -> Vec<Evaluation>
    where
        S: EvidenceSink + ?Sized,
        I: IntoIterator<Item = &'a DetectionEvent>,
    {
        let mut out = Vec::new();
        for ev in events {
            out.push(self.evaluate(ev, frame, &mut *sink));
        }
        out
    }

    /// Drop all window contents and the cooldown.
    pub fn reset(&mut self) {
        self.tail.clear();
        self.ear.clear();
        self.events_seen = 0;
        self.cooldown_left = 0;
        self.last_kind = AlertKind::None;
    }
}
