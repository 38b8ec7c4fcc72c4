use serde::{Deserialize, Serialize};

use crate::cfg::{AlertCfg, TrackCfg};
use crate::decide::AlertEngine;
use crate::error::Result;
use crate::track::BehaviorTrack;
use crate::window::{EscalationSmoother, SignalCounter, Vote, VoteWindow};

/// Stored window contents for one track, oldest vote first.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackState {
    pub votes: Vec<Vote>,
    pub escalation: Vec<Vote>,
}

impl TrackState {
    fn capture(track: &BehaviorTrack) -> Self {
        Self {
            votes: track.signal().window().iter().collect(),
            escalation: track.escalation().window().iter().collect(),
        }
    }
}

/// Plain-data snapshot of an `AlertEngine`'s windows.
///
/// Carries no configuration; restoring pairs it with a cfg whose capacities
/// are at least as large as the stored windows.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub tail: TrackState,
    pub ear: TrackState,
    pub events_seen: u64,
    pub cooldown_left: u32,
}

impl AlertEngine {
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            tail: TrackState::capture(&self.tail),
            ear: TrackState::capture(&self.ear),
            events_seen: self.events_seen,
            cooldown_left: self.cooldown_left,
        }
    }

    /// Rebuild an engine from `cfg` and stored windows.
    pub fn restore(cfg: AlertCfg, snap: &EngineSnapshot) -> Result<Self> {
        cfg.validate()?;
        let tail = rebuild(&cfg.tail, &snap.tail)?;
        let ear = rebuild(&cfg.ear, &snap.ear)?;

        let mut engine = AlertEngine::new_unchecked(cfg);
        engine.tail = tail;
        engine.ear = ear;
        engine.events_seen = snap.events_seen;
        engine.cooldown_left = snap.cooldown_left.min(engine.cfg().alert_cooldown_events);
        Ok(engine)
    }
}

fn rebuild(cfg: &TrackCfg, st: &TrackState) -> Result<BehaviorTrack> {
    let signal = VoteWindow::from_votes(cfg.signal_capacity, st.votes.iter().copied())?;
    let escalation = VoteWindow::from_votes(cfg.escalation_capacity, st.escalation.iter().copied())?;
    Ok(BehaviorTrack::with_windows(
        cfg,
        SignalCounter::from_window(signal),
        EscalationSmoother::from_window(escalation),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{DetectionEvent, Signal};
    use crate::error::GuardError;

    #[test]
    fn restored_engine_continues_identically() {
        let cfg = AlertCfg::default();
        let mut a = AlertEngine::new(cfg.clone()).unwrap();
        for i in 0..180 {
            let label = if i % 3 == 0 { "Aggressive_ear" } else { "Aggressive_tail" };
            a.observe(&DetectionEvent::now(label, 0.8));
        }

        let snap = a.snapshot();
        let mut b = AlertEngine::restore(cfg, &snap).unwrap();
        assert_eq!(b.snapshot(), snap);

        for i in 0..40 {
            let ev = DetectionEvent::now(if i % 2 == 0 { "Aggressive_ear" } else { "x" }, 0.9);
            assert_eq!(a.observe(&ev).kind, b.observe(&ev).kind);
        }
        assert_eq!(a.escalation(Signal::Tail), b.escalation(Signal::Tail));
        assert_eq!(a.escalation(Signal::Ear), b.escalation(Signal::Ear));
    }

    #[test]
    fn restore_rejects_oversized_windows() {
        let mut cfg = AlertCfg::default();
        let mut engine = AlertEngine::new(cfg.clone()).unwrap();
        for _ in 0..10 {
            engine.observe(&DetectionEvent::now("Aggressive_tail", 1.0));
        }
        let snap = engine.snapshot();
        cfg.tail.signal_capacity = 5;
        assert!(matches!(AlertEngine::restore(cfg, &snap), Err(GuardError::Config(_))));
    }
}
