use crate::cfg::TrackCfg;
use crate::detection::DetectionEvent;
use crate::window::{EscalationSmoother, SignalCounter, Vote};

/// One behavioral signal: a raw vote window plus its escalation window.
///
/// Every event advances both windows exactly once, whether or not the label
/// matches, so the windows measure elapsed events. A track that stops seeing
/// its label decays to zero escalation.
#[derive(Clone, Debug)]
pub struct BehaviorTrack {
    label: String,
    vote_threshold: f32,
    sustain_votes: usize,
    signal: SignalCounter,
    escalation: EscalationSmoother,
}

impl BehaviorTrack {
    pub fn new(cfg: &TrackCfg) -> Self {
        Self {
            label: cfg.label.clone(),
            vote_threshold: cfg.vote_threshold,
            sustain_votes: cfg.sustain_votes(),
            signal: SignalCounter::new(cfg.signal_capacity),
            escalation: EscalationSmoother::new(cfg.escalation_capacity),
        }
    }

    pub(crate) fn with_windows(cfg: &TrackCfg, signal: SignalCounter, escalation: EscalationSmoother) -> Self {
        Self {
            signal,
            escalation,
            ..Self::new(cfg)
        }
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn matches(&self, event: &DetectionEvent) -> bool {
        event.label == self.label
    }

    /// Advance both windows for one event.
    pub fn update(&mut self, event: &DetectionEvent) {
        let positive = self.matches(event) && event.confidence >= self.vote_threshold;
        self.push_vote(Vote::from_bool(positive));
    }

    /// Advance both windows with an explicit first-stage vote.
    pub fn push_vote(&mut self, vote: Vote) {
        self.signal.push(vote);
        let sustained = self.signal.count_positive() >= self.sustain_votes;
        self.escalation.push(Vote::from_bool(sustained));
    }

    #[inline]
    pub fn is_sustained(&self) -> bool {
        self.signal.count_positive() >= self.sustain_votes
    }

    #[inline]
    pub fn vote_count(&self) -> usize {
        self.signal.count_positive()
    }

    #[inline]
    pub fn escalation_count(&self) -> usize {
        self.escalation.count_positive()
    }

    pub fn signal(&self) -> &SignalCounter {
        &self.signal
    }

    pub fn escalation(&self) -> &EscalationSmoother {
        &self.escalation
    }

    pub fn clear(&mut self) {
        self.signal.clear();
        self.escalation.clear();
    }
}
