//! Fixed-capacity sliding vote windows.
//!
//! Both stages of the debouncer share one ring buffer: the first stage
//! (`SignalCounter`) is fed raw per-event votes, the second stage
//! (`EscalationSmoother`) is fed the result of a sustain test on the first.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::error::{GuardError, Result};

/// A binary per-event vote.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Vote {
    Negative,
    Positive,
}

impl Vote {
    #[inline]
    pub fn from_bool(positive: bool) -> Self {
        if positive { Vote::Positive } else { Vote::Negative }
    }

    #[inline]
    pub fn is_positive(self) -> bool {
        matches!(self, Vote::Positive)
    }
}

impl From<Vote> for u8 {
    fn from(v: Vote) -> u8 {
        match v {
            Vote::Negative => 0,
            Vote::Positive => 1,
        }
    }
}

impl TryFrom<u8> for Vote {
    type Error = GuardError;

    fn try_from(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(Vote::Negative),
            1 => Ok(Vote::Positive),
            other => Err(GuardError::InvalidVote(other)),
        }
    }
}

/// Ring buffer of votes with an incrementally maintained positive count.
///
/// Invariant: `votes.len() <= capacity` and `positives` equals the number of
/// `Vote::Positive` entries in `votes`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoteWindow {
    votes: VecDeque<Vote>,
    capacity: usize,
    positives: usize,
}

impl VoteWindow {
    /// Create an empty window. Callers validate `capacity > 0` through
    /// `AlertCfg::validate`; a zero capacity here is bumped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            votes: VecDeque::with_capacity(capacity),
            capacity,
            positives: 0,
        }
    }

    /// Rebuild a window from stored votes, oldest first.
    pub fn from_votes(capacity: usize, votes: impl IntoIterator<Item = Vote>) -> Result<Self> {
        let mut w = Self::new(capacity);
        for v in votes {
            if w.votes.len() == w.capacity {
                return Err(GuardError::Config(format!(
                    "stored window longer than capacity {}",
                    w.capacity
                )));
            }
            w.push(v);
        }
        Ok(w)
    }

    /// Append a vote, evicting the oldest one when full.
    pub fn push(&mut self, vote: Vote) {
        if self.votes.len() == self.capacity {
            if let Some(Vote::Positive) = self.votes.pop_front() {
                self.positives -= 1;
            }
        }
        if vote.is_positive() {
            self.positives += 1;
        }
        self.votes.push_back(vote);
    }

    /// Push a raw 0/1 vote. Anything else is rejected and the window is left untouched.
    pub fn push_raw(&mut self, raw: u8) -> Result<()> {
        let vote = Vote::try_from(raw)?;
        self.push(vote);
        Ok(())
    }

    #[inline]
    pub fn count_positive(&self) -> usize {
        self.positives
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.votes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.votes.len() == self.capacity
    }

    pub fn clear(&mut self) {
        self.votes.clear();
        self.positives = 0;
    }

    /// Votes oldest-first.
    pub fn iter(&self) -> impl Iterator<Item = Vote> + '_ {
        self.votes.iter().copied()
    }
}

/// First-stage window: raw per-event votes for one behavioral signal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignalCounter(VoteWindow);

/// Second-stage window: fed 1 only while the paired `SignalCounter` is sustained.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EscalationSmoother(VoteWindow);

macro_rules! window_newtype {
    ($name:ident) => {
        impl $name {
            pub fn new(capacity: usize) -> Self {
                Self(VoteWindow::new(capacity))
            }

            pub fn from_window(window: VoteWindow) -> Self {
                Self(window)
            }

            #[inline]
            pub fn push(&mut self, vote: Vote) {
                self.0.push(vote)
            }

            #[inline]
            pub fn push_raw(&mut self, raw: u8) -> Result<()> {
                self.0.push_raw(raw)
            }

            #[inline]
            pub fn count_positive(&self) -> usize {
                self.0.count_positive()
            }

            #[inline]
            pub fn capacity(&self) -> usize {
                self.0.capacity()
            }

            #[inline]
            pub fn len(&self) -> usize {
                self.0.len()
            }

            #[inline]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            #[inline]
            pub fn is_full(&self) -> bool {
                self.0.is_full()
            }

            pub fn clear(&mut self) {
                self.0.clear()
            }

            pub fn window(&self) -> &VoteWindow {
                &self.0
            }
        }
    };
}

window_newtype!(SignalCounter);
window_newtype!(EscalationSmoother);
