//! Sharded guard supervisor.
//!
//! This crate is the outside-world facing orchestration layer around `musth_guard_core`:
//! - owns one `AlertEngine` per video source
//! - converts detector rows into detection events
//! - runs each source's events through its engine in arrival order
//!
//! No async. Sources never share window state; a source's events are
//! evaluated under its shard lock, one at a time.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use musth_guard_core::{AlertCfg, AlertEngine, DetectionEvent, EngineSnapshot, EvidenceSink, Evaluation, Result};

use crate::adapter::{build_event_batch, DetectorRow, EventBuilder};

/// Snapshot of supervisor state for storage-agnostic persistence.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SupervisorSnapshot {
    /// Per-source engine windows, sorted by source id.
    pub engines: Vec<(String, EngineSnapshot)>,
}

impl SupervisorSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

/// Simple observability counters returned by restore/import operations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RestoreStats {
    /// Number of source engines applied from the snapshot/iterator.
    pub applied: usize,
    /// Number of existing engines that were overwritten.
    pub overwritten: usize,
    /// Entries whose windows did not fit the source's cfg.
    pub rejected: usize,
}

#[derive(Default, Debug)]
struct Shard {
    engines: HashMap<String, AlertEngine>,
}

/// Deterministic FNV-1a hash (stable across runs).
fn fnv1a_u64(s: &str) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for b in s.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

fn shard_index(source_id: &str, shard_count: usize) -> usize {
    if shard_count <= 1 {
        return 0;
    }
    (fnv1a_u64(source_id) as usize) % shard_count
}

/// A sharded supervisor. One engine per `source_id`, created on first use.
///
/// - `shards == 1` behaves like a single-threaded supervisor.
/// - More shards let callers drive different sources from different threads
///   with less contention.
#[derive(Debug)]
pub struct GuardSupervisor {
    cfg: AlertCfg,
    /// Optional per-source cfg overrides.
    cfg_overrides: HashMap<String, AlertCfg>,
    shards: usize,
    state_shards: Vec<std::sync::Mutex<Shard>>,
}

impl GuardSupervisor {
    /// Create a supervisor with `shards` state partitions. The cfg is validated here.
    pub fn new(shards: usize, cfg: AlertCfg) -> Result<Self> {
        cfg.validate()?;
        let shards = shards.max(1);
        let mut state_shards = Vec::with_capacity(shards);
        for _ in 0..shards {
            state_shards.push(std::sync::Mutex::new(Shard::default()));
        }

        Ok(Self {
            cfg,
            cfg_overrides: HashMap::new(),
            shards,
            state_shards,
        })
    }

    /// Override cfg for one source. Takes effect the next time that source's
    /// engine is created, so an existing engine is dropped.
    pub fn set_cfg_override(&mut self, source_id: impl Into<String>, cfg: AlertCfg) -> Result<()> {
        cfg.validate()?;
        let source_id = source_id.into();
        self.clear_source(&source_id);
        self.cfg_overrides.insert(source_id, cfg);
        Ok(())
    }

    /// Remove the cfg override for a source (its engine is dropped too).
    pub fn clear_cfg_override(&mut self, source_id: &str) {
        if self.cfg_overrides.remove(source_id).is_some() {
            self.clear_source(source_id);
        }
    }

    fn cfg_for(&self, source_id: &str) -> &AlertCfg {
        self.cfg_overrides.get(source_id).unwrap_or(&self.cfg)
    }

    fn shard(&self, source_id: &str) -> std::sync::MutexGuard<'_, Shard> {
        let idx = shard_index(source_id, self.shards);
        self.state_shards[idx]
            .lock()
            .expect("guard supervisor shard mutex poisoned")
    }

    /// Number of sources with a live engine.
    pub fn source_count(&self) -> usize {
        self.state_shards
            .iter()
            .map(|s| s.lock().expect("guard supervisor shard mutex poisoned").engines.len())
            .sum()
    }

    /// Read-only access to one source's engine, if it exists.
    pub fn with_engine<R>(&self, source_id: &str, f: impl FnOnce(&AlertEngine) -> R) -> Option<R> {
        let guard = self.shard(source_id);
        guard.engines.get(source_id).map(f)
    }

    /// Ingest one frame of detector rows for `source_id` and evaluate each
    /// resulting event in order.
    pub fn ingest<B, S>(
        &self,
        builder: &B,
        source_id: &str,
        rows: &[DetectorRow],
        timestamp: DateTime<Utc>,
        frame: &S::Frame,
        sink: &mut S,
    ) -> Result<Vec<Evaluation>>
    where
        B: EventBuilder + ?Sized,
        S: EvidenceSink + ?Sized,
    {
        let events = build_event_batch(builder, rows, timestamp);
        self.ingest_events(source_id, &events, frame, sink)
    }

    /// Evaluate already-built events for `source_id` in order.
    ///
    /// Only engine creation can fail; sink failures are reported per
    /// evaluation and never abort the frame.
    pub fn ingest_events<S>(
        &self,
        source_id: &str,
        events: &[DetectionEvent],
        frame: &S::Frame,
        sink: &mut S,
    ) -> Result<Vec<Evaluation>>
    where
        S: EvidenceSink + ?Sized,
    {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let mut guard = self.shard(source_id);
        let engine = match guard.engines.entry(source_id.to_string()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(v) => {
                tracing::info!(source = source_id, "creating alert engine");
                v.insert(AlertEngine::new(self.cfg_for(source_id).clone())?)
            }
        };

        // engine events (sink failures included) are logged inside this span
        let _span = tracing::info_span!("ingest", source = source_id).entered();
        Ok(engine.evaluate_frame(events, frame, sink))
    }

    /// Export all `(source_id, EngineSnapshot)` pairs.
    ///
    /// Deterministic ordering: sorted by `source_id`.
    pub fn snapshot(&self) -> SupervisorSnapshot {
        self.snapshot_filtered(|_, _| true)
    }

    /// Export a snapshot filtered by a caller-provided predicate.
    pub fn snapshot_filtered<F>(&self, mut predicate: F) -> SupervisorSnapshot
    where
        F: FnMut(&str, &AlertEngine) -> bool,
    {
        let mut out: Vec<(String, EngineSnapshot)> = Vec::new();

        // Lock shards in a stable order.
        for shard in &self.state_shards {
            let guard = shard
                .lock()
                .expect("guard supervisor shard mutex poisoned");
            for (k, engine) in guard.engines.iter() {
                if predicate(k.as_str(), engine) {
                    out.push((k.clone(), engine.snapshot()));
                }
            }
        }

        out.sort_by(|a, b| a.0.cmp(&b.0));
        SupervisorSnapshot { engines: out }
    }

    /// Export a snapshot containing only the provided sources.
    pub fn snapshot_sources(&self, source_ids: &[&str]) -> SupervisorSnapshot {
        let want: HashSet<&str> = source_ids.iter().copied().collect();
        self.snapshot_filtered(|id, _| want.contains(id))
    }

    /// Replace all engines with the snapshot contents.
    pub fn restore(&self, snap: SupervisorSnapshot) -> RestoreStats {
        for shard in &self.state_shards {
            shard
                .lock()
                .expect("guard supervisor shard mutex poisoned")
                .engines
                .clear();
        }
        self.restore_merge(snap)
    }

    /// Merge the snapshot into current state; snapshot entries overwrite
    /// existing engines with the same `source_id`.
    pub fn restore_merge(&self, snap: SupervisorSnapshot) -> RestoreStats {
        let mut stats = RestoreStats::default();
        for (source_id, engine_snap) in snap.engines {
            let engine = match AlertEngine::restore(self.cfg_for(&source_id).clone(), &engine_snap) {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(source = %source_id, error = %e, "snapshot entry rejected");
                    stats.rejected += 1;
                    continue;
                }
            };

            let mut guard = self.shard(&source_id);
            if guard.engines.insert(source_id, engine).is_some() {
                stats.overwritten += 1;
            }
            stats.applied += 1;
        }
        stats
    }

    /// Drop a single source's engine (e.g. when a camera goes away).
    pub fn clear_source(&self, source_id: &str) {
        self.shard(source_id).engines.remove(source_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_index_is_stable_and_bounded() {
        for id in ["cam-0", "cam-1", "gate-north"] {
            let a = shard_index(id, 7);
            assert_eq!(a, shard_index(id, 7));
            assert!(a < 7);
            assert_eq!(shard_index(id, 1), 0);
        }
    }

    #[test]
    fn rejects_invalid_cfg() {
        let mut cfg = AlertCfg::default();
        cfg.ear.vote_threshold = -0.1;
        assert!(GuardSupervisor::new(2, cfg.clone()).is_err());

        let mut sup = GuardSupervisor::new(2, AlertCfg::default()).unwrap();
        assert!(sup.set_cfg_override("cam-0", cfg).is_err());
    }
}
