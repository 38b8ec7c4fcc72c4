pub mod window;
pub mod detection;
pub mod cfg;
pub mod track;

pub mod evidence;
pub mod error;
pub mod state;
pub mod decide;

pub use window::{Vote, VoteWindow, SignalCounter, EscalationSmoother};
pub use detection::{DetectionEvent, Signal};
pub use cfg::{AlertCfg, AlertThresholds, TrackCfg};
pub use track::BehaviorTrack;

pub use evidence::{
    ArtifactId, CommandNotifier, DirectorySink, EvidenceSink, LogNotifier, Notifier, RecordingSink, SinkError,
};
pub use error::{GuardError, Result};
pub use state::{EngineSnapshot, TrackState};
pub use decide::{AlertDecision, AlertEngine, AlertKind, Evaluation, decide_kind, COMBINED_ALERT_MESSAGE};
