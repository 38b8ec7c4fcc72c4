//! musth_guard_supervisor
//!
//! Outside-world facing orchestration layer for `musth_guard_core`.
//!
//! Responsibilities:
//! - own one `AlertEngine` per video source
//! - shard engines by `source_id` (deterministic)
//! - convert detector rows into detection events via adapters
//! - snapshot/restore engine windows
//! - replay recorded detection logs
//!
//! Non-goals:
//! - no frame capture or decoding
//! - no async
//! - no alert policy (lives in core)

pub mod adapter;
pub mod supervisor;
pub mod replay;

pub use adapter::{
    annotation_boxes,
    build_event_batch,
    BasicEventBuilder,
    ClassNames,
    DetectorRow,
    EventBuilder,
    Normalizer,
    PixelBox,
};

pub use supervisor::{
    GuardSupervisor,
    RestoreStats,
    SupervisorSnapshot,
};

pub use replay::{replay, FrameRecord, ReplayError, ReplaySummary};
