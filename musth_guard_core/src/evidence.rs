//! Evidence sinks: persist a snapshot of the triggering frame and raise a
//! user-facing notification.
//!
//! The engine never looks inside a frame. Each sink picks its own `Frame`
//! type and the engine passes it through untouched.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Identifier of a persisted evidence artifact (a path for file sinks).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactId(pub String);

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("could not persist evidence: {0}")]
    Persist(#[from] std::io::Error),

    #[error("notification failed: {0}")]
    Notify(String),

    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

/// Destination for combined-alert evidence.
///
/// Implementations should tolerate repeated calls for the same condition.
pub trait EvidenceSink {
    type Frame: ?Sized;

    fn persist_and_notify(&mut self, frame: &Self::Frame, message: &str) -> Result<ArtifactId, SinkError>;
}

impl<S: EvidenceSink + ?Sized> EvidenceSink for &mut S {
    type Frame = S::Frame;

    fn persist_and_notify(&mut self, frame: &Self::Frame, message: &str) -> Result<ArtifactId, SinkError> {
        (**self).persist_and_notify(frame, message)
    }
}

/// Raises a notification for a persisted alert.
pub trait Notifier {
    fn notify(&self, title: &str, message: &str) -> Result<(), SinkError>;
}

/// Notifier that only logs.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, message: &str) -> Result<(), SinkError> {
        tracing::warn!(title, message, "alert notification");
        Ok(())
    }
}

/// Notifier that launches a desktop dialog program without waiting for it.
///
/// The child is reaped on a background thread, so a dialog left open never
/// holds up the event stream. A non-zero exit is only logged. The default program is `zenity --title <title> --info --text <message>`.
#[derive(Clone, Debug)]
pub struct CommandNotifier {
    pub program: String,
    pub extra_args: Vec<String>,
}

impl Default for CommandNotifier {
    fn default() -> Self {
        Self {
            program: "zenity".to_string(),
            extra_args: vec!["--info".to_string()],
        }
    }
}

impl Notifier for CommandNotifier {
    fn notify(&self, title: &str, message: &str) -> Result<(), SinkError> {
        let mut child = Command::new(&self.program)
            .arg("--title")
            .arg(title)
            .args(&self.extra_args)
            .arg("--text")
            .arg(message)
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => SinkError::Unavailable(format!("{} not found", self.program)),
                _ => SinkError::Notify(e.to_string()),
            })?;

        let program = self.program.clone();
        std::thread::Builder::new()
            .name("musth-notify-reaper".to_string())
            .spawn(move || match child.wait() {
                Ok(status) if !status.success() => {
                    tracing::warn!(program = %program, %status, "notification program failed");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(program = %program, error = %e, "notification program lost"),
            })
            .map_err(|e| SinkError::Notify(format!("could not start reaper: {e}")))?;
        Ok(())
    }
}

/// Writes encoded frame bytes into a directory as `Action<unix_seconds>.jpg`,
/// then notifies.
#[derive(Clone, Debug)]
pub struct DirectorySink<N> {
    dir: PathBuf,
    notifier: N,
    title: String,
}

impl<N: Notifier> DirectorySink<N> {
    pub fn new(dir: impl Into<PathBuf>, notifier: N) -> Self {
        Self {
            dir: dir.into(),
            notifier,
            title: "Alert".to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Pick `Action<secs>.jpg`, or `Action<secs>-<n>.jpg` when several alerts
    /// land in the same second.
    fn next_path(&self, secs: i64) -> PathBuf {
        let first = self.dir.join(format!("Action{secs}.jpg"));
        if !first.exists() {
            return first;
        }
        let mut n = 1u32;
        loop {
            let p = self.dir.join(format!("Action{secs}-{n}.jpg"));
            if !p.exists() {
                return p;
            }
            n += 1;
        }
    }
}

impl<N: Notifier> EvidenceSink for DirectorySink<N> {
    type Frame = [u8];

    fn persist_and_notify(&mut self, frame: &[u8], message: &str) -> Result<ArtifactId, SinkError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.next_path(Utc::now().timestamp());
        std::fs::write(&path, frame)?;
        let id = ArtifactId(path.display().to_string());
        tracing::info!(artifact = %id, bytes = frame.len(), "evidence saved");

        // the artifact stays on disk even if the notification fails
        self.notifier.notify(&self.title, message)?;
        Ok(id)
    }
}

/// In-memory sink that records every call. Frames are generic so tests and
/// embedders can pass whatever handle they use.
#[derive(Debug)]
pub struct RecordingSink<F> {
    pub calls: Vec<(F, String)>,
    pub fail_with: Option<String>,
}

impl<F> Default for RecordingSink<F> {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            fail_with: None,
        }
    }
}

impl<F> RecordingSink<F> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every call fails with `SinkError::Unavailable`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            calls: Vec::new(),
            fail_with: Some(reason.into()),
        }
    }
}

impl<F: Clone> EvidenceSink for RecordingSink<F> {
    type Frame = F;

    fn persist_and_notify(&mut self, frame: &F, message: &str) -> Result<ArtifactId, SinkError> {
        if let Some(reason) = &self.fail_with {
            return Err(SinkError::Unavailable(reason.clone()));
        }
        self.calls.push((frame.clone(), message.to_string()));
        Ok(ArtifactId(format!("recorded-{}", self.calls.len())))
    }
}
