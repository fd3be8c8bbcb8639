// Events pushed to the host (UI, CLI, log) and the sinks that carry them

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError, mpsc};

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::probe::VideoInfo;

/// One progress update for a transcode job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressTick {
    pub id: String,
    /// 0-100; absent while the source duration is unknown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
    /// `HH:MM:SS.frac`, or `completed` for the final tick
    pub elapsed: String,
}

impl ProgressTick {
    pub const COMPLETED: &'static str = "completed";

    /// Synthetic last tick sent after a successful exit
    pub fn completed(id: &str) -> Self {
        Self {
            id: id.to_string(),
            percentage: Some(100.0),
            elapsed: Self::COMPLETED.to_string(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.elapsed == Self::COMPLETED
    }
}

/// Host-facing events, tagged with the names front ends subscribe to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum Event {
    #[serde(rename = "videoTranscodeProcessor")]
    Progress(ProgressTick),

    #[serde(rename = "filesSelectedMultipleVideoFilesSuccess")]
    FilesSelected(Vec<VideoInfo>),

    #[serde(rename = "filesSelectedMultipleVideoFilesCancelled")]
    FilesSelectionCancelled(String),

    #[serde(rename = "filesSelectedMultipleVideoFilesError")]
    FilesSelectionFailed(String),

    #[serde(rename = "directorySelectedSetOutput")]
    DirectorySelected(String),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Progress(_) => "videoTranscodeProcessor",
            Self::FilesSelected(_) => "filesSelectedMultipleVideoFilesSuccess",
            Self::FilesSelectionCancelled(_) => "filesSelectedMultipleVideoFilesCancelled",
            Self::FilesSelectionFailed(_) => "filesSelectedMultipleVideoFilesError",
            Self::DirectorySelected(_) => "directorySelectedSetOutput",
        }
    }
}

/// Destination for events. Shared by every job, so it must be thread safe.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

impl EventSink for mpsc::Sender<Event> {
    fn emit(&self, event: Event) {
        // A dropped receiver just means nobody is listening any more
        let _ = self.send(event);
    }
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn emit(&self, event: Event) {
        (**self).emit(event)
    }
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: Event) {}
}

/// Writes one JSON object per line
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> EventSink for JsonLinesSink<W> {
    fn emit(&self, event: Event) {
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                warn!("failed to serialize {} event: {}", event.name(), e);
                return;
            }
        };

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
            warn!("failed to write event: {}", e);
        }
    }
}
