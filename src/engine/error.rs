use std::io;
use std::path::PathBuf;
use thiserror::Error;

use super::tools::Tool;

/// Number of trailing diagnostic lines kept for failure reports
pub const DIAGNOSTIC_TAIL_LINES: usize = 10;

/// Failures surfaced by the transcode and probe engine.
///
/// Only the tool, command, start and runtime variants terminate a transcode
/// job. Thumbnail failures are absorbed by the prober, and metadata/progress
/// parse problems never become errors at all.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{tool} is not available: {reason}")]
    ToolUnavailable { tool: Tool, reason: String },

    #[error("failed to build ffmpeg command: {reason}")]
    CommandBuild { reason: String },

    #[error("failed to create output directory {}: {source}", path.display())]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to start {tool}: {source}")]
    ProcessStart {
        tool: Tool,
        #[source]
        source: io::Error,
    },

    #[error("ffmpeg failed with {status}{}", format_diagnostics(.diagnostics))]
    ProcessRuntime {
        status: String,
        diagnostics: Vec<String>,
    },

    #[error("ffprobe failed for {}: {reason}", path.display())]
    Probe { path: PathBuf, reason: String },

    #[error("thumbnail extraction failed: {0}")]
    Thumbnail(String),

    #[error("output {} is already claimed by job {job}", path.display())]
    OutputConflict { path: PathBuf, job: String },

    #[error("job {id} was cancelled")]
    Cancelled { id: String },
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// True for failures that end a transcode job with an error status
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Thumbnail(_))
    }
}

fn format_diagnostics(lines: &[String]) -> String {
    if lines.is_empty() {
        String::new()
    } else {
        format!("\n\nFFmpeg error:\n{}", lines.join("\n"))
    }
}
