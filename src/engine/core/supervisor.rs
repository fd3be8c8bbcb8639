// Runs one ffmpeg transcode and turns its diagnostic stream into progress events

use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::thread;
use std::time::SystemTime;

use tracing::{debug, error, info, warn};

use super::ffmpeg_cmd::{TranscodeCommand, build_transcode_cmd};
use super::filters::WatermarkStyle;
use super::progress::ProgressTracker;
use super::scan::{is_same_file, output_path_for};
use super::types::{JobState, TranscodeParams};
use crate::engine::error::{DIAGNOSTIC_TAIL_LINES, EngineError, EngineResult};
use crate::engine::events::{Event, EventSink, ProgressTick};
use crate::engine::probe::probe_duration;
use crate::engine::tools::{Locator, Tool};
use crate::engine::worker::ProcessRegistry;

/// Status string reported for a successful job
pub const STATUS_OK: &str = "OK";

/// Size and modification time of a regular file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub len: u64,
    pub modified: Option<SystemTime>,
}

/// File system operations the supervisor needs
pub trait Filesystem: Send + Sync {
    fn ensure_directory(&self, path: &Path) -> io::Result<()>;
    /// `None` unless `path` is an existing regular file
    fn stamp(&self, path: &Path) -> Option<FileStamp>;
    fn remove_file(&self, path: &Path) -> io::Result<()>;
}

/// The real file system
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl Filesystem for LocalFs {
    fn ensure_directory(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn stamp(&self, path: &Path) -> Option<FileStamp> {
        let meta = std::fs::metadata(path).ok().filter(|m| m.is_file())?;
        Some(FileStamp {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorOptions {
    pub output_directory: PathBuf,
    /// Replace existing outputs (`-y`) instead of failing
    pub overwrite: bool,
    pub watermark: WatermarkStyle,
}

impl SupervisorOptions {
    pub fn new(output_directory: impl Into<PathBuf>) -> Self {
        Self {
            output_directory: output_directory.into(),
            overwrite: false,
            watermark: WatermarkStyle::default(),
        }
    }
}

/// Runs transcode jobs and reports their progress to a shared sink
#[derive(Clone)]
pub struct Supervisor {
    locator: Locator,
    options: SupervisorOptions,
    sink: Arc<dyn EventSink>,
    fs: Arc<dyn Filesystem>,
    registry: ProcessRegistry,
}

impl Supervisor {
    pub fn new(locator: Locator, options: SupervisorOptions, sink: Arc<dyn EventSink>) -> Self {
        Self {
            locator,
            options,
            sink,
            fs: Arc::new(LocalFs),
            registry: ProcessRegistry::new(),
        }
    }

    pub fn with_filesystem(mut self, fs: Arc<dyn Filesystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn options(&self) -> &SupervisorOptions {
        &self.options
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// Terminate a running job; it then fails with [`EngineError::Cancelled`]
    pub fn cancel(&self, job_id: &str) -> bool {
        self.registry.cancel(job_id)
    }

    /// Output location for an input under the configured directory.
    /// Refuses a location that is the input itself.
    pub fn output_path(&self, input: &Path) -> EngineResult<PathBuf> {
        let output = output_path_for(input, &self.options.output_directory).ok_or_else(|| {
            EngineError::CommandBuild {
                reason: format!("{} has no file name", input.display()),
            }
        })?;
        if is_same_file(input, &output) {
            return Err(EngineError::CommandBuild {
                reason: format!(
                    "output {} would replace its own input; choose another output directory",
                    output.display()
                ),
            });
        }
        Ok(output)
    }

    /// The exact command a job would run, without running it
    pub fn command_for(
        &self,
        input: &Path,
        params: &TranscodeParams,
    ) -> EngineResult<TranscodeCommand> {
        let output = self.output_path(input)?;
        let command = build_transcode_cmd(
            &self.locator,
            input,
            &output,
            params,
            &self.options.watermark,
        )?;
        Ok(if self.options.overwrite {
            command.with_overwrite()
        } else {
            command
        })
    }

    /// Run a job and describe the outcome: `"OK"` or the error text
    pub fn run(&self, id: &str, input: &Path, params: &TranscodeParams) -> String {
        match self.transcode(id, input, params) {
            Ok(_) => STATUS_OK.to_string(),
            Err(e) => e.to_string(),
        }
    }

    /// Run a job to completion, returning the output path
    pub fn transcode(
        &self,
        id: &str,
        input: &Path,
        params: &TranscodeParams,
    ) -> EngineResult<PathBuf> {
        let mut state = JobState::Idle;
        let result = self.execute(id, input, params, &mut state);

        match &result {
            Ok(output) => {
                transition(id, &mut state, JobState::Succeeded);
                info!(job = id, output = %output.display(), "transcode finished");
            }
            Err(EngineError::Cancelled { .. }) => {
                transition(id, &mut state, JobState::Failed);
                warn!(job = id, "transcode cancelled");
            }
            Err(e) => {
                transition(id, &mut state, JobState::Failed);
                error!(job = id, "transcode failed: {}", e);
            }
        }

        result
    }

    fn execute(
        &self,
        id: &str,
        input: &Path,
        params: &TranscodeParams,
        state: &mut JobState,
    ) -> EngineResult<PathBuf> {
        transition(id, state, JobState::Starting);

        let output = self.output_path(input)?;
        let out_dir = &self.options.output_directory;
        self.fs
            .ensure_directory(out_dir)
            .map_err(|source| EngineError::OutputDirectory {
                path: out_dir.clone(),
                source,
            })?;

        let duration = match probe_duration(&self.locator, input) {
            Ok(d) => Some(d),
            Err(e) => {
                warn!(job = id, "duration unknown, progress without percentage: {:#}", e);
                None
            }
        };

        let command = self.command_for(input, params)?;
        let before = self.fs.stamp(&output);

        info!(
            job = id,
            input = %input.display(),
            output = %output.display(),
            "starting transcode"
        );

        let mut child = command
            .to_command()
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| EngineError::ProcessStart {
                tool: Tool::Ffmpeg,
                source,
            })?;

        let Some(stderr) = child.stderr.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(EngineError::ProcessStart {
                tool: Tool::Ffmpeg,
                source: io::Error::other("stderr was not captured"),
            });
        };

        self.registry.register(id, child.id());
        transition(id, state, JobState::Running);

        let sink = Arc::clone(&self.sink);
        let mut tracker = ProgressTracker::new(id, duration);
        let reader = thread::spawn(move || scan_diagnostics(stderr, &mut tracker, sink.as_ref()));

        let (waited, cancelled) = self.registry.wait_and_unregister(id, &mut child);
        let diagnostics = reader.join().unwrap_or_default();

        let status = match waited {
            Ok(status) if status.success() => {
                self.sink.emit(Event::Progress(ProgressTick::completed(id)));
                return Ok(output);
            }
            Ok(status) => status.to_string(),
            Err(e) => format!("unknown status ({})", e),
        };

        if self.written_by_run(input, &output, before) {
            match self.fs.remove_file(&output) {
                Ok(()) => debug!(job = id, "removed partial output {}", output.display()),
                Err(e) => warn!(job = id, "could not remove {}: {}", output.display(), e),
            }
        }

        if cancelled {
            return Err(EngineError::Cancelled { id: id.to_string() });
        }

        Err(EngineError::ProcessRuntime {
            status,
            diagnostics,
        })
    }

    /// Whether a failed run left behind a file it wrote itself. A file that
    /// is unchanged since before the spawn belongs to someone else.
    fn written_by_run(&self, input: &Path, output: &Path, before: Option<FileStamp>) -> bool {
        if is_same_file(input, output) {
            return false;
        }
        match (before, self.fs.stamp(output)) {
            (_, None) => false,
            (None, Some(_)) => true,
            // Without -y ffmpeg never opens an existing output
            (Some(old), Some(new)) => self.options.overwrite && old != new,
        }
    }
}

fn transition(id: &str, state: &mut JobState, next: JobState) {
    debug!(job = id, from = ?state, to = ?next, "job state");
    *state = next;
}

/// Progress keys ffmpeg writes with `-progress`; not useful as error context
fn is_progress_key(line: &str) -> bool {
    match line.split_once('=') {
        Some((key, value)) => {
            !key.is_empty()
                && key
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
                && !value.contains(char::is_whitespace)
        }
        None => false,
    }
}

/// Read a diagnostic stream to EOF, emitting a tick for every line that
/// carries an elapsed time. Returns the last few non-progress lines.
pub fn scan_diagnostics<R: Read>(
    stream: R,
    tracker: &mut ProgressTracker,
    sink: &dyn EventSink,
) -> Vec<String> {
    let mut reader = BufReader::new(stream);
    let mut tail: VecDeque<String> = VecDeque::with_capacity(DIAGNOSTIC_TAIL_LINES);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(job = tracker.job_id(), "diagnostic stream read error: {}", e);
                break;
            }
        }

        let text = String::from_utf8_lossy(&buf);
        let line = text.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            continue;
        }

        if let Some(tick) = tracker.on_line(line) {
            sink.emit(Event::Progress(tick));
        }

        if !is_progress_key(line) {
            if tail.len() == DIAGNOSTIC_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line.to_string());
        }
    }

    tail.into()
}
