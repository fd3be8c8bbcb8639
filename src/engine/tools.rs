// Locating and validating the external ffmpeg/ffprobe executables

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

use super::error::{EngineError, EngineResult};

/// External programs the engine drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    Ffmpeg,
    Ffprobe,
}

impl Tool {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ffmpeg => "ffmpeg",
            Self::Ffprobe => "ffprobe",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A tool executable that answered `-version` successfully
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPath {
    tool: Tool,
    path: PathBuf,
}

impl ToolPath {
    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start a command for this tool (console window hidden on Windows)
    pub fn command(&self) -> Command {
        command_for(&self.path)
    }
}

/// Create a `Command` for an external program without flashing a console
/// window on Windows.
pub fn command_for(program: &Path) -> Command {
    #[allow(unused_mut)]
    let mut cmd = Command::new(program);
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    cmd
}

/// Resolves tool executables.
///
/// By default the `PATH` environment is searched. A search path override
/// restricts lookup to the given directories.
#[derive(Debug, Clone, Default)]
pub struct Locator {
    search_path: Option<OsString>,
}

impl Locator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Search only these directories (same syntax as `PATH`)
    pub fn with_search_path(search_path: impl Into<OsString>) -> Self {
        Self {
            search_path: Some(search_path.into()),
        }
    }

    /// Find a tool and check that it runs
    pub fn locate(&self, tool: Tool) -> EngineResult<ToolPath> {
        let path = self.find(tool)?;

        let status = command_for(&path)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| EngineError::ToolUnavailable {
                tool,
                reason: format!("{} cannot be executed: {}", path.display(), e),
            })?;

        if !status.success() {
            return Err(EngineError::ToolUnavailable {
                tool,
                reason: format!("{} -version failed with {}", path.display(), status),
            });
        }

        debug!(tool = %tool, path = %path.display(), "located tool");
        Ok(ToolPath { tool, path })
    }

    /// First line of the tool's `-version` output
    pub fn version(&self, tool: Tool) -> EngineResult<String> {
        let located = self.locate(tool)?;
        let output = located
            .command()
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .map_err(|source| EngineError::ProcessStart { tool, source })?;

        let text = String::from_utf8_lossy(&output.stdout);
        Ok(text.lines().next().unwrap_or("Unknown version").to_string())
    }

    #[cfg(windows)]
    fn find(&self, tool: Tool) -> EngineResult<PathBuf> {
        // Bundled copy next to the program wins over anything on PATH
        let local = Path::new(".")
            .join("ffmpeg")
            .join(format!("{}.exe", tool.name()));
        if local.is_file() {
            return Ok(local);
        }

        self.search(&format!("{}.exe", tool.name()))
            .or_else(|_| self.search(tool.name()))
            .map_err(|e| EngineError::ToolUnavailable {
                tool,
                reason: format!("not found on Windows: {}", e),
            })
    }

    #[cfg(not(windows))]
    fn find(&self, tool: Tool) -> EngineResult<PathBuf> {
        self.search(tool.name())
            .map_err(|e| EngineError::ToolUnavailable {
                tool,
                reason: format!("not found in search path: {}", e),
            })
    }

    fn search(&self, binary: &str) -> Result<PathBuf, which::Error> {
        match &self.search_path {
            Some(paths) => {
                let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
                which::which_in(binary, Some(paths), cwd)
            }
            None => which::which(binary),
        }
    }
}

/// Locate a tool on the default search path
pub fn locate(tool: Tool) -> EngineResult<ToolPath> {
    Locator::new().locate(tool)
}
