use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use super::filters::{WatermarkStyle, filter_chain};
use super::types::{AudioCodec, TranscodeParams, VideoCodec};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::tools::{Locator, Tool, command_for};

/// Encoder name for `-c:v`.
///
/// Burning in a watermark needs decoded frames, so passthrough is upgraded
/// to H.264 whenever watermark text is present.
pub fn resolve_video_codec(params: &TranscodeParams) -> &'static str {
    let codec = match (params.video_codec, params.watermark().is_some()) {
        (VideoCodec::Passthrough, true) => VideoCodec::H264,
        (codec, _) => codec,
    };

    match (codec, params.use_gpu) {
        (VideoCodec::H264, true) => "h264_nvenc",
        (VideoCodec::H264, false) => "libx264",
        (VideoCodec::H265, true) => "hevc_nvenc",
        (VideoCodec::H265, false) => "libx265",
        (VideoCodec::Passthrough, _) => "copy",
    }
}

/// Encoder name for `-c:a`
pub fn resolve_audio_codec(params: &TranscodeParams) -> &'static str {
    match (params.audio_codec, params.use_gpu) {
        (AudioCodec::Aac, true) => "aac",
        (AudioCodec::Aac, false) => "libfdk_aac",
        (AudioCodec::Mp3, true) => "mp3",
        (AudioCodec::Mp3, false) => "libmp3lame",
        (AudioCodec::Passthrough, _) => "copy",
    }
}

/// Ordered ffmpeg arguments for one transcode, without the program name
pub fn transcode_args(
    input: &Path,
    output: &Path,
    params: &TranscodeParams,
    style: &WatermarkStyle,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-i".into(), input.into()];

    if params.cpu_threads > 0 {
        args.push("-threads".into());
        args.push(params.cpu_threads.to_string().into());
    }

    args.push("-c:v".into());
    args.push(resolve_video_codec(params).into());
    args.push("-c:a".into());
    args.push(resolve_audio_codec(params).into());

    if let Some(chain) = filter_chain(params, style) {
        args.push("-vf".into());
        args.push(chain.into());
    }

    if let Some(fps) = params.fps.value() {
        args.push("-r".into());
        args.push(fps.into());
    }

    if let Some(bitrate) = params.video_bitrate.value() {
        args.push("-b:v".into());
        args.push(bitrate.into());
    }

    // Progress goes to stderr alongside the regular diagnostics
    args.push("-progress".into());
    args.push("pipe:2".into());
    args.push("-nostats".into());

    args.push(output.into());
    args
}

/// A fully resolved ffmpeg invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl TranscodeCommand {
    pub fn new(program: impl Into<PathBuf>, args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Prepend the global `-y` so an existing output is replaced
    pub fn with_overwrite(mut self) -> Self {
        if self.args.first().map(OsString::as_os_str) != Some(OsStr::new("-y")) {
            self.args.insert(0, "-y".into());
        }
        self
    }

    pub fn to_command(&self) -> Command {
        let mut cmd = command_for(&self.program);
        cmd.args(&self.args);
        cmd
    }

    /// Shell-quoted command line for logs and dry runs
    pub fn display(&self) -> String {
        let program = self.program.to_string_lossy();
        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        let words = std::iter::once(program.as_ref()).chain(args.iter().map(String::as_str));

        shlex::try_join(words).unwrap_or_else(|_| {
            // Interior NUL bytes cannot be quoted; fall back to plain joining
            std::iter::once(program.to_string())
                .chain(args.iter().cloned())
                .collect::<Vec<_>>()
                .join(" ")
        })
    }
}

/// Locate ffmpeg and build the transcode command for one input
pub fn build_transcode_cmd(
    locator: &Locator,
    input: &Path,
    output: &Path,
    params: &TranscodeParams,
    style: &WatermarkStyle,
) -> EngineResult<TranscodeCommand> {
    let ffmpeg = locator
        .locate(Tool::Ffmpeg)
        .map_err(|e| EngineError::CommandBuild {
            reason: e.to_string(),
        })?;

    let cmd = TranscodeCommand::new(
        ffmpeg.path(),
        transcode_args(input, output, params, style),
    );
    debug!(command = %cmd.display(), "built transcode command");
    Ok(cmd)
}
