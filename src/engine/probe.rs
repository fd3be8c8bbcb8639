// Media probing using ffprobe

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use super::core::is_video_file;
use super::error::{EngineError, EngineResult};
use super::events::Event;
use super::thumbnail;
use super::tools::{Locator, Tool};

/// Container section of `ffprobe -show_format`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProbeFormat {
    pub filename: Option<String>,
    pub format_name: Option<String>,
    pub duration: Option<String>,
    pub size: Option<String>,
    pub bit_rate: Option<String>,
}

/// One entry of `ffprobe -show_streams`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProbeStream {
    pub codec_type: Option<String>,
    pub codec_name: Option<String>,
    pub width: u32,
    pub height: u32,
    pub avg_frame_rate: Option<String>,
    pub duration: Option<String>,
    pub bit_rate: Option<String>,
}

/// Raw ffprobe JSON document
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProbeReport {
    pub format: ProbeFormat,
    pub streams: Vec<ProbeStream>,
}

impl ProbeReport {
    fn first_stream(&self, codec_type: &str) -> Option<&ProbeStream> {
        self.streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some(codec_type))
    }
}

/// Normalized metadata for one media file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub id: String,
    pub name: String,
    pub path: String,
    /// `data:image/jpeg;base64,...`; `None` when no frame could be grabbed
    pub thumbnail: Option<String>,
    pub size: u64,
    pub duration: f64,
    pub bitrate: u64,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub audio_codec: String,
    pub video_codec: String,
    pub video_bitrate: u64,
    pub audio_bitrate: u64,
}

impl VideoInfo {
    /// Derive metadata from a parsed report. Unparsable numbers become zero.
    pub fn from_report(input: &Path, report: &ProbeReport) -> Self {
        let format = &report.format;

        let mut info = VideoInfo {
            id: Uuid::new_v4().to_string(),
            name: input
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| input.to_string_lossy().into_owned()),
            path: format
                .filename
                .clone()
                .filter(|f| !f.is_empty())
                .unwrap_or_else(|| input.to_string_lossy().into_owned()),
            thumbnail: None,
            size: parse_u64(format.size.as_deref()),
            duration: parse_f64(format.duration.as_deref()),
            bitrate: parse_u64(format.bit_rate.as_deref()),
            width: 0,
            height: 0,
            fps: 0,
            audio_codec: String::new(),
            video_codec: String::new(),
            video_bitrate: 0,
            audio_bitrate: 0,
        };

        if let Some(video) = report.first_stream("video") {
            info.video_codec = video.codec_name.clone().unwrap_or_default();
            info.width = video.width;
            info.height = video.height;
            info.fps = video
                .avg_frame_rate
                .as_deref()
                .map(integer_frame_rate)
                .unwrap_or(0);

            if info.duration == 0.0 {
                info.duration = parse_f64(video.duration.as_deref());
            }

            info.video_bitrate = parse_u64(video.bit_rate.as_deref());
            if info.bitrate == 0 {
                info.bitrate = info.video_bitrate;
            }
        }

        if let Some(audio) = report.first_stream("audio") {
            info.audio_codec = audio.codec_name.clone().unwrap_or_default();
            info.audio_bitrate = parse_u64(audio.bit_rate.as_deref());
        }

        info
    }
}

/// Frames per second from a `num/den` rate, truncated to an integer.
/// Unknown (`0/0`), zero-denominator and malformed rates give 0.
pub fn integer_frame_rate(rate: &str) -> u32 {
    let Some((num, den)) = rate.split_once('/') else {
        return 0;
    };
    match (num.trim().parse::<u64>(), den.trim().parse::<u64>()) {
        (Ok(num), Ok(den)) if den != 0 => u32::try_from(num / den).unwrap_or(u32::MAX),
        _ => 0,
    }
}

fn parse_u64(value: Option<&str>) -> u64 {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

fn parse_f64(value: Option<&str>) -> f64 {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Parse ffprobe's JSON output
pub fn parse_probe_output(json: &[u8]) -> Result<ProbeReport> {
    serde_json::from_slice(json).context("Failed to parse ffprobe JSON output")
}

/// Run ffprobe and normalize its report, without a thumbnail
pub fn probe_metadata(locator: &Locator, path: &Path) -> EngineResult<VideoInfo> {
    let ffprobe = locator.locate(Tool::Ffprobe)?;

    let output = ffprobe
        .command()
        .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .map_err(|source| EngineError::ProcessStart {
            tool: Tool::Ffprobe,
            source,
        })?;

    if !output.status.success() {
        return Err(EngineError::Probe {
            path: path.to_path_buf(),
            reason: format!("ffprobe exited with {}", output.status),
        });
    }

    let report = parse_probe_output(&output.stdout).map_err(|e| EngineError::Probe {
        path: path.to_path_buf(),
        reason: format!("{:#}", e),
    })?;

    Ok(VideoInfo::from_report(path, &report))
}

/// Probe a file, including a thumbnail when one can be extracted
pub fn probe(locator: &Locator, path: &Path) -> EngineResult<VideoInfo> {
    let mut info = probe_metadata(locator, path)?;

    match thumbnail::extract(locator, path) {
        Ok(uri) => info.thumbnail = Some(uri),
        Err(e) => warn!("no thumbnail for {}: {}", path.display(), e),
    }

    Ok(info)
}

#[derive(Debug, Deserialize)]
struct DurationFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DurationOutput {
    format: DurationFormat,
}

/// Parse duration from ffprobe JSON string
pub fn parse_ffprobe_duration(json: &str) -> Result<f64> {
    let probe: DurationOutput =
        serde_json::from_str(json).context("Failed to parse ffprobe JSON")?;

    let duration_str = probe.format.duration.context("No duration found in JSON")?;

    duration_str
        .parse::<f64>()
        .context("Failed to parse duration as float")
}

/// Probe a media file to get its duration in seconds
pub fn probe_duration(locator: &Locator, path: &Path) -> Result<f64> {
    let ffprobe = locator.locate(Tool::Ffprobe)?;

    let output = ffprobe
        .command()
        .args(["-v", "quiet", "-print_format", "json", "-show_format"])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .context("Failed to execute ffprobe")?;

    if !output.status.success() {
        anyhow::bail!(
            "ffprobe failed for {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr)
        );
    }

    parse_ffprobe_duration(&String::from_utf8_lossy(&output.stdout))
}

/// Probe a selection of files, as a file picker or drop would deliver them.
///
/// Non-video paths are ignored and files that fail to probe are logged and
/// left out. An empty selection reports a cancellation.
pub fn probe_many(locator: &Locator, paths: &[PathBuf]) -> Event {
    if paths.is_empty() {
        return Event::FilesSelectionCancelled("no files selected".to_string());
    }

    let mut infos = Vec::new();
    for path in paths.iter().filter(|p| is_video_file(p)) {
        match probe(locator, path) {
            Ok(info) => infos.push(info),
            Err(e) => warn!("skipping {}: {}", path.display(), e),
        }
    }

    debug!(selected = paths.len(), probed = infos.len(), "probed selection");
    Event::FilesSelected(infos)
}
