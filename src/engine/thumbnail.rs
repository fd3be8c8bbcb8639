// Single-frame thumbnail capture

use std::path::Path;
use std::process::Stdio;

use base64::{Engine, engine::general_purpose::STANDARD};

use super::error::{EngineError, EngineResult};
use super::tools::{Locator, Tool};

const DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

/// Grab the frame at one second as a JPEG data URI.
///
/// The image is read from ffmpeg's stdout; nothing touches the disk.
pub fn extract(locator: &Locator, path: &Path) -> EngineResult<String> {
    let ffmpeg = locator
        .locate(Tool::Ffmpeg)
        .map_err(|e| EngineError::Thumbnail(e.to_string()))?;

    let output = ffmpeg
        .command()
        .arg("-i")
        .arg(path)
        .args([
            "-ss", "00:00:01", "-vframes", "1", "-f", "image2", "-preset", "ultrafast", "pipe:1",
        ])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .map_err(|e| EngineError::Thumbnail(format!("failed to start ffmpeg: {}", e)))?;

    if !output.status.success() {
        return Err(EngineError::Thumbnail(format!(
            "ffmpeg exited with {}",
            output.status
        )));
    }

    if output.stdout.is_empty() {
        return Err(EngineError::Thumbnail("no image data produced".to_string()));
    }

    Ok(encode_data_uri(&output.stdout))
}

pub fn encode_data_uri(jpeg: &[u8]) -> String {
    format!("{}{}", DATA_URI_PREFIX, STANDARD.encode(jpeg))
}
