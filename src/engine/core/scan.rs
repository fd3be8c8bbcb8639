use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Video file extensions accepted from pickers, drops and directory scans
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "webm", "mov", "avi", "flv", "m4v", "wmv"];

/// Check if a path has a video file extension
pub fn is_video_file(path: &Path) -> bool {
    if let Some(ext) = path.extension() {
        if let Some(ext_str) = ext.to_str() {
            return VIDEO_EXTENSIONS.contains(&ext_str.to_lowercase().as_str());
        }
    }
    false
}

/// Scan a directory recursively for video files and invoke a callback for each file found
pub fn scan_streaming<F>(root: &Path, mut on_file: F) -> Result<()>
where
    F: FnMut(PathBuf),
{
    // Symlinks are not followed; a loop would never terminate
    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path.is_file() && is_video_file(path) {
            on_file(path.to_path_buf());
        }
    }

    Ok(())
}

/// Expand a mixed list of files and directories into video inputs.
///
/// Directories are scanned recursively; plain files are kept only when they
/// look like video. Order follows the input list.
pub fn collect_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut inputs = Vec::new();
    for path in paths {
        if path.is_dir() {
            scan_streaming(path, |file| inputs.push(file))?;
        } else if is_video_file(path) {
            inputs.push(path.clone());
        } else {
            debug!(path = %path.display(), "skipping non-video input");
        }
    }
    Ok(inputs)
}

/// Output location for an input: same file name inside `output_dir`
pub fn output_path_for(input: &Path, output_dir: &Path) -> Option<PathBuf> {
    input.file_name().map(|name| output_dir.join(name))
}

/// True when `output` names the same file as `input`, following symlinks
/// and relative components. `output` itself need not exist yet.
pub fn is_same_file(input: &Path, output: &Path) -> bool {
    if input == output {
        return true;
    }
    let Ok(input) = input.canonicalize() else {
        return false;
    };
    let (Some(dir), Some(name)) = (output.parent(), output.file_name()) else {
        return false;
    };
    let dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };
    dir.canonicalize()
        .map(|dir| dir.join(name) == input)
        .unwrap_or(false)
}
