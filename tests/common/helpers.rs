use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc::Receiver;

use vidbatch::engine::{Event, Locator, ProgressTick, Tool};

/// Join arguments with spaces, for snapshot assertions
pub fn args_to_string(args: &[OsString]) -> String {
    args.iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Both ffmpeg and ffprobe are on PATH and runnable
pub fn is_ffmpeg_available() -> bool {
    let locator = Locator::new();
    locator.locate(Tool::Ffmpeg).is_ok() && locator.locate(Tool::Ffprobe).is_ok()
}

/// Generate a small test clip with the lavfi test source.
/// mpeg4 is used because every ffmpeg build ships it.
pub fn generate_test_video(output_path: &Path, duration_secs: f32) -> Result<()> {
    let output = Command::new("ffmpeg")
        .arg("-y")
        .arg("-f")
        .arg("lavfi")
        .arg("-i")
        .arg(format!(
            "testsrc=duration={}:size=160x120:rate=30",
            duration_secs
        ))
        .arg("-c:v")
        .arg("mpeg4")
        .arg("-threads")
        .arg("1")
        .arg("-an")
        .arg(output_path)
        .stdin(Stdio::null())
        .output()
        .context("Failed to generate test video")?;

    if !output.status.success() {
        anyhow::bail!(
            "Failed to generate test video: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(())
}

/// Drain every progress tick currently queued on a channel sink
pub fn collect_ticks(rx: &Receiver<Event>) -> Vec<ProgressTick> {
    rx.try_iter()
        .filter_map(|event| match event {
            Event::Progress(tick) => Some(tick),
            _ => None,
        })
        .collect()
}

/// Percentages never decrease and never exceed 100
pub fn assert_monotone(ticks: &[ProgressTick]) {
    let mut last = 0.0;
    for tick in ticks {
        if let Some(pct) = tick.percentage {
            assert!(pct >= last, "percentage went backwards: {:?}", ticks);
            assert!(pct <= 100.0, "percentage above 100: {:?}", ticks);
            last = pct;
        }
    }
}
