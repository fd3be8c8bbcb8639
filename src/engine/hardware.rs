// Hardware acceleration and host capability detection
//
// Everything here is best effort: a missing or broken ffmpeg simply reports
// "not supported" instead of an error.

use std::path::Path;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use sysinfo::{CpuRefreshKind, RefreshKind, System};
use tracing::debug;

use super::tools::{Locator, Tool};

/// `-buildconf` switches that indicate some form of GPU acceleration
const ACCELERATION_FLAGS: &[&str] = &[
    "--enable-nvenc",  // NVIDIA NVENC
    "--enable-cuda",   // CUDA
    "--enable-cuvid",  // NVIDIA CUVID
    "--enable-libnpp", // NVIDIA Performance Primitives
    "--enable-amf",    // AMD AMF
    "--enable-vaapi",  // VA-API (Intel/AMD on Linux)
    "--enable-vdpau",  // VDPAU (NVIDIA on Linux)
    "--enable-libvda", // Apple video decode acceleration
    "--enable-opencl", // OpenCL
];

/// Encoder names the command builder can emit
pub const KNOWN_ENCODERS: &[&str] = &[
    "libx264",
    "libx265",
    "h264_nvenc",
    "hevc_nvenc",
    "libfdk_aac",
    "aac",
    "libmp3lame",
];

/// Check whether a `-buildconf` dump mentions any acceleration backend
pub fn buildconf_has_acceleration(buildconf: &str) -> bool {
    ACCELERATION_FLAGS
        .iter()
        .any(|flag| buildconf.contains(flag))
}

/// Check whether the located ffmpeg was built with GPU acceleration
pub fn gpu_supported(locator: &Locator) -> bool {
    let ffmpeg = match locator.locate(Tool::Ffmpeg) {
        Ok(path) => path,
        Err(e) => {
            debug!("GPU detection skipped: {}", e);
            return false;
        }
    };

    let output = ffmpeg
        .command()
        .arg("-buildconf")
        .stdin(Stdio::null())
        .output();

    match output {
        Ok(out) if out.status.success() => {
            let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&out.stderr));
            buildconf_has_acceleration(&text)
        }
        Ok(out) => {
            debug!("ffmpeg -buildconf exited with {}", out.status);
            false
        }
        Err(e) => {
            debug!("ffmpeg -buildconf could not run: {}", e);
            false
        }
    }
}

/// Which of the encoders we may request are compiled into ffmpeg
pub fn available_encoders(locator: &Locator) -> Vec<&'static str> {
    let Ok(ffmpeg) = locator.locate(Tool::Ffmpeg) else {
        return Vec::new();
    };

    let listing = ffmpeg
        .command()
        .args(["-hide_banner", "-encoders"])
        .stdin(Stdio::null())
        .output()
        .ok()
        .map(|o| String::from_utf8_lossy(&o.stdout).into_owned())
        .unwrap_or_default();

    encoders_in_listing(&listing)
}

fn encoders_in_listing(listing: &str) -> Vec<&'static str> {
    KNOWN_ENCODERS
        .iter()
        .copied()
        .filter(|name| {
            listing
                .lines()
                .any(|line| line.split_whitespace().nth(1) == Some(*name))
        })
        .collect()
}

/// Number of logical CPUs, usable as a `-threads` upper bound
pub fn cpu_thread_count() -> usize {
    let sys =
        System::new_with_specifics(RefreshKind::new().with_cpu(CpuRefreshKind::new()));
    sys.cpus().len().max(1)
}

/// Host facts a front end shows before any job runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostInfo {
    pub output_directory: String,
    pub cpu_thread: usize,
    pub gpu: bool,
}

pub fn host_info(locator: &Locator, output_directory: &Path) -> HostInfo {
    HostInfo {
        output_directory: output_directory.to_string_lossy().into_owned(),
        cpu_thread: cpu_thread_count(),
        gpu: gpu_supported(locator),
    }
}
