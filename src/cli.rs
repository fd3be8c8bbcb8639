use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::config::DefaultsConfig;
use crate::engine::{
    AudioCodec, Event, EventSink, Rotation, Target, TranscodeParams, VideoCodec,
    WatermarkPlacement,
};

#[derive(Parser)]
#[command(name = "vidbatch", version)]
#[command(about = "Batch video transcoder driving ffmpeg", long_about = None)]
pub struct Cli {
    /// Log debug details (overrides VIDBATCH_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check that ffmpeg and ffprobe are installed and report host capabilities
    CheckTools,

    /// Print output directory, CPU threads and GPU support as JSON
    Info,

    /// Probe video files (or directories of them) and print their metadata as JSON
    Probe {
        #[arg(required = true, value_name = "PATH")]
        paths: Vec<PathBuf>,
    },

    /// Transcode video files (or directories of them)
    Transcode(TranscodeArgs),

    /// Show config status and location, or create default config if missing
    InitConfig,
}

#[derive(Args, Debug)]
pub struct TranscodeArgs {
    #[arg(required = true, value_name = "PATH")]
    pub paths: Vec<PathBuf>,

    /// h264, h265 or copy
    #[arg(long, default_value = "copy")]
    pub video_codec: String,

    /// aac, mp3 or copy
    #[arg(long, default_value = "copy")]
    pub audio_codec: String,

    /// Target height in pixels, or copy
    #[arg(long, default_value = "copy")]
    pub height: String,

    /// Target frame rate, or copy
    #[arg(long, default_value = "copy")]
    pub fps: String,

    /// Target video bitrate (e.g. 2M), or copy
    #[arg(long, default_value = "copy")]
    pub bitrate: String,

    /// Text to burn into the video
    #[arg(long, default_value = "")]
    pub watermark: String,

    /// top-right, random, horizontal, diagonal, bounce or spiral
    #[arg(long, default_value = "top-right")]
    pub placement: String,

    /// 90, 180, 270 or copy
    #[arg(long, default_value = "copy")]
    pub rotate: String,

    /// Use hardware encoders
    #[arg(long)]
    pub gpu: bool,

    /// ffmpeg -threads value (0 lets ffmpeg decide)
    #[arg(long)]
    pub threads: Option<u32>,

    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Number of files transcoded at the same time
    #[arg(long)]
    pub jobs: Option<usize>,

    /// Replace existing output files
    #[arg(long)]
    pub overwrite: bool,

    /// Print events as JSON lines instead of progress text
    #[arg(long)]
    pub json: bool,

    /// Show ffmpeg commands without executing
    #[arg(long)]
    pub dry_run: bool,
}

impl TranscodeArgs {
    /// Combine flags with configured defaults
    pub fn params(&self, defaults: &DefaultsConfig) -> Result<TranscodeParams> {
        Ok(TranscodeParams {
            video_codec: VideoCodec::from_name(&self.video_codec),
            audio_codec: AudioCodec::from_name(&self.audio_codec),
            video_height: Target::parse(&self.height)
                .with_context(|| format!("Invalid --height '{}'", self.height))?,
            fps: Target::parse(&self.fps)
                .with_context(|| format!("Invalid --fps '{}'", self.fps))?,
            video_bitrate: Target::parse(&self.bitrate)
                .with_context(|| format!("Invalid --bitrate '{}'", self.bitrate))?,
            watermark_content: self.watermark.clone(),
            watermark_placement: WatermarkPlacement::from_name(&self.placement),
            rotate: Rotation::from_name(&self.rotate),
            use_gpu: self.gpu || defaults.use_gpu,
            cpu_threads: self.threads.unwrap_or(defaults.cpu_threads),
        })
    }

    pub fn max_workers(&self, defaults: &DefaultsConfig) -> usize {
        self.jobs.unwrap_or(defaults.max_workers as usize).max(1)
    }
}

/// Prints one human-readable line per event
pub struct ConsoleSink {
    names: HashMap<String, String>,
}

impl ConsoleSink {
    /// `names` maps job ids to the label shown for them
    pub fn new(names: HashMap<String, String>) -> Self {
        Self { names }
    }

    pub fn format(&self, event: &Event) -> String {
        match event {
            Event::Progress(tick) => {
                let name = self.names.get(&tick.id).unwrap_or(&tick.id);
                match tick.percentage {
                    Some(pct) => format!("{}: {:5.1}% ({})", name, pct, tick.elapsed),
                    None => format!("{}: {}", name, tick.elapsed),
                }
            }
            Event::DirectorySelected(dir) => format!("Output directory: {}", dir),
            Event::FilesSelected(infos) => format!("{} file(s) selected", infos.len()),
            Event::FilesSelectionCancelled(reason) | Event::FilesSelectionFailed(reason) => {
                reason.clone()
            }
        }
    }
}

impl EventSink for ConsoleSink {
    fn emit(&self, event: Event) {
        println!("{}", self.format(&event));
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}
