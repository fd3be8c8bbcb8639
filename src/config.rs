// Global configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::engine::{SupervisorOptions, WatermarkStyle};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Where transcoded files go; empty means `output/` next to the executable
    #[serde(default)]
    pub directory: String,

    /// Replace existing output files instead of failing the job
    #[serde(default)]
    pub overwrite: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Default number of concurrent jobs
    #[serde(default = "default_max_workers")]
    pub max_workers: u32,

    /// `-threads` for each job (0 leaves it to ffmpeg)
    #[serde(default)]
    pub cpu_threads: u32,

    /// Prefer NVENC and ffmpeg's native audio encoders
    #[serde(default)]
    pub use_gpu: bool,

    /// Font file for burned-in watermarks (empty uses drawtext's default font)
    #[serde(default = "default_watermark_font")]
    pub watermark_font: String,
}

fn default_max_workers() -> u32 {
    1
}

fn default_watermark_font() -> String {
    WatermarkStyle::default().font_file.unwrap_or_default()
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            cpu_threads: 0,
            use_gpu: false,
            watermark_font: default_watermark_font(),
        }
    }
}

/// `output/` beside the running executable, or under the working directory
/// when the executable location is unknown
pub fn default_output_directory() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
        .join("output")
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "macos") {
            dirs::home_dir()
                .context("Could not determine home directory")?
                .join(".config")
                .join("vidbatch")
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("vidbatch")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Load config from disk, or create default if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();

            // A read-only config directory is not a reason to refuse to run
            if let Err(e) = config.save() {
                warn!("Could not create default config file: {:#}", e);
                warn!("Using built-in defaults. Run 'vidbatch init-config' to create a config file.");
            }

            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Save config to disk
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Check if config file exists
    pub fn exists() -> bool {
        Self::config_path().map(|p| p.exists()).unwrap_or(false)
    }

    /// Create a default config file if it doesn't exist
    pub fn ensure_default() -> Result<()> {
        if !Self::exists() {
            let config = Config::default();
            config.save()?;
        }
        Ok(())
    }

    pub fn resolved_output_directory(&self) -> PathBuf {
        if self.output.directory.trim().is_empty() {
            default_output_directory()
        } else {
            PathBuf::from(&self.output.directory)
        }
    }

    pub fn watermark_style(&self) -> WatermarkStyle {
        if self.defaults.watermark_font.is_empty() {
            WatermarkStyle::without_font()
        } else {
            WatermarkStyle::with_font(&self.defaults.watermark_font)
        }
    }

    pub fn supervisor_options(&self) -> SupervisorOptions {
        SupervisorOptions {
            output_directory: self.resolved_output_directory(),
            overwrite: self.output.overwrite,
            watermark: self.watermark_style(),
        }
    }
}
