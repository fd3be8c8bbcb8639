use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Wire word meaning "leave this property as it is in the source"
pub const UNCHANGED: &str = "copy";

/// A requested output property, or "keep the source value".
///
/// On the wire `"copy"` (or an empty string) means [`Target::Unchanged`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target<T> {
    Unchanged,
    To(T),
}

impl<T> Default for Target<T> {
    fn default() -> Self {
        Self::Unchanged
    }
}

impl<T> Target<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Unchanged => None,
            Self::To(v) => Some(v),
        }
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, Self::Unchanged)
    }
}

impl<T: FromStr> Target<T> {
    /// Parse a user/wire value, treating `copy` and blanks as unchanged
    pub fn parse(raw: &str) -> Result<Self, T::Err> {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case(UNCHANGED) {
            Ok(Self::Unchanged)
        } else {
            raw.parse().map(Self::To)
        }
    }
}

impl<T: fmt::Display> fmt::Display for Target<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unchanged => f.write_str(UNCHANGED),
            Self::To(v) => v.fmt(f),
        }
    }
}

impl<T: fmt::Display> Serialize for Target<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// Front ends send both "720" and 720
#[derive(Deserialize)]
#[serde(untagged)]
enum RawTarget {
    Text(String),
    Unsigned(u64),
    Float(f64),
}

impl<'de, T> Deserialize<'de> for Target<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = match RawTarget::deserialize(deserializer)? {
            RawTarget::Text(s) => s,
            RawTarget::Unsigned(n) => n.to_string(),
            RawTarget::Float(f) => f.to_string(),
        };
        Target::parse(&raw).map_err(de::Error::custom)
    }
}

/// Requested video codec family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VideoCodec {
    #[default]
    Passthrough,
    H264,
    H265,
}

impl VideoCodec {
    /// Unknown names fall back to passthrough
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "h264" | "avc" => Self::H264,
            "h265" | "hevc" => Self::H265,
            _ => Self::Passthrough,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passthrough => UNCHANGED,
            Self::H264 => "h264",
            Self::H265 => "h265",
        }
    }
}

impl From<String> for VideoCodec {
    fn from(name: String) -> Self {
        Self::from_name(&name)
    }
}

impl From<VideoCodec> for String {
    fn from(codec: VideoCodec) -> Self {
        codec.as_str().to_string()
    }
}

/// Requested audio codec family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AudioCodec {
    #[default]
    Passthrough,
    Aac,
    Mp3,
}

impl AudioCodec {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "aac" => Self::Aac,
            "mp3" => Self::Mp3,
            _ => Self::Passthrough,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passthrough => UNCHANGED,
            Self::Aac => "aac",
            Self::Mp3 => "mp3",
        }
    }
}

impl From<String> for AudioCodec {
    fn from(name: String) -> Self {
        Self::from_name(&name)
    }
}

impl From<AudioCodec> for String {
    fn from(codec: AudioCodec) -> Self {
        codec.as_str().to_string()
    }
}

/// Clockwise rotation applied after scaling and watermarking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    /// `copy`, `none`, `0` and anything unknown mean no rotation
    pub fn from_name(name: &str) -> Self {
        match name.trim() {
            "90" => Self::Cw90,
            "180" => Self::Cw180,
            "270" => Self::Cw270,
            _ => Self::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => UNCHANGED,
            Self::Cw90 => "90",
            Self::Cw180 => "180",
            Self::Cw270 => "270",
        }
    }
}

impl From<String> for Rotation {
    fn from(name: String) -> Self {
        Self::from_name(&name)
    }
}

impl From<Rotation> for String {
    fn from(rotation: Rotation) -> Self {
        rotation.as_str().to_string()
    }
}

/// How a burned-in text watermark moves across the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WatermarkPlacement {
    /// Fixed in the top-right corner
    #[default]
    TopRight,
    /// Jumps between the four corners
    Random,
    /// Sine sweep along the horizontal center line
    Horizontal,
    /// Linear drift from the top-left towards the bottom-right
    Diagonal,
    /// Two independent sinusoids on x and y
    Bounce,
    /// Combined sin+cos orbit around the center
    Spiral,
}

impl WatermarkPlacement {
    pub const ALL: [WatermarkPlacement; 6] = [
        Self::TopRight,
        Self::Random,
        Self::Horizontal,
        Self::Diagonal,
        Self::Bounce,
        Self::Spiral,
    ];

    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "random" => Self::Random,
            "horizontal" => Self::Horizontal,
            "diagonal" => Self::Diagonal,
            "bounce" => Self::Bounce,
            "spiral" => Self::Spiral,
            _ => Self::TopRight,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TopRight => "top-right",
            Self::Random => "random",
            Self::Horizontal => "horizontal",
            Self::Diagonal => "diagonal",
            Self::Bounce => "bounce",
            Self::Spiral => "spiral",
        }
    }
}

impl From<String> for WatermarkPlacement {
    fn from(name: String) -> Self {
        Self::from_name(&name)
    }
}

impl From<WatermarkPlacement> for String {
    fn from(placement: WatermarkPlacement) -> Self {
        placement.as_str().to_string()
    }
}

/// One transcode request, as submitted by the front end
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeParams {
    pub video_codec: VideoCodec,
    pub audio_codec: AudioCodec,
    pub video_height: Target<u32>,
    pub fps: Target<String>,
    pub video_bitrate: Target<String>,
    pub watermark_content: String,
    pub watermark_placement: WatermarkPlacement,
    pub rotate: Rotation,
    pub use_gpu: bool,
    pub cpu_threads: u32,
}

impl TranscodeParams {
    /// Watermark text, if one was requested
    pub fn watermark(&self) -> Option<&str> {
        if self.watermark_content.is_empty() {
            None
        } else {
            Some(&self.watermark_content)
        }
    }
}

/// Lifecycle of a single transcode attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Idle,
    Starting,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}
