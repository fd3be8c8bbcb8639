// Video filter chain construction (`-vf`)

use super::types::{Rotation, Target, TranscodeParams, WatermarkPlacement};

/// Characters drawtext treats as option or expression syntax
const DRAWTEXT_SPECIALS: &[char] = &[':', ',', '[', ']', '=', '+', '~', '%', '&', '^', '!'];

/// Font used by default on Windows, where drawtext has no fontconfig fallback
#[cfg(windows)]
const DEFAULT_FONT_FILE: Option<&str> = Some("msyh.ttc");
#[cfg(not(windows))]
const DEFAULT_FONT_FILE: Option<&str> = None;

/// Rendering settings for the burned-in watermark
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatermarkStyle {
    /// `fontfile=` value; `None` lets drawtext pick its default font
    pub font_file: Option<String>,
}

impl Default for WatermarkStyle {
    fn default() -> Self {
        Self {
            font_file: DEFAULT_FONT_FILE.map(str::to_string),
        }
    }
}

impl WatermarkStyle {
    pub fn with_font(font_file: impl Into<String>) -> Self {
        Self {
            font_file: Some(font_file.into()),
        }
    }

    pub fn without_font() -> Self {
        Self { font_file: None }
    }
}

/// Escape text for use inside a quoted drawtext `text='...'` value.
///
/// Single pass, so backslashes introduced for one character are never
/// escaped again for another.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 2);
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("'\\\\\\''"),
            c if DRAWTEXT_SPECIALS.contains(&c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

pub fn rotation_filter(rotation: Rotation) -> Option<&'static str> {
    match rotation {
        Rotation::None => None,
        Rotation::Cw90 => Some("transpose=1"),
        Rotation::Cw180 => Some("transpose=1,transpose=1"),
        Rotation::Cw270 => Some("transpose=2"),
    }
}

/// Scale to a target height, keeping the aspect ratio
pub fn scale_filter(height: &Target<u32>) -> Option<String> {
    height.value().map(|h| format!("scale=-1:{}", h))
}

/// drawtext x/y expressions for a placement
pub fn placement_coordinates(placement: WatermarkPlacement) -> (&'static str, &'static str) {
    match placement {
        WatermarkPlacement::TopRight => ("w-tw-20", "20"),
        WatermarkPlacement::Random => (
            "if(lt(sin(t*0.5)\\,0)\\,20\\,w-tw-20)",
            "if(lt(cos(t*0.3)\\,0)\\,20\\,h-th-20)",
        ),
        WatermarkPlacement::Horizontal => ("w/2+(w/4)*sin(2*PI*t/8)", "h/2"),
        WatermarkPlacement::Diagonal => ("w*t/30", "h*t/30"),
        WatermarkPlacement::Bounce => (
            "w/2+(w/3)*sin(2*PI*t/10)",
            "h/2+(h/3)*cos(2*PI*t/7)",
        ),
        WatermarkPlacement::Spiral => (
            "w/2+(w/4)*(sin(2*PI*t/12)+cos(2*PI*t/6))",
            "h/2+(h/4)*(cos(2*PI*t/12)-sin(2*PI*t/6))",
        ),
    }
}

pub fn watermark_filter(
    text: &str,
    placement: WatermarkPlacement,
    style: &WatermarkStyle,
) -> String {
    let (x, y) = placement_coordinates(placement);
    let font = style
        .font_file
        .as_deref()
        .map(|f| format!("fontfile={}:", f))
        .unwrap_or_default();

    format!(
        "drawtext={}text='{}':fontcolor=white:fontsize=24:x={}:y={}:borderw=2:bordercolor=black",
        font,
        escape_text(text),
        x,
        y
    )
}

/// Complete `-vf` value: scale, then watermark, then rotation.
/// `None` when no filter is needed.
pub fn filter_chain(params: &TranscodeParams, style: &WatermarkStyle) -> Option<String> {
    let mut filters: Vec<String> = Vec::new();

    if let Some(scale) = scale_filter(&params.video_height) {
        filters.push(scale);
    }

    if let Some(text) = params.watermark() {
        filters.push(watermark_filter(text, params.watermark_placement, style));
    }

    if let Some(rotation) = rotation_filter(params.rotate) {
        filters.push(rotation.to_string());
    }

    if filters.is_empty() {
        None
    } else {
        Some(filters.join(","))
    }
}
