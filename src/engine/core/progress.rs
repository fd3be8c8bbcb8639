// Incremental progress extraction from ffmpeg's diagnostic stream

use std::sync::OnceLock;

use regex::Regex;

use crate::engine::events::ProgressTick;

fn time_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"time=([0-9:.]+)").expect("valid time pattern"))
}

/// Elapsed-time label (`HH:MM:SS.frac`) carried by a diagnostic line
pub fn parse_line(line: &str) -> Option<&str> {
    time_pattern()
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Convert `HH:MM:SS.frac` to seconds.
///
/// Anything other than exactly three fields is 0; a field that does not
/// parse counts as 0.
pub fn to_seconds(label: &str) -> f64 {
    let parts: Vec<&str> = label.split(':').collect();
    if parts.len() != 3 {
        return 0.0;
    }

    let field = |s: &str| s.parse::<f64>().unwrap_or(0.0);
    field(parts[0]) * 3600.0 + field(parts[1]) * 60.0 + field(parts[2])
}

/// Percentage of `total`, capped at 100. `None` without a usable total.
pub fn percentage(elapsed: f64, total: Option<f64>) -> Option<f64> {
    match total {
        Some(total) if total > 0.0 => Some((elapsed / total * 100.0).min(100.0)),
        _ => None,
    }
}

/// Per-job progress state; keeps reported percentages monotone
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    job_id: String,
    duration_s: Option<f64>,
    last_pct: f64,
}

impl ProgressTracker {
    pub fn new(job_id: impl Into<String>, duration_s: Option<f64>) -> Self {
        Self {
            job_id: job_id.into(),
            duration_s,
            last_pct: 0.0,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Tick for a diagnostic line, if it carries an elapsed time
    pub fn on_line(&mut self, line: &str) -> Option<ProgressTick> {
        let label = parse_line(line)?;
        let pct = percentage(to_seconds(label), self.duration_s).map(|p| {
            // ffmpeg occasionally reports a smaller time after a seek
            self.last_pct = self.last_pct.max(p);
            self.last_pct
        });

        Some(ProgressTick {
            id: self.job_id.clone(),
            percentage: pct,
            elapsed: label.to_string(),
        })
    }

    pub fn completed(&self) -> ProgressTick {
        ProgressTick::completed(&self.job_id)
    }
}
