//! Presentation helpers for labels and confidence values.

/// Character the service uses in place of spaces inside class labels.
pub const LABEL_SEPARATOR: char = '_';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceView {
    /// Result panel: one decimal place.
    Simple,
    /// Compact lists: whole percent.
    Condensed,
}

impl ConfidenceView {
    pub fn decimals(self) -> usize {
        match self {
            Self::Simple => 1,
            Self::Condensed => 0,
        }
    }
}

/// Display copy of a raw label; the raw label is left untouched.
pub fn display_label(raw: &str) -> String {
    raw.replace(LABEL_SEPARATOR, " ")
}

/// `confidence * 100` with the view's precision, halves rounded away from
/// zero. No clamping.
pub fn format_confidence(confidence: f64, view: ConfidenceView) -> String {
    let decimals = view.decimals();
    let scale = 10f64.powi(decimals as i32);
    let rounded = (confidence * 100.0 * scale).round() / scale;
    format!("{rounded:.decimals$}%")
}

pub fn format_latency_ms(latency_ms: f64) -> String {
    format!("{latency_ms:.0}ms")
}
