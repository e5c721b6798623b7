//! Analyzer thresholds.
//!
//! The tolerances are empirical and depend on font metrics and output
//! resolution, so they are configuration rather than constants. Defaults can
//! be overridden from the environment.

use std::env;

/// Thresholds used by [`crate::analyze`], in canvas units.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalyzerConfig {
    /// Both axis overlaps must exceed this for a pair to count as overlapping.
    pub overlap_epsilon: f64,
    /// Pairs closer than this on both axes are reported as too close.
    pub min_gap: f64,
    /// Allowed excursion beyond the canvas before a label is clipped.
    pub clip_tolerance: f64,
    /// Allowed excursion beyond a container before a label overflows it.
    pub overflow_tolerance: f64,
    /// Minimum container width to be considered for overflow checks.
    pub container_min_width: f64,
    /// Minimum container height to be considered for overflow checks.
    pub container_min_height: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            overlap_epsilon: 2.0,
            min_gap: 3.0,
            clip_tolerance: 2.0,
            overflow_tolerance: 3.0,
            container_min_width: 20.0,
            container_min_height: 12.0,
        }
    }
}

impl AnalyzerConfig {
    /// Load thresholds from the environment.
    ///
    /// Reads `FIGURE_OVERLAP_EPSILON`, `FIGURE_MIN_GAP`,
    /// `FIGURE_CLIP_TOLERANCE`, `FIGURE_OVERFLOW_TOLERANCE`,
    /// `FIGURE_CONTAINER_MIN_WIDTH` and `FIGURE_CONTAINER_MIN_HEIGHT`.
    /// Missing, unparseable or negative values keep their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            overlap_epsilon: env_threshold("FIGURE_OVERLAP_EPSILON", defaults.overlap_epsilon),
            min_gap: env_threshold("FIGURE_MIN_GAP", defaults.min_gap),
            clip_tolerance: env_threshold("FIGURE_CLIP_TOLERANCE", defaults.clip_tolerance),
            overflow_tolerance: env_threshold(
                "FIGURE_OVERFLOW_TOLERANCE",
                defaults.overflow_tolerance,
            ),
            container_min_width: env_threshold(
                "FIGURE_CONTAINER_MIN_WIDTH",
                defaults.container_min_width,
            ),
            container_min_height: env_threshold(
                "FIGURE_CONTAINER_MIN_HEIGHT",
                defaults.container_min_height,
            ),
        }
    }
}

fn env_threshold(name: &str, default: f64) -> f64 {
    env::var(name)
        .ok()
        .and_then(|val| parse_threshold(&val))
        .unwrap_or(default)
}

fn parse_threshold(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|val| val.is_finite() && *val >= 0.0)
}
