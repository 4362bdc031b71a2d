//! Composite interest score.
//!
//! The score is the sum of independent signals, rounded to two decimals. A
//! signal that cannot be evaluated contributes exactly 0; it never raises
//! and never excludes the record.

pub mod signals;

use std::collections::HashSet;

use crate::config::ScoringConfig;
use crate::records::MediaRecord;

pub use signals::{Signal, SignalError};

/// Per-signal contributions for one record.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreBreakdown {
    pub keyword: f64,
    pub uniqueness: f64,
    pub variance: f64,
    pub faces: f64,
    pub sensitivity: f64,
    pub novelty: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        round2(
            self.keyword
                + self.uniqueness
                + self.variance
                + self.faces
                + self.sensitivity
                + self.novelty,
        )
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Failure policy: a signal that errors, or yields a non-finite value, is
/// worth nothing.
fn contribution(signal: Signal, record: &MediaRecord, result: Result<f64, SignalError>) -> f64 {
    match result {
        Ok(value) if value.is_finite() => value,
        Ok(value) => {
            tracing::debug!(signal = signal.name(), file_id = %record.file_id, value, "Non-finite signal ignored");
            0.0
        }
        Err(e) => {
            tracing::debug!(signal = signal.name(), file_id = %record.file_id, error = %e, "Signal unavailable");
            0.0
        }
    }
}

/// Scores records for review-worthiness.
#[derive(Debug, Clone)]
pub struct InterestScorer {
    keyword_weight: f64,
    uniqueness_weight: f64,
    strong_keywords: HashSet<String>,
    variance_sample_size: u32,
}

impl InterestScorer {
    pub fn new(config: &ScoringConfig) -> Self {
        Self {
            keyword_weight: config.keyword_weight,
            uniqueness_weight: config.uniqueness_weight,
            strong_keywords: config
                .strong_keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .collect(),
            variance_sample_size: config.variance_sample_size,
        }
    }

    pub fn breakdown(&self, record: &MediaRecord, all: &[MediaRecord]) -> ScoreBreakdown {
        ScoreBreakdown {
            keyword: contribution(
                Signal::Keyword,
                record,
                signals::keyword(record, &self.strong_keywords, self.keyword_weight),
            ),
            uniqueness: contribution(
                Signal::Uniqueness,
                record,
                signals::uniqueness(record, all, self.uniqueness_weight),
            ),
            variance: contribution(
                Signal::Variance,
                record,
                signals::variance(&record.local_path, self.variance_sample_size),
            ),
            faces: contribution(Signal::Faces, record, signals::faces(record)),
            sensitivity: contribution(Signal::Sensitivity, record, signals::sensitivity(record)),
            novelty: contribution(Signal::Novelty, record, signals::novelty(record)),
        }
    }

    /// Interest score of `record` relative to the full record set `all`.
    pub fn score(&self, record: &MediaRecord, all: &[MediaRecord]) -> f64 {
        self.breakdown(record, all).total()
    }
}

impl Default for InterestScorer {
    fn default() -> Self {
        Self::new(&ScoringConfig::default())
    }
}

/// Score with the default weights and keyword set.
pub fn score(record: &MediaRecord, all: &[MediaRecord]) -> f64 {
    InterestScorer::default().score(record, all)
}
