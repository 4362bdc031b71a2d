//! Underreported-and-interesting shortlist.

use std::cmp::Ordering;

use crate::config::Config;
use crate::records::MediaRecord;
use crate::scoring::InterestScorer;

/// Thresholds and ordering for the shortlist.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterOptions {
    /// Records at or above this virality are not underreported.
    pub virality_threshold: f64,
    pub min_interest: f64,
    /// Rank records showing at least one face first.
    pub prefer_faces: bool,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            virality_threshold: 5.0,
            min_interest: 3.0,
            prefer_faces: false,
        }
    }
}

pub struct CandidateFilter {
    scorer: InterestScorer,
    options: FilterOptions,
}

impl CandidateFilter {
    pub fn new(scorer: InterestScorer, options: FilterOptions) -> Self {
        Self { scorer, options }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            InterestScorer::new(&config.scoring),
            FilterOptions {
                virality_threshold: config.filter.virality_threshold,
                min_interest: config.filter.min_interest,
                prefer_faces: config.filter.prefer_faces,
            },
        )
    }

    pub fn options(&self) -> &FilterOptions {
        &self.options
    }

    /// Score every record, annotate it in place, and return the ranked
    /// subset that is both underreported and interesting enough.
    ///
    /// Rejected records keep their attached score too. Ties keep input order.
    pub fn filter(&self, records: &mut [MediaRecord]) -> Vec<MediaRecord> {
        let all: &[MediaRecord] = records;
        let scores: Vec<f64> = all
            .iter()
            .map(|record| self.scorer.score(record, all))
            .collect();

        for (record, score) in records.iter_mut().zip(scores) {
            record.interest_score = Some(score);
        }

        let mut retained: Vec<MediaRecord> = records
            .iter()
            .filter(|r| self.accepts(r))
            .cloned()
            .collect();

        let prefer_faces = self.options.prefer_faces;
        // sort_by is stable
        retained.sort_by(|a, b| rank(b, prefer_faces).cmp_key(&rank(a, prefer_faces)));

        tracing::info!(
            evaluated = records.len(),
            retained = retained.len(),
            virality_threshold = self.options.virality_threshold,
            min_interest = self.options.min_interest,
            "Candidate filtering finished"
        );

        retained
    }

    fn accepts(&self, record: &MediaRecord) -> bool {
        let interest = record.interest_score.unwrap_or(0.0);
        record.virality_score < self.options.virality_threshold && interest >= self.options.min_interest
    }
}

struct RankKey {
    has_faces: bool,
    interest: f64,
}

impl RankKey {
    fn cmp_key(&self, other: &RankKey) -> Ordering {
        self.has_faces
            .cmp(&other.has_faces)
            .then_with(|| self.interest.total_cmp(&other.interest))
    }
}

fn rank(record: &MediaRecord, prefer_faces: bool) -> RankKey {
    RankKey {
        has_faces: prefer_faces && record.face_count > 0,
        interest: record.interest_score.unwrap_or(0.0),
    }
}

/// Filter with default scoring weights.
pub fn filter_candidates(
    records: &mut [MediaRecord],
    virality_threshold: f64,
    min_interest: f64,
    prefer_faces: bool,
) -> Vec<MediaRecord> {
    CandidateFilter::new(
        InterestScorer::default(),
        FilterOptions {
            virality_threshold,
            min_interest,
            prefer_faces,
        },
    )
    .filter(records)
}
