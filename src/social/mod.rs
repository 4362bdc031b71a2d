//! Social-presence arithmetic.
//!
//! Mention counts are gathered by external collaborators; this module only
//! turns them into a virality score and the underreported flag, and carries
//! them onto records.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result};

use crate::records::fields;
use crate::records::MediaRecord;

/// Default cut-off below which an item counts as underreported.
pub const DEFAULT_UNDERREPORTED_THRESHOLD: f64 = 5.0;

/// Weighted popularity proxy: search hits are heavily discounted, each
/// Reddit post counts three times and each Nitter mention twice.
pub fn virality_score(google: u32, reddit: u32, nitter: u32) -> f64 {
    let score = google as f64 / 100.0 + reddit as f64 * 3.0 + nitter as f64 * 2.0;
    (score * 100.0).round() / 100.0
}

pub fn is_underreported(score: f64, threshold: f64) -> bool {
    score < threshold
}

/// Social signals for one file, as reported by the presence checkers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SocialSignals {
    #[serde(default, deserialize_with = "fields::lenient_u32")]
    pub google_mentions: u32,
    #[serde(default, deserialize_with = "fields::lenient_u32")]
    pub reddit_mentions: u32,
    #[serde(default, deserialize_with = "fields::lenient_u32")]
    pub nitter_mentions: u32,
    /// Precomputed score; recomputed from the mention counts when absent.
    #[serde(default, deserialize_with = "fields::lenient_opt_f64")]
    pub virality_score: Option<f64>,
    #[serde(default, deserialize_with = "fields::match_counts")]
    pub reverse_search_matches: BTreeMap<String, u32>,
}

impl SocialSignals {
    pub fn score(&self) -> f64 {
        self.virality_score.unwrap_or_else(|| {
            virality_score(self.google_mentions, self.reddit_mentions, self.nitter_mentions)
        })
    }

    /// Overwrite the record's social fields with these signals.
    pub fn apply_to(&self, record: &mut MediaRecord, underreported_threshold: f64) {
        let score = self.score();
        record.google_mentions = self.google_mentions;
        record.reddit_mentions = self.reddit_mentions;
        record.nitter_mentions = self.nitter_mentions;
        record.virality_score = score;
        record.is_underreported = is_underreported(score, underreported_threshold);
        for (provider, count) in &self.reverse_search_matches {
            record.reverse_search_matches.insert(provider.clone(), *count);
        }
    }
}

#[derive(Deserialize)]
struct SocialEntry {
    #[serde(default, deserialize_with = "fields::lenient_string")]
    file_id: String,
    #[serde(flatten)]
    signals: SocialSignals,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SocialDocument {
    Keyed(HashMap<String, SocialSignals>),
    Rows(Vec<SocialEntry>),
}

/// Load social signals keyed by `file_id`.
///
/// Accepts either an object keyed by file id or the checker's array of
/// result rows (each carrying its own `file_id`).
pub fn load_signals(path: &Path) -> Result<HashMap<String, SocialSignals>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read social signals {}", path.display()))?;
    let document: SocialDocument = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse social signals {}", path.display()))?;

    Ok(match document {
        SocialDocument::Keyed(map) => map,
        SocialDocument::Rows(rows) => rows
            .into_iter()
            .filter(|row| !row.file_id.is_empty())
            .map(|row| (row.file_id, row.signals))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_virality_score_weights() {
        assert_eq!(virality_score(0, 0, 0), 0.0);
        assert_eq!(virality_score(250, 0, 0), 2.5);
        assert_eq!(virality_score(0, 1, 1), 5.0);
        assert_eq!(virality_score(1, 0, 0), 0.01);
    }

    #[test]
    fn test_is_underreported_is_strict() {
        assert!(is_underreported(4.99, 5.0));
        assert!(!is_underreported(5.0, 5.0));
    }

    #[test]
    fn test_apply_recomputes_missing_score() {
        let signals = SocialSignals {
            reddit_mentions: 2,
            ..Default::default()
        };
        let mut record = MediaRecord::new("a");
        signals.apply_to(&mut record, DEFAULT_UNDERREPORTED_THRESHOLD);

        assert_eq!(record.reddit_mentions, 2);
        assert_eq!(record.virality_score, 6.0);
        assert!(!record.is_underreported);
    }

    #[test]
    fn test_load_signals_accepts_rows_and_maps() {
        let dir = tempdir().unwrap();

        let rows = dir.path().join("rows.json");
        std::fs::write(
            &rows,
            r#"[
                {"file_id": "a", "filename": "a.pdf", "google_mentions": 12, "virality_score": 0.12},
                {"filename": "orphan.pdf", "google_mentions": 5},
                {"file_id": "b", "nitter_mentions": "1"}
            ]"#,
        )
        .unwrap();
        let loaded = load_signals(&rows).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded["a"].score(), 0.12);
        assert_eq!(loaded["b"].score(), 2.0);

        let keyed = dir.path().join("keyed.json");
        std::fs::write(&keyed, r#"{"c": {"reddit_mentions": 1}}"#).unwrap();
        let loaded = load_signals(&keyed).unwrap();
        assert_eq!(loaded["c"].score(), 3.0);
    }
}
