//! Media records: one image derived from a document page or downloaded file,
//! with every signal the ranking engine consumes.

pub(crate) mod fields;
pub mod ingest;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::social;

pub use ingest::{extract_keywords, load_csv, load_json, merge_social};

/// A single media unit.
///
/// Every signal field falls back to a neutral value (0, empty, false) when
/// the source row lacks it or carries garbage, so downstream code never
/// branches on missing keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRecord {
    #[serde(default, deserialize_with = "fields::lenient_string")]
    pub file_id: String,
    #[serde(default, deserialize_with = "fields::lenient_string")]
    pub filename: String,
    #[serde(default, deserialize_with = "fields::lenient_string")]
    pub local_path: String,
    #[serde(default, deserialize_with = "fields::lenient_string")]
    pub thumbnail_path: String,

    // Perceptual signature (hex, empty when unknown)
    #[serde(default, deserialize_with = "fields::lenient_string")]
    pub phash: String,
    #[serde(default, deserialize_with = "fields::lenient_string")]
    pub average_hash: String,
    #[serde(default, deserialize_with = "fields::lenient_string")]
    pub dhash: String,

    #[serde(default, deserialize_with = "fields::lenient_u32")]
    pub width: u32,
    #[serde(default, deserialize_with = "fields::lenient_u32")]
    pub height: u32,
    #[serde(default, deserialize_with = "fields::lenient_string")]
    pub format: String,

    // Text
    #[serde(default, deserialize_with = "fields::lenient_string")]
    pub page_text_snippet: String,
    #[serde(default, deserialize_with = "fields::lenient_string")]
    pub full_text: String,
    #[serde(default, deserialize_with = "fields::tag_set")]
    pub keywords_found: BTreeSet<String>,

    // Visual heuristics
    #[serde(default, deserialize_with = "fields::lenient_u32")]
    pub face_count: u32,
    #[serde(default, deserialize_with = "fields::lenient_f64")]
    pub skin_fraction: f64,
    #[serde(default, deserialize_with = "fields::lenient_bool")]
    pub likely_nsfw: bool,
    #[serde(default, deserialize_with = "fields::string_list")]
    pub nsfw_reasons: Vec<String>,

    // Social signals
    #[serde(default, deserialize_with = "fields::lenient_u32")]
    pub google_mentions: u32,
    #[serde(default, deserialize_with = "fields::lenient_u32")]
    pub reddit_mentions: u32,
    #[serde(default, deserialize_with = "fields::lenient_u32")]
    pub nitter_mentions: u32,
    #[serde(default, deserialize_with = "fields::lenient_f64")]
    pub virality_score: f64,
    /// `virality_score` below the underreported threshold. A record with no
    /// social signals has virality 0 and so starts out underreported.
    #[serde(default = "underreported_by_default", deserialize_with = "fields::lenient_bool")]
    pub is_underreported: bool,

    #[serde(default, deserialize_with = "fields::match_counts")]
    pub reverse_search_matches: BTreeMap<String, u32>,

    /// Attached at evaluation time by the candidate filter.
    #[serde(
        rename = "_interest_score",
        alias = "interest_score",
        default,
        deserialize_with = "fields::lenient_opt_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub interest_score: Option<f64>,
}

fn underreported_by_default() -> bool {
    true
}

impl Default for MediaRecord {
    fn default() -> Self {
        Self {
            file_id: String::new(),
            filename: String::new(),
            local_path: String::new(),
            thumbnail_path: String::new(),
            phash: String::new(),
            average_hash: String::new(),
            dhash: String::new(),
            width: 0,
            height: 0,
            format: String::new(),
            page_text_snippet: String::new(),
            full_text: String::new(),
            keywords_found: BTreeSet::new(),
            face_count: 0,
            skin_fraction: 0.0,
            likely_nsfw: false,
            nsfw_reasons: Vec::new(),
            google_mentions: 0,
            reddit_mentions: 0,
            nitter_mentions: 0,
            virality_score: 0.0,
            is_underreported: underreported_by_default(),
            reverse_search_matches: BTreeMap::new(),
            interest_score: None,
        }
    }
}

impl MediaRecord {
    pub fn new(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            ..Default::default()
        }
    }

    /// Recompute `is_underreported` from the current virality score.
    pub fn derive_underreported(&mut self, threshold: f64) {
        self.is_underreported = social::is_underreported(self.virality_score, threshold);
    }

    /// Identity used in cluster output: the local path, or the file id for
    /// records that were never materialised on disk.
    pub fn cluster_key(&self) -> &str {
        if self.local_path.is_empty() {
            &self.file_id
        } else {
            &self.local_path
        }
    }

    /// Full OCR text when available, otherwise the page snippet.
    pub fn best_text(&self) -> &str {
        if self.full_text.trim().is_empty() {
            &self.page_text_snippet
        } else {
            &self.full_text
        }
    }

    /// Total reverse-image-search hits across providers. An empty map is
    /// zero hits.
    pub fn reverse_search_total(&self) -> u32 {
        self.reverse_search_matches
            .values()
            .fold(0u32, |acc, c| acc.saturating_add(*c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_with_mixed_shapes() {
        let record: MediaRecord = serde_json::from_str(
            r#"{
                "file_id": "EFTA0001|p2",
                "width": "1700",
                "height": 2200,
                "face_count": "",
                "skin_fraction": "0.31",
                "likely_nsfw": "True",
                "keywords_found": "Passport, bank,,",
                "nsfw_reasons": ["keyword:nude"],
                "reverse_search_matches": {"bing": 1, "yandex": "2"},
                "virality_score": null,
                "unexpected": {"ignored": true}
            }"#,
        )
        .unwrap();

        assert_eq!(record.file_id, "EFTA0001|p2");
        assert_eq!(record.width, 1700);
        assert_eq!(record.height, 2200);
        assert_eq!(record.face_count, 0);
        assert!((record.skin_fraction - 0.31).abs() < 1e-9);
        assert!(record.likely_nsfw);
        assert_eq!(
            record.keywords_found.iter().cloned().collect::<Vec<_>>(),
            vec!["bank".to_string(), "passport".to_string()]
        );
        assert_eq!(record.nsfw_reasons, vec!["keyword:nude".to_string()]);
        assert_eq!(record.reverse_search_total(), 3);
        assert_eq!(record.virality_score, 0.0);
        assert_eq!(record.interest_score, None);
    }

    #[test]
    fn test_missing_fields_are_neutral() {
        let record: MediaRecord = serde_json::from_str(r#"{"file_id": "x"}"#).unwrap();
        assert_eq!(record, MediaRecord::new("x"));
        assert_eq!(record.reverse_search_total(), 0);
        // virality 0 is below any positive threshold
        assert!(record.is_underreported);
    }

    #[test]
    fn test_derive_underreported_follows_virality() {
        let mut record = MediaRecord {
            virality_score: 7.0,
            ..MediaRecord::new("x")
        };
        record.derive_underreported(5.0);
        assert!(!record.is_underreported);

        record.derive_underreported(10.0);
        assert!(record.is_underreported);
    }

    #[test]
    fn test_interest_score_serializes_with_underscore() {
        let mut record = MediaRecord::new("a");
        let plain = serde_json::to_value(&record).unwrap();
        assert!(plain.get("_interest_score").is_none());

        record.interest_score = Some(7.5);
        let annotated = serde_json::to_value(&record).unwrap();
        assert_eq!(annotated["_interest_score"], 7.5);

        let back: MediaRecord = serde_json::from_value(annotated).unwrap();
        assert_eq!(back.interest_score, Some(7.5));
    }

    #[test]
    fn test_cluster_key_falls_back_to_file_id() {
        let mut record = MediaRecord::new("id-1");
        assert_eq!(record.cluster_key(), "id-1");
        record.local_path = "data/rendered/p1.png".to_string();
        assert_eq!(record.cluster_key(), "data/rendered/p1.png");
    }
}
