use anyhow::{Context, Result};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use super::MediaRecord;
use crate::social::{SocialSignals, DEFAULT_UNDERREPORTED_THRESHOLD};

/// Load records from a hash manifest CSV, preserving row order.
///
/// Cells are handed to the record decoder as plain strings so hex hashes
/// made only of digits keep their leading zeros. Rows the CSV reader cannot
/// decode at all are logged and skipped.
pub fn load_csv(path: &Path) -> Result<Vec<MediaRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open records {}", path.display()))?;
    let headers = reader.headers()?.clone();

    let mut records = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let decoded = result.map_err(anyhow::Error::from).and_then(|cells| {
            let object: serde_json::Map<String, serde_json::Value> = headers
                .iter()
                .zip(cells.iter())
                .map(|(name, cell)| (name.to_string(), serde_json::Value::from(cell)))
                .collect();
            Ok(serde_json::from_value::<MediaRecord>(serde_json::Value::Object(object))?)
        });

        match decoded {
            Ok(mut record) => {
                record.derive_underreported(DEFAULT_UNDERREPORTED_THRESHOLD);
                records.push(record);
            }
            Err(e) => {
                tracing::warn!(path = ?path, row = row + 1, error = %e, "Skipping unreadable record row");
            }
        }
    }

    tracing::debug!(path = ?path, count = records.len(), "Loaded records from CSV");
    Ok(records)
}

/// Load records from a JSON array. `is_underreported` is derived from the
/// virality score at the default threshold, as for CSV.
pub fn load_json(path: &Path) -> Result<Vec<MediaRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read records {}", path.display()))?;
    let mut records: Vec<MediaRecord> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse records {}", path.display()))?;
    for record in records.iter_mut() {
        record.derive_underreported(DEFAULT_UNDERREPORTED_THRESHOLD);
    }
    Ok(records)
}

/// Overlay social signals onto records by `file_id`.
///
/// Returns how many records received signals.
pub fn merge_social(
    records: &mut [MediaRecord],
    signals: &HashMap<String, SocialSignals>,
    underreported_threshold: f64,
) -> usize {
    let mut merged = 0;
    for record in records.iter_mut() {
        if let Some(found) = signals.get(&record.file_id) {
            found.apply_to(record, underreported_threshold);
            merged += 1;
        }
    }
    merged
}

/// Tags from `vocabulary` that occur anywhere in `text`, case-insensitively.
pub fn extract_keywords(text: &str, vocabulary: &[String]) -> BTreeSet<String> {
    let lowered = text.to_lowercase();
    vocabulary
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty() && lowered.contains(k.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    const MANIFEST: &str = "\
file_id,filename,local_path,phash,average_hash,dhash,width,height,format,thumbnail_path,annotated_thumbnail,face_count,skin_fraction,likely_nsfw,nsfw_reasons,page_text_snippet,keywords_found
EFTA01|p1,p1.png,data/p1.png,ffff0000ffff0000,,,1700,2200,PNG,t1.png,a1.png,2,0.25,False,,Flight log,\"flight,log\"
EFTA01|p2,p2.png,data/p2.png,,,,,,,,,,,True,\"skin,keyword:nude\",,
";

    #[test]
    fn test_load_csv_manifest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("media_hashes.csv");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(MANIFEST.as_bytes())
            .unwrap();

        let records = load_csv(&path).unwrap();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.file_id, "EFTA01|p1");
        assert_eq!(first.phash, "ffff0000ffff0000");
        assert_eq!(first.width, 1700);
        assert_eq!(first.face_count, 2);
        assert!(!first.likely_nsfw);
        assert!(first.keywords_found.contains("flight"));
        assert!(first.keywords_found.contains("log"));

        let second = &records[1];
        assert_eq!(second.phash, "");
        assert_eq!(second.width, 0);
        assert_eq!(second.skin_fraction, 0.0);
        assert!(second.likely_nsfw);
        assert_eq!(second.nsfw_reasons, vec!["skin".to_string(), "keyword:nude".to_string()]);
        assert!(second.keywords_found.is_empty());
    }

    #[test]
    fn test_underreported_flag_is_derived_on_load() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("media.csv");
        std::fs::write(
            &csv_path,
            "file_id,virality_score,is_underreported\nquiet,,\nloud,8.5,True\nstale,0,False\n",
        )
        .unwrap();

        let records = load_csv(&csv_path).unwrap();
        let flags: Vec<bool> = records.iter().map(|r| r.is_underreported).collect();
        assert_eq!(flags, vec![true, false, true]);

        let json_path = dir.path().join("media.json");
        std::fs::write(&json_path, r#"[{"file_id": "a"}, {"file_id": "b", "virality_score": 5.0}]"#).unwrap();
        let records = load_json(&json_path).unwrap();
        assert!(records[0].is_underreported);
        assert!(!records[1].is_underreported);
    }

    #[test]
    fn test_load_csv_missing_file_errors() {
        let dir = tempdir().unwrap();
        assert!(load_csv(&dir.path().join("absent.csv")).is_err());
    }

    #[test]
    fn test_merge_social_by_file_id() {
        let mut records = vec![MediaRecord::new("a"), MediaRecord::new("b")];
        let mut signals = HashMap::new();
        signals.insert(
            "b".to_string(),
            SocialSignals {
                google_mentions: 120,
                ..Default::default()
            },
        );

        let merged = merge_social(&mut records, &signals, 5.0);
        assert_eq!(merged, 1);
        assert_eq!(records[0].virality_score, 0.0);
        assert_eq!(records[1].google_mentions, 120);
        assert_eq!(records[1].virality_score, 1.2);
        assert!(records[1].is_underreported);
    }

    #[test]
    fn test_extract_keywords_case_insensitive() {
        let vocabulary: Vec<String> = ["passport", "bank", "video"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let found = extract_keywords("PASSPORT copy attached; Bank wire pending", &vocabulary);
        assert_eq!(
            found.into_iter().collect::<Vec<_>>(),
            vec!["bank".to_string(), "passport".to_string()]
        );
    }
}
