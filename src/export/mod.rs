use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::duplicates::DuplicateCluster;
use crate::records::MediaRecord;
use crate::summaries::{self, CandidateSummary};

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExportFormat::Json => "JSON",
            ExportFormat::Csv => "CSV",
        }
    }
}

/// Column order of the flat candidate table.
const CANDIDATE_COLUMNS: [&str; 21] = [
    "file_id",
    "filename",
    "local_path",
    "thumbnail_path",
    "phash",
    "average_hash",
    "dhash",
    "width",
    "height",
    "format",
    "face_count",
    "skin_fraction",
    "likely_nsfw",
    "nsfw_reasons",
    "keywords_found",
    "google_mentions",
    "reddit_mentions",
    "nitter_mentions",
    "virality_score",
    "reverse_search_total",
    "_interest_score",
];

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
    }
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(value: &T, output_path: &Path) -> Result<()> {
    ensure_parent(output_path)?;
    let json = serde_json::to_string_pretty(value)?;
    let mut file = File::create(output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;
    file.write_all(json.as_bytes())?;
    Ok(())
}

/// Write clusters as a JSON array of member-id lists.
pub fn write_clusters_json(clusters: &[DuplicateCluster], output_path: &Path) -> Result<()> {
    let lists: Vec<Vec<String>> = clusters.iter().map(|c| c.member_ids()).collect();
    write_json(&lists, output_path)
}

/// Export ranked candidates, each carrying its `_interest_score`.
pub fn export_candidates(candidates: &[MediaRecord], output_path: &Path, format: ExportFormat) -> Result<usize> {
    match format {
        ExportFormat::Json => write_json(candidates, output_path)?,
        ExportFormat::Csv => export_csv(candidates, output_path)?,
    }

    tracing::info!(
        path = ?output_path,
        format = format.name(),
        count = candidates.len(),
        "Exported candidates"
    );
    Ok(candidates.len())
}

fn export_csv(candidates: &[MediaRecord], output_path: &Path) -> Result<()> {
    ensure_parent(output_path)?;
    let mut wtr = csv::Writer::from_path(output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;

    wtr.write_record(CANDIDATE_COLUMNS)?;

    for c in candidates {
        let keywords = c.keywords_found.iter().cloned().collect::<Vec<_>>().join(",");
        let row: Vec<String> = vec![
            c.file_id.clone(),
            c.filename.clone(),
            c.local_path.clone(),
            c.thumbnail_path.clone(),
            c.phash.clone(),
            c.average_hash.clone(),
            c.dhash.clone(),
            c.width.to_string(),
            c.height.to_string(),
            c.format.clone(),
            c.face_count.to_string(),
            c.skin_fraction.to_string(),
            c.likely_nsfw.to_string(),
            c.nsfw_reasons.join(","),
            keywords,
            c.google_mentions.to_string(),
            c.reddit_mentions.to_string(),
            c.nitter_mentions.to_string(),
            c.virality_score.to_string(),
            c.reverse_search_total().to_string(),
            c.interest_score.map(|s| s.to_string()).unwrap_or_default(),
        ];
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}

/// File-system safe stem for a per-candidate preview, derived from the
/// file id since pages of one document share a filename.
fn preview_stem(summary: &CandidateSummary) -> String {
    let base = if summary.file_id.is_empty() {
        &summary.filename
    } else {
        &summary.file_id
    };
    base.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect()
}

/// Write one markdown preview per candidate plus `top_candidates.json`.
/// Returns the paths written.
pub fn write_summaries(summaries: &[CandidateSummary], output_dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create directory {}", output_dir.display()))?;

    let mut written = Vec::with_capacity(summaries.len() + 1);
    let mut taken = HashSet::new();
    for summary in summaries {
        let stem = preview_stem(summary);
        let mut name = format!("{}.md", stem);
        let mut n = 2;
        // ids that sanitise to the same stem still get their own file
        while !taken.insert(name.clone()) {
            name = format!("{}-{}.md", stem, n);
            n += 1;
        }
        let path = output_dir.join(name);
        fs::write(&path, summaries::render_markdown(summary))
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(path);
    }

    let aggregate = output_dir.join("top_candidates.json");
    write_json(summaries, &aggregate)?;
    written.push(aggregate);

    Ok(written)
}
