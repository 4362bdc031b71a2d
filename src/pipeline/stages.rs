use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::process::Command;

use super::{ResumableCursor, Stage, StageError};
use crate::candidates::CandidateFilter;
use crate::config::{Config, StageConfig, StageKind, SummariesConfig};
use crate::duplicates::DuplicateClusterer;
use crate::export::{self, ExportFormat};
use crate::records::{self, MediaRecord};
use crate::social;
use crate::state::StateStore;
use crate::summaries;

/// Spawns an external collaborator (fetcher, downloader, hasher, OCR,
/// presence checker). Succeeds iff the program exits with status zero.
pub struct CommandStage {
    name: String,
    program: String,
    args: Vec<String>,
    /// Manifest to iterate when running once per record.
    per_record: Option<PathBuf>,
}

impl CommandStage {
    pub fn new(name: impl Into<String>, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args,
            per_record: None,
        }
    }

    /// Run once per manifest row, resuming from the `<name>_index` cursor.
    pub fn per_record(mut self, records_csv: impl Into<PathBuf>) -> Self {
        self.per_record = Some(records_csv.into());
        self
    }

    pub fn cursor_key(&self) -> String {
        format!("{}_index", self.name)
    }

    fn spawn(&self, args: &[String]) -> Result<()> {
        tracing::debug!(program = %self.program, ?args, "Spawning");
        let status = Command::new(&self.program)
            .args(args)
            .status()
            .with_context(|| format!("Failed to start {}", self.program))?;

        if !status.success() {
            bail!("{} exited with {}", self.program, status);
        }
        Ok(())
    }
}

fn expand_args(args: &[String], record: &MediaRecord) -> Vec<String> {
    args.iter()
        .map(|arg| {
            arg.replace("{file_id}", &record.file_id)
                .replace("{filename}", &record.filename)
                .replace("{local_path}", &record.local_path)
        })
        .collect()
}

impl Stage for CommandStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, state: &StateStore) -> Result<()> {
        let Some(manifest) = self.per_record.as_ref() else {
            return self.spawn(&self.args);
        };

        let rows = records::load_csv(manifest)?;
        let cursor = ResumableCursor::new(state, self.cursor_key());
        let processed = cursor.run(&rows, |_, record| self.spawn(&expand_args(&self.args, record)))?;
        tracing::info!(stage = %self.name, processed, total = rows.len(), "Per-record command finished");
        Ok(())
    }
}

/// Groups near-duplicate media and writes the cluster lists.
pub struct ClusterStage {
    name: String,
    records_csv: PathBuf,
    output: PathBuf,
    clusterer: DuplicateClusterer,
}

impl ClusterStage {
    pub fn from_config(name: impl Into<String>, config: &Config) -> Self {
        Self {
            name: name.into(),
            records_csv: config.paths.records_csv.clone(),
            output: config.paths.clusters_json.clone(),
            clusterer: DuplicateClusterer::new(config.clustering.threshold),
        }
    }
}

impl Stage for ClusterStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, _state: &StateStore) -> Result<()> {
        let records = records::load_csv(&self.records_csv)?;
        let clusters = self.clusterer.cluster(&records);
        export::write_clusters_json(&clusters, &self.output)?;
        tracing::info!(
            records = records.len(),
            clusters = clusters.len(),
            path = ?self.output,
            "Wrote duplicate clusters"
        );
        Ok(())
    }
}

/// Merges social signals, scores, and writes the shortlist.
pub struct FilterStage {
    name: String,
    records_csv: PathBuf,
    social_json: PathBuf,
    candidates_json: PathBuf,
    candidates_csv: PathBuf,
    underreported_threshold: f64,
    filter: CandidateFilter,
}

impl FilterStage {
    pub fn from_config(name: impl Into<String>, config: &Config) -> Self {
        Self {
            name: name.into(),
            records_csv: config.paths.records_csv.clone(),
            social_json: config.paths.social_json.clone(),
            candidates_json: config.paths.candidates_json.clone(),
            candidates_csv: config.paths.candidates_csv.clone(),
            underreported_threshold: config.social.underreported_threshold,
            filter: CandidateFilter::from_config(config),
        }
    }
}

impl Stage for FilterStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, _state: &StateStore) -> Result<()> {
        let mut rows = records::load_csv(&self.records_csv)?;
        for row in rows.iter_mut() {
            row.derive_underreported(self.underreported_threshold);
        }

        if self.social_json.exists() {
            let signals = social::load_signals(&self.social_json)?;
            let merged = records::merge_social(&mut rows, &signals, self.underreported_threshold);
            tracing::info!(merged, path = ?self.social_json, "Merged social signals");
        } else {
            tracing::warn!(path = ?self.social_json, "No social signals found; virality treated as zero");
        }

        let candidates = self.filter.filter(&mut rows);
        export::export_candidates(&candidates, &self.candidates_json, ExportFormat::Json)?;
        export::export_candidates(&candidates, &self.candidates_csv, ExportFormat::Csv)?;
        Ok(())
    }
}

/// Writes review previews for the shortlist.
pub struct SummariesStage {
    name: String,
    candidates_json: PathBuf,
    output_dir: PathBuf,
    keywords: Vec<String>,
    config: SummariesConfig,
}

impl SummariesStage {
    pub fn from_config(name: impl Into<String>, config: &Config) -> Self {
        Self {
            name: name.into(),
            candidates_json: config.paths.candidates_json.clone(),
            output_dir: config.paths.summaries_dir.clone(),
            keywords: config.scoring.strong_keywords.clone(),
            config: config.summaries.clone(),
        }
    }
}

impl Stage for SummariesStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, _state: &StateStore) -> Result<()> {
        let candidates = records::load_json(&self.candidates_json)?;
        let previews = summaries::summarize(&candidates, &self.keywords, &self.config);
        let written = export::write_summaries(&previews, &self.output_dir)?;
        tracing::info!(count = previews.len(), files = written.len(), dir = ?self.output_dir, "Wrote summaries");
        Ok(())
    }
}

fn build_stage(stage: &StageConfig, config: &Config) -> Result<Box<dyn Stage>> {
    let built: Box<dyn Stage> = match stage.kind {
        StageKind::Command => {
            let program = stage
                .program
                .as_ref()
                .ok_or_else(|| StageError::MissingProgram(stage.name.clone()))?;
            let command = CommandStage::new(&stage.name, program, stage.args.clone());
            if stage.per_record {
                Box::new(command.per_record(&config.paths.records_csv))
            } else {
                Box::new(command)
            }
        }
        StageKind::Cluster => Box::new(ClusterStage::from_config(&stage.name, config)),
        StageKind::Filter => Box::new(FilterStage::from_config(&stage.name, config)),
        StageKind::Summaries => Box::new(SummariesStage::from_config(&stage.name, config)),
    };
    Ok(built)
}

/// Instantiate the configured stage list in order.
pub fn build_stages(config: &Config) -> Result<Vec<Box<dyn Stage>>> {
    config.stages.iter().map(|stage| build_stage(stage, config)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PathsConfig;
    use crate::pipeline::StepOrchestrator;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    const MANIFEST: &str = "\
file_id,filename,local_path,phash,keywords_found,face_count,full_text
doc1|p1,doc1.pdf,media/a.png,ffff0000ffff0000,\"passport,flight\",1,Cover. The flight log lists names. End.
doc1|p2,doc1.pdf,media/b.png,ffff0000ffff0000,bank,0,Bank statement attached.
doc2|p1,doc2.pdf,media/c.png,00000f00ffff0000,video,0,Video still.
doc3|p1,doc3.pdf,media/d.png,,,0,Blank page.
";

    fn test_config(root: &Path) -> Config {
        Config {
            state_path: root.join("state.json"),
            paths: PathsConfig {
                records_csv: root.join("manifests/media_hashes.csv"),
                social_json: root.join("results/underreported_media.json"),
                clusters_json: root.join("results/duplicate_clusters.json"),
                candidates_json: root.join("results/filtered_candidates.json"),
                candidates_csv: root.join("results/filtered_candidates.csv"),
                summaries_dir: root.join("results/top_candidates"),
            },
            ..Config::default()
        }
    }

    fn write_manifest(config: &Config) {
        fs::create_dir_all(config.paths.records_csv.parent().unwrap()).unwrap();
        fs::write(&config.paths.records_csv, MANIFEST).unwrap();
    }

    #[test]
    fn test_cluster_stage_writes_clusters() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        write_manifest(&config);

        let state = StateStore::new(&config.state_path);
        ClusterStage::from_config("cluster", &config).run(&state).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&config.paths.clusters_json).unwrap()).unwrap();
        assert_eq!(value, serde_json::json!([["media/a.png", "media/b.png"]]));
    }

    #[test]
    fn test_filter_stage_merges_social_and_exports() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        write_manifest(&config);
        fs::create_dir_all(config.paths.social_json.parent().unwrap()).unwrap();
        fs::write(
            &config.paths.social_json,
            r#"{"doc1|p2": {"reddit_mentions": 2}}"#,
        )
        .unwrap();

        let state = StateStore::new(&config.state_path);
        FilterStage::from_config("filter", &config).run(&state).unwrap();

        let candidates = records::load_json(&config.paths.candidates_json).unwrap();
        let ids: Vec<&str> = candidates.iter().map(|c| c.file_id.as_str()).collect();
        // doc1|p2 now has virality 6.0 and is dropped.
        assert_eq!(ids, vec!["doc1|p1", "doc2|p1"]);
        assert!(candidates[0].interest_score.unwrap() >= candidates[1].interest_score.unwrap());
        assert!(config.paths.candidates_csv.exists());
    }

    #[test]
    fn test_filter_stage_without_social_signals() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        write_manifest(&config);

        let state = StateStore::new(&config.state_path);
        FilterStage::from_config("filter", &config).run(&state).unwrap();

        let candidates = records::load_json(&config.paths.candidates_json).unwrap();
        assert_eq!(candidates.len(), 3);
    }

    #[test]
    fn test_missing_manifest_fails_stage() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let state = StateStore::new(&config.state_path);
        assert!(ClusterStage::from_config("cluster", &config).run(&state).is_err());
    }

    #[test]
    fn test_builtin_pipeline_end_to_end() {
        let dir = tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.stages.retain(|s| s.kind != StageKind::Command);
        write_manifest(&config);

        let mut stages = build_stages(&config).unwrap();
        let orchestrator = StepOrchestrator::new(StateStore::new(&config.state_path));
        let report = orchestrator.run_stages(&mut stages).unwrap();

        assert!(report.is_complete());
        assert_eq!(report.executed(), vec!["filter", "cluster", "summaries"]);
        assert!(config.paths.summaries_dir.join("top_candidates.json").exists());
        // both pages of doc1.pdf keep their own preview
        assert!(config.paths.summaries_dir.join("doc1_p1.md").exists());
        assert!(config.paths.summaries_dir.join("doc1_p2.md").exists());

        let rerun = orchestrator.run_stages(&mut stages).unwrap();
        assert!(rerun.executed().is_empty());
    }

    #[test]
    fn test_command_stage_without_program_is_rejected() {
        let mut config = Config::default();
        config.stages = vec![StageConfig {
            name: "fetch".to_string(),
            kind: StageKind::Command,
            program: None,
            args: Vec::new(),
            per_record: false,
        }];

        let err = build_stages(&config).err().unwrap();
        assert_eq!(
            err.downcast_ref::<StageError>(),
            Some(&StageError::MissingProgram("fetch".to_string()))
        );
    }

    #[test]
    fn test_expand_args() {
        let record = MediaRecord {
            filename: "doc1.pdf".to_string(),
            local_path: "media/a.png".to_string(),
            ..MediaRecord::new("doc1|p1")
        };
        let args = vec!["--id={file_id}".to_string(), "{local_path}".to_string()];
        assert_eq!(expand_args(&args, &record), vec!["--id=doc1|p1", "media/a.png"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_command_stage_exit_status() {
        let dir = tempdir().unwrap();
        let state = StateStore::new(dir.path().join("state.json"));

        let mut ok = CommandStage::new("ok", "sh", vec!["-c".to_string(), "exit 0".to_string()]);
        assert!(ok.run(&state).is_ok());

        let mut failing = CommandStage::new("bad", "sh", vec!["-c".to_string(), "exit 3".to_string()]);
        assert!(failing.run(&state).is_err());

        let mut missing = CommandStage::new("gone", "/nonexistent/mediasift-helper", Vec::new());
        assert!(missing.run(&state).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_per_record_command_resumes_from_cursor() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        write_manifest(&config);
        let state = StateStore::new(&config.state_path);
        let out = dir.path().join("seen.txt");

        // Fails on the third row until a marker file exists.
        let marker = dir.path().join("unblock");
        let script = format!(
            "if [ \"$1\" = doc2.pdf ] && [ ! -e {marker} ]; then exit 1; fi; echo \"$1\" >> {out}",
            marker = marker.display(),
            out = out.display()
        );
        let mut stage = CommandStage::new(
            "ocr",
            "sh",
            vec!["-c".to_string(), script, "sh".to_string(), "{filename}".to_string()],
        )
        .per_record(&config.paths.records_csv);

        assert!(stage.run(&state).is_err());
        assert_eq!(state.cursor("ocr_index"), 2);

        fs::write(&marker, "").unwrap();
        stage.run(&state).unwrap();
        assert_eq!(state.cursor("ocr_index"), 4);

        let seen = fs::read_to_string(&out).unwrap();
        assert_eq!(seen.lines().collect::<Vec<_>>(), vec!["doc1.pdf", "doc1.pdf", "doc2.pdf", "doc3.pdf"]);
    }
}
