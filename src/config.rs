use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub clustering: ClusteringConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub filter: FilterConfig,

    #[serde(default)]
    pub social: SocialConfig,

    #[serde(default)]
    pub summaries: SummariesConfig,

    #[serde(default = "default_stages")]
    pub stages: Vec<StageConfig>,
}

/// Locations of the record tables and output artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_records_csv")]
    pub records_csv: PathBuf,

    #[serde(default = "default_social_json")]
    pub social_json: PathBuf,

    #[serde(default = "default_clusters_json")]
    pub clusters_json: PathBuf,

    #[serde(default = "default_candidates_json")]
    pub candidates_json: PathBuf,

    #[serde(default = "default_candidates_csv")]
    pub candidates_csv: PathBuf,

    #[serde(default = "default_summaries_dir")]
    pub summaries_dir: PathBuf,
}

fn data_root() -> PathBuf {
    PathBuf::from("data")
}

fn default_records_csv() -> PathBuf {
    data_root().join("manifests/media_hashes.csv")
}

fn default_social_json() -> PathBuf {
    data_root().join("results/underreported_media.json")
}

fn default_clusters_json() -> PathBuf {
    data_root().join("results/duplicate_clusters.json")
}

fn default_candidates_json() -> PathBuf {
    data_root().join("results/filtered_candidates.json")
}

fn default_candidates_csv() -> PathBuf {
    data_root().join("results/filtered_candidates.csv")
}

fn default_summaries_dir() -> PathBuf {
    data_root().join("results/top_candidates")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            records_csv: default_records_csv(),
            social_json: default_social_json(),
            clusters_json: default_clusters_json(),
            candidates_json: default_candidates_json(),
            candidates_csv: default_candidates_csv(),
            summaries_dir: default_summaries_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Maximum Hamming distance (in bits) between a cluster seed and a member.
    #[serde(default = "default_cluster_threshold")]
    pub threshold: u32,
}

fn default_cluster_threshold() -> u32 {
    10
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            threshold: default_cluster_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f64,

    #[serde(default = "default_uniqueness_weight")]
    pub uniqueness_weight: f64,

    /// Tags worth double the keyword weight.
    #[serde(default = "default_strong_keywords")]
    pub strong_keywords: Vec<String>,

    /// Edge length of the grayscale thumbnail used for the variance signal.
    #[serde(default = "default_variance_sample_size")]
    pub variance_sample_size: u32,
}

fn default_keyword_weight() -> f64 {
    3.0
}

fn default_uniqueness_weight() -> f64 {
    3.0
}

pub fn default_strong_keywords() -> Vec<String> {
    [
        "video", "photo", "flight", "payment", "bank", "phone", "escort", "model", "minor",
        "underage", "nude", "sex", "passport", "log",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_variance_sample_size() -> u32 {
    64
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            keyword_weight: default_keyword_weight(),
            uniqueness_weight: default_uniqueness_weight(),
            strong_keywords: default_strong_keywords(),
            variance_sample_size: default_variance_sample_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "default_virality_threshold")]
    pub virality_threshold: f64,

    #[serde(default = "default_min_interest")]
    pub min_interest: f64,

    /// Rank records with at least one face ahead of faceless ones.
    #[serde(default)]
    pub prefer_faces: bool,
}

fn default_virality_threshold() -> f64 {
    5.0
}

fn default_min_interest() -> f64 {
    3.0
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            virality_threshold: default_virality_threshold(),
            min_interest: default_min_interest(),
            prefer_faces: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialConfig {
    #[serde(default = "default_virality_threshold")]
    pub underreported_threshold: f64,
}

impl Default for SocialConfig {
    fn default() -> Self {
        Self {
            underreported_threshold: default_virality_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummariesConfig {
    #[serde(default = "default_summary_max_chars")]
    pub max_chars: usize,

    /// Link template for the original document; `{filename}` is substituted.
    #[serde(default)]
    pub source_url_template: Option<String>,
}

fn default_summary_max_chars() -> usize {
    240
}

impl Default for SummariesConfig {
    fn default() -> Self {
        Self {
            max_chars: default_summary_max_chars(),
            source_url_template: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Command,
    Cluster,
    Filter,
    Summaries,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    pub name: String,

    pub kind: StageKind,

    /// Program to spawn for `command` stages.
    #[serde(default)]
    pub program: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,

    /// Run the program once per manifest row instead of once per stage.
    /// `{file_id}`, `{filename}` and `{local_path}` in `args` are filled in
    /// per row and progress is kept in the `<name>_index` cursor.
    #[serde(default)]
    pub per_record: bool,
}

impl StageConfig {
    fn command(name: &str, script: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: StageKind::Command,
            program: Some("python".to_string()),
            args: vec![script.to_string()],
            per_record: false,
        }
    }

    fn builtin(name: &str, kind: StageKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            program: None,
            args: Vec::new(),
            per_record: false,
        }
    }
}

fn default_stages() -> Vec<StageConfig> {
    vec![
        StageConfig::command("fetch", "scripts/01_fetch_dataset9_manifest.py"),
        StageConfig::command("download", "scripts/02_download_sample_media.py"),
        StageConfig::command("hash", "scripts/03_hash_media.py"),
        StageConfig::command("ocr", "scripts/08_run_ocr.py"),
        StageConfig::command("social", "scripts/10_finish_social_checks.py"),
        StageConfig::builtin("filter", StageKind::Filter),
        StageConfig::builtin("cluster", StageKind::Cluster),
        StageConfig::builtin("summaries", StageKind::Summaries),
    ]
}

fn default_state_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mediasift")
        .join("state.json")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            paths: PathsConfig::default(),
            clustering: ClusteringConfig::default(),
            scoring: ScoringConfig::default(),
            filter: FilterConfig::default(),
            social: SocialConfig::default(),
            summaries: SummariesConfig::default(),
            stages: default_stages(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            // Create default config
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Config file location, honouring `MEDIASIFT_CONFIG`.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("MEDIASIFT_CONFIG") {
            return PathBuf::from(path);
        }

        Self::config_dir().join("config.toml")
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mediasift")
    }
}
