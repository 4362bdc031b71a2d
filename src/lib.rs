//! Candidate ranking and deduplication for large public media releases.
//!
//! Records produced by external fetchers, hashers and presence checkers are
//! grouped into near-duplicate clusters, scored for investigative interest,
//! filtered down to underreported candidates and summarised for review. The
//! [`pipeline`] module sequences all of it with per-stage resume.

pub mod candidates;
pub mod config;
pub mod duplicates;
pub mod export;
pub mod logging;
pub mod pipeline;
pub mod records;
pub mod scoring;
pub mod social;
pub mod state;
pub mod summaries;

pub use candidates::{filter_candidates, CandidateFilter, FilterOptions};
pub use config::Config;
pub use duplicates::{cluster, hamming, DuplicateCluster, DuplicateClusterer};
pub use records::MediaRecord;
pub use scoring::{score, InterestScorer};
pub use state::StateStore;
