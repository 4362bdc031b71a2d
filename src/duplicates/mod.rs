//! Near-duplicate grouping by perceptual hash.
//!
//! Clusters are seeded greedily: the first unassigned record opens a cluster
//! and absorbs every later unassigned record within the Hamming threshold of
//! the seed. Members are only guaranteed close to the seed, not to each
//! other.

use serde::Serialize;
use thiserror::Error;

use crate::records::MediaRecord;

/// Distance reported when either hash is empty or malformed. Larger than any
/// usable threshold, so such records never match.
pub const UNKNOWN_DISTANCE: u32 = u32::MAX;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HashError {
    #[error("empty hash")]
    Empty,
    #[error("invalid hex digit {0:?}")]
    InvalidDigit(char),
}

/// A perceptual hash decoded into nibbles, most significant first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexHash(Vec<u8>);

impl HexHash {
    pub fn parse(hex: &str) -> Result<Self, HashError> {
        let hex = hex.trim();
        if hex.is_empty() {
            return Err(HashError::Empty);
        }

        hex.chars()
            .map(|c| {
                c.to_digit(16)
                    .map(|d| d as u8)
                    .ok_or(HashError::InvalidDigit(c))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(HexHash)
    }

    /// Bits set in `self XOR other`. Hashes of different widths are compared
    /// as integers, i.e. the shorter one is zero-extended on the left.
    pub fn distance(&self, other: &HexHash) -> u32 {
        let (a, b) = (&self.0, &other.0);
        let width = a.len().max(b.len());
        (0..width)
            .map(|i| {
                let x = nibble_from_right(a, i);
                let y = nibble_from_right(b, i);
                (x ^ y).count_ones()
            })
            .sum()
    }
}

fn nibble_from_right(nibbles: &[u8], i: usize) -> u8 {
    if i < nibbles.len() {
        nibbles[nibbles.len() - 1 - i]
    } else {
        0
    }
}

/// Hamming distance between two hex-encoded hashes, or [`UNKNOWN_DISTANCE`]
/// if either cannot be decoded.
pub fn hamming(a: &str, b: &str) -> u32 {
    match (HexHash::parse(a), HexHash::parse(b)) {
        (Ok(x), Ok(y)) => x.distance(&y),
        _ => UNKNOWN_DISTANCE,
    }
}

/// One member of a duplicate cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterMember {
    /// Record identity (see [`MediaRecord::cluster_key`]).
    pub id: String,
    /// Hamming distance to the cluster seed; 0 for the seed itself.
    pub seed_distance: u32,
}

/// Records considered near-duplicates of a designated seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateCluster {
    /// Members in input order; the seed is always first.
    pub members: Vec<ClusterMember>,
}

impl DuplicateCluster {
    pub fn seed(&self) -> &ClusterMember {
        &self.members[0]
    }

    pub fn member_ids(&self) -> Vec<String> {
        self.members.iter().map(|m| m.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Groups records whose perceptual hashes lie within `threshold` bits of a
/// cluster seed.
#[derive(Debug, Clone, Copy)]
pub struct DuplicateClusterer {
    threshold: u32,
}

impl DuplicateClusterer {
    pub fn new(threshold: u32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Cluster records in input order. Only clusters with more than one
    /// member are returned.
    ///
    /// O(n²) comparisons; larger corpora should be pre-bucketed by the caller.
    pub fn cluster(&self, records: &[MediaRecord]) -> Vec<DuplicateCluster> {
        // Decode once; undecodable hashes never match anything.
        let hashes: Vec<Option<HexHash>> = records
            .iter()
            .map(|r| HexHash::parse(&r.phash).ok())
            .collect();

        let mut assigned = vec![false; records.len()];
        let mut clusters = Vec::new();

        for i in 0..records.len() {
            if assigned[i] {
                continue;
            }

            // This record seeds a new cluster
            assigned[i] = true;
            let mut members = vec![ClusterMember {
                id: records[i].cluster_key().to_string(),
                seed_distance: 0,
            }];

            let Some(seed_hash) = &hashes[i] else {
                continue;
            };

            for j in (i + 1)..records.len() {
                if assigned[j] {
                    continue;
                }

                let Some(other_hash) = &hashes[j] else {
                    continue;
                };

                let distance = seed_hash.distance(other_hash);
                if distance <= self.threshold {
                    assigned[j] = true;
                    members.push(ClusterMember {
                        id: records[j].cluster_key().to_string(),
                        seed_distance: distance,
                    });
                }
            }

            if members.len() > 1 {
                clusters.push(DuplicateCluster { members });
            }
        }

        tracing::debug!(
            records = records.len(),
            clusters = clusters.len(),
            threshold = self.threshold,
            "Duplicate clustering finished"
        );

        clusters
    }
}

/// Cluster `records` with the given Hamming threshold.
pub fn cluster(records: &[MediaRecord], threshold: u32) -> Vec<DuplicateCluster> {
    DuplicateClusterer::new(threshold).cluster(records)
}
