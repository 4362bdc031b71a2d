//! Individual interest signals.
//!
//! Each signal reports its own failure instead of hiding it; the scorer
//! decides what a failure is worth (nothing).

use image::imageops::FilterType;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use crate::records::MediaRecord;

/// Grayscale standard deviation at which the variance signal saturates.
const VARIANCE_FULL_SCALE: f64 = 64.0;
const VARIANCE_MAX: f64 = 3.0;

const FACE_WEIGHT: f64 = 0.8;
const FACE_MAX: f64 = 2.0;

const NSFW_BONUS: f64 = 2.0;
const SKIN_BONUS: f64 = 0.5;
const SKIN_THRESHOLD: f64 = 0.20;

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("input missing")]
    Missing,
    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed input: {0}")]
    Malformed(String),
}

/// Signals that make up the interest score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Keyword,
    Uniqueness,
    Variance,
    Faces,
    Sensitivity,
    Novelty,
}

impl Signal {
    pub fn name(&self) -> &'static str {
        match self {
            Signal::Keyword => "keyword",
            Signal::Uniqueness => "uniqueness",
            Signal::Variance => "variance",
            Signal::Faces => "faces",
            Signal::Sensitivity => "sensitivity",
            Signal::Novelty => "novelty",
        }
    }
}

/// `2W` per strong tag, `W` per other tag.
pub fn keyword(record: &MediaRecord, strong: &HashSet<String>, weight: f64) -> Result<f64, SignalError> {
    Ok(record
        .keywords_found
        .iter()
        .map(|tag| if strong.contains(tag) { 2.0 * weight } else { weight })
        .sum())
}

/// `U / (1 + n)` where `n` counts the other records sharing this exact phash.
pub fn uniqueness(record: &MediaRecord, all: &[MediaRecord], weight: f64) -> Result<f64, SignalError> {
    if record.phash.trim().is_empty() {
        return Err(SignalError::Missing);
    }

    let same = all.iter().filter(|r| r.phash == record.phash).count();
    // The record itself is normally part of `all`; it is not its own duplicate.
    let own = all
        .iter()
        .any(|r| r.file_id == record.file_id && r.phash == record.phash);
    let others = same.saturating_sub(own as usize);

    Ok(weight / (1.0 + others as f64))
}

/// Grayscale standard deviation of a `size`×`size` downsample, scaled to
/// `[0, 3]`. Flat scans score near zero, photographs high.
pub fn variance(path: &str, size: u32) -> Result<f64, SignalError> {
    if path.trim().is_empty() {
        return Err(SignalError::Missing);
    }
    if size == 0 {
        return Err(SignalError::Malformed("sample size is zero".to_string()));
    }

    let path = Path::new(path);
    if !path.exists() {
        return Err(SignalError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} not found", path.display()),
        )));
    }

    let img = image::open(path)?;
    let gray = img.resize_exact(size, size, FilterType::Triangle).to_luma8();

    let pixels: Vec<f64> = gray.pixels().map(|p| p.0[0] as f64).collect();
    if pixels.is_empty() {
        return Err(SignalError::Malformed("empty image".to_string()));
    }

    let n = pixels.len() as f64;
    let mean = pixels.iter().sum::<f64>() / n;
    let var = pixels.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std_dev = var.sqrt();

    Ok((std_dev / VARIANCE_FULL_SCALE * VARIANCE_MAX).min(VARIANCE_MAX))
}

pub fn faces(record: &MediaRecord) -> Result<f64, SignalError> {
    Ok((record.face_count as f64 * FACE_WEIGHT).min(FACE_MAX))
}

/// `+2` when flagged NSFW, `+0.5` more when over a fifth of the image is skin.
/// The two parts are independent: an unusable skin fraction only forfeits
/// the skin part.
pub fn sensitivity(record: &MediaRecord) -> Result<f64, SignalError> {
    let nsfw = if record.likely_nsfw { NSFW_BONUS } else { 0.0 };
    let skin = match skin_bonus(record.skin_fraction) {
        Ok(bonus) => bonus,
        Err(e) => {
            tracing::debug!(file_id = %record.file_id, error = %e, "Skin fraction ignored");
            0.0
        }
    };
    Ok(nsfw + skin)
}

fn skin_bonus(skin: f64) -> Result<f64, SignalError> {
    if !skin.is_finite() || !(0.0..=1.0).contains(&skin) {
        return Err(SignalError::Malformed(format!("skin fraction {}", skin)));
    }
    Ok(if skin > SKIN_THRESHOLD { SKIN_BONUS } else { 0.0 })
}

/// Fewer reverse-image-search hits means more novel.
pub fn novelty(record: &MediaRecord) -> Result<f64, SignalError> {
    Ok(match record.reverse_search_total() {
        0 => 2.0,
        1..=2 => 1.0,
        _ => 0.0,
    })
}
