//! Lenient field decoding for rows coming out of CSV manifests and JSON
//! result files.
//!
//! Upstream tools write the same column as `"3"`, `3`, `3.0` or `""`, and
//! list columns as either `"a,b"` or `["a", "b"]`. Everything is folded to
//! the neutral value on mismatch so the rest of the crate never sees a
//! missing or malformed field.

use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<String>),
    Null(()),
}

impl Loose {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Loose::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Loose::Int(i) => Some(*i as f64),
            Loose::Float(f) if f.is_finite() => Some(*f),
            Loose::Text(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            _ => None,
        }
    }

    fn as_bool(&self) -> bool {
        match self {
            Loose::Bool(b) => *b,
            Loose::Int(i) => *i != 0,
            Loose::Float(f) => *f != 0.0,
            Loose::Text(s) => matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes"),
            _ => false,
        }
    }

    fn into_items(self) -> Vec<String> {
        match self {
            Loose::Text(s) => s.split(',').map(str::to_string).collect(),
            Loose::List(items) => items,
            _ => Vec::new(),
        }
    }
}

pub fn lenient_u32<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    let value = Option::<Loose>::deserialize(d).unwrap_or(None);
    Ok(value
        .and_then(|v| v.as_f64())
        .filter(|f| *f >= 0.0)
        .map(|f| f.min(u32::MAX as f64) as u32)
        .unwrap_or(0))
}

pub fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    let value = Option::<Loose>::deserialize(d).unwrap_or(None);
    Ok(value.and_then(|v| v.as_f64()).unwrap_or(0.0))
}

pub fn lenient_opt_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    let value = Option::<Loose>::deserialize(d).unwrap_or(None);
    Ok(value.and_then(|v| v.as_f64()))
}

pub fn lenient_bool<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    let value = Option::<Loose>::deserialize(d).unwrap_or(None);
    Ok(value.map(|v| v.as_bool()).unwrap_or(false))
}

pub fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let value = Option::<Loose>::deserialize(d).unwrap_or(None);
    Ok(match value {
        Some(Loose::Text(s)) => s,
        Some(Loose::Int(i)) => i.to_string(),
        Some(Loose::Float(f)) => f.to_string(),
        Some(Loose::Bool(b)) => b.to_string(),
        _ => String::new(),
    })
}

/// Comma-joined string or array, lowercased and deduplicated.
pub fn tag_set<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeSet<String>, D::Error> {
    let value = Option::<Loose>::deserialize(d).unwrap_or(None);
    Ok(value
        .map(Loose::into_items)
        .unwrap_or_default()
        .into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect())
}

/// Comma-joined string or array, order preserved.
pub fn string_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    let value = Option::<Loose>::deserialize(d).unwrap_or(None);
    Ok(value
        .map(Loose::into_items)
        .unwrap_or_default()
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MatchCounts {
    Map(BTreeMap<String, Loose>),
    Text(String),
    Null(()),
}

/// Provider → match count, either as an object or a JSON-encoded string cell.
pub fn match_counts<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeMap<String, u32>, D::Error> {
    let raw = match MatchCounts::deserialize(d) {
        Ok(MatchCounts::Map(map)) => map,
        Ok(MatchCounts::Text(s)) if !s.trim().is_empty() => {
            serde_json::from_str::<BTreeMap<String, Loose>>(&s).unwrap_or_default()
        }
        _ => BTreeMap::new(),
    };

    Ok(raw
        .into_iter()
        .filter_map(|(provider, count)| {
            count
                .as_f64()
                .filter(|c| *c >= 0.0)
                .map(|c| (provider, c as u32))
        })
        .collect())
}
