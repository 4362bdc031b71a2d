//! Short review summaries for shortlisted candidates.

use serde::Serialize;

use crate::config::SummariesConfig;
use crate::records::MediaRecord;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateSummary {
    pub file_id: String,
    pub filename: String,
    pub thumbnail: String,
    pub virality_score: f64,
    pub interest_score: Option<f64>,
    pub summary: String,
    pub source_url: Option<String>,
}

/// Split on `.`, `!` or `?` followed by whitespace.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.trim().chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        let at_boundary = matches!(c, '.' | '!' | '?')
            && chars.peek().map(|n| n.is_whitespace()).unwrap_or(false);
        if at_boundary {
            sentences.push(std::mem::take(&mut current));
            while chars.peek().map(|n| n.is_whitespace()).unwrap_or(false) {
                chars.next();
            }
        }
    }
    sentences.push(current);

    sentences
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// The first sentence mentioning a keyword plus the one after it, or the
/// first two sentences when nothing matches.
pub fn choose_summary(text: &str, keywords: &[String]) -> String {
    let sentences = split_sentences(text);
    if sentences.is_empty() {
        return String::new();
    }

    let start = sentences
        .iter()
        .position(|s| {
            let lowered = s.to_lowercase();
            keywords
                .iter()
                .any(|k| !k.is_empty() && lowered.contains(&k.to_lowercase()))
        })
        .unwrap_or(0);

    let end = (start + 2).min(sentences.len());
    sentences[start..end].join(" ")
}

/// Collapse whitespace and cut at a word boundary so the result, including
/// a trailing `...`, fits in `max_chars`.
pub fn shorten(text: &str, max_chars: usize) -> String {
    const PLACEHOLDER: &str = "...";

    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }

    let budget = max_chars.saturating_sub(PLACEHOLDER.len());
    let mut out = String::new();
    for word in collapsed.split(' ') {
        let extra = if out.is_empty() { 0 } else { 1 };
        if out.chars().count() + extra + word.chars().count() > budget {
            break;
        }
        if extra == 1 {
            out.push(' ');
        }
        out.push_str(word);
    }

    out.push_str(PLACEHOLDER);
    out
}

pub fn summarize(
    candidates: &[MediaRecord],
    keywords: &[String],
    config: &SummariesConfig,
) -> Vec<CandidateSummary> {
    candidates
        .iter()
        .map(|c| {
            let summary = choose_summary(c.best_text(), keywords);
            CandidateSummary {
                file_id: c.file_id.clone(),
                filename: c.filename.clone(),
                thumbnail: c.thumbnail_path.clone(),
                virality_score: c.virality_score,
                interest_score: c.interest_score,
                summary: shorten(&summary, config.max_chars),
                source_url: config
                    .source_url_template
                    .as_ref()
                    .map(|t| t.replace("{filename}", &c.filename)),
            }
        })
        .collect()
}

/// Markdown preview for one candidate.
pub fn render_markdown(summary: &CandidateSummary) -> String {
    let mut md = String::new();
    md.push_str(&format!("# {}\n\n", summary.filename));
    md.push_str(&format!("**File ID:** {}\n\n", summary.file_id));
    md.push_str(&format!("**Virality Score:** {}\n\n", summary.virality_score));
    match summary.interest_score {
        Some(score) => md.push_str(&format!("**Interest Score:** {}\n\n", score)),
        None => md.push_str("**Interest Score:** n/a\n\n"),
    }
    if let Some(ref url) = summary.source_url {
        md.push_str(&format!("**Source:** {}\n\n", url));
    }
    md.push_str(&format!("## Summary\n{}\n", summary.summary));
    md
}
