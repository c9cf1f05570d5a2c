//! Picks illustration topics from markdown.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::sanitize::truncate_chars;

static RE_H2: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^##\s+(.+)$").unwrap());
static RE_H2_SPLIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^##\s+").unwrap());
static RE_HEADING_NOISE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[*_#\d.]+").unwrap());

const MIN_TOPIC_CHARS: usize = 6;
const FALLBACK_LINE_CHARS: usize = 100;
const DEDUPE_PREFIX_CHARS: usize = 30;

fn is_closing_heading(heading: &str) -> bool {
    let lower = heading.to_lowercase();
    ["referênc", "referenc", "conclus", "fontes", "sources"]
        .iter()
        .any(|marker| lower.contains(marker))
}

/// Up to `max` topics: cleaned H2 headings first, then the first prose line
/// of each section, deduplicated on a lowercase prefix.
pub fn markdown_topics(markdown: &str, max: usize) -> Vec<String> {
    let mut topics: Vec<String> = RE_H2
        .captures_iter(markdown)
        .map(|c| RE_HEADING_NOISE.replace_all(&c[1], "").trim().to_string())
        .filter(|t| t.chars().count() >= MIN_TOPIC_CHARS && !is_closing_heading(t))
        .collect();

    if topics.len() < max {
        for section in RE_H2_SPLIT.split(markdown).skip(1) {
            let first_prose = section.lines().skip(1).map(str::trim).find(|line| {
                !line.is_empty()
                    && !line.starts_with('#')
                    && !line.starts_with('|')
                    && !line.starts_with('-')
            });
            if let Some(line) = first_prose {
                topics.push(truncate_chars(line, FALLBACK_LINE_CHARS).to_string());
            }
        }
    }

    let mut seen = HashSet::new();
    topics
        .into_iter()
        .filter(|t| seen.insert(truncate_chars(&t.to_lowercase(), DEDUPE_PREFIX_CHARS).to_string()))
        .take(max)
        .collect()
}

/// Fills `topics` up to `count` with the objective, when there is one.
pub fn pad_with_objective(mut topics: Vec<String>, objective: &str, count: usize) -> Vec<String> {
    let objective = truncate_chars(objective.trim(), FALLBACK_LINE_CHARS);
    if objective.is_empty() {
        return topics;
    }
    if topics.len() < count && !topics.iter().any(|t| t == objective) {
        topics.push(objective.to_string());
    }
    while topics.len() < count {
        let n = topics.len() + 1;
        topics.push(format!("{} ({})", objective, n));
    }
    topics
}
