//! Word frequency analysis over translated headlines.
//!
//! Normalization is plain: lowercase, punctuation replaced by
//! whitespace, split on whitespace. No stemming and no stop-word list, so
//! words like "the" qualify like any other. By default every occurrence
//! counts; [`CountMode::OncePerTitle`] counts a word at most once per title.

use crate::models::{RepeatedWord, WordFrequencyReport};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// A word qualifies when its count is strictly greater than this.
pub const DEFAULT_REPEAT_THRESHOLD: usize = 2;

/// Anything that is not a letter, a digit or whitespace.
static NON_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}\p{N}\s]+").expect("static regex"));

/// Lowercased, punctuation-free, non-empty tokens of `text`, in order.
pub fn normalize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    NON_WORD
        .replace_all(&lowered, " ")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// How occurrences are tallied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountMode {
    /// Every occurrence counts, including repeats inside one title.
    #[default]
    AllOccurrences,
    /// A word counts at most once per title.
    OncePerTitle,
}

/// Word frequency analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Analyzer {
    /// A word qualifies when its count is strictly greater than this.
    pub threshold: usize,
    pub mode: CountMode,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_REPEAT_THRESHOLD,
            mode: CountMode::AllOccurrences,
        }
    }
}

impl Analyzer {
    pub fn new(threshold: usize, mode: CountMode) -> Self {
        Self { threshold, mode }
    }

    /// Count words across `titles` and report those above the threshold.
    ///
    /// The qualifying list is ordered by descending count, then ascending word.
    #[instrument(level = "info", skip_all, fields(titles = titles.len(), threshold = self.threshold, mode = ?self.mode))]
    pub fn analyze<S: AsRef<str>>(&self, titles: &[S]) -> WordFrequencyReport {
        let tokenized: Vec<(&str, Vec<String>)> = titles
            .iter()
            .map(|t| (t.as_ref(), normalize(t.as_ref())))
            .collect();

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for (_, words) in &tokenized {
            let words: Vec<&String> = match self.mode {
                CountMode::AllOccurrences => words.iter().collect(),
                CountMode::OncePerTitle => words.iter().unique().collect(),
            };
            for word in words {
                *counts.entry(word.clone()).or_insert(0) += 1;
            }
        }

        let repeated = counts
            .iter()
            .filter(|(_, count)| **count > self.threshold)
            .sorted_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)))
            .map(|(word, count)| RepeatedWord {
                word: word.clone(),
                count: *count,
                titles: tokenized
                    .iter()
                    .filter(|(_, words)| words.contains(word))
                    .map(|(title, _)| title.to_string())
                    .unique()
                    .collect(),
            })
            .collect::<Vec<_>>();

        debug!(
            distinct = counts.len(),
            qualifying = repeated.len(),
            "Word frequencies computed"
        );

        WordFrequencyReport {
            counts,
            repeated,
            threshold: self.threshold,
        }
    }
}

/// Count every word occurrence across `titles` and report those seen more
/// than twice.
pub fn analyze<S: AsRef<str>>(titles: &[S]) -> WordFrequencyReport {
    Analyzer::default().analyze(titles)
}
