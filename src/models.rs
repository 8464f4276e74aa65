//! Data models flowing through a pipeline run.
//!
//! - [`ArticleRecord`]: one scraped opinion article
//! - [`TranslationResult`]: outcome of translating one title
//! - [`WordFrequencyReport`]: word counts over the translated titles
//! - [`RunResult`]: everything one run (local or per grid target) produced
//!
//! All of these live for a single run. Only [`RunResult`] is written out,
//! as JSON, when an output directory is configured.

use crate::error::{FailureKind, PipelineError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// An article scraped from the section listing.
///
/// Created by the extractor; `translated_title` is filled once by the
/// translation stage and `title` is never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    /// 1-based position of the article link on the listing page.
    pub id: usize,
    /// Article page URL.
    pub url: String,
    /// Headline in the site's language.
    pub title: String,
    /// Leading paragraphs of the article, empty when none were found.
    pub body: String,
    /// Cover image URL, when the page has one.
    pub image_url: Option<String>,
    /// Where the cover image was stored, if it was downloaded.
    pub image_path: Option<PathBuf>,
    /// English headline, set by the translation stage.
    pub translated_title: Option<String>,
}

impl ArticleRecord {
    pub fn new(id: usize, url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
            title: title.into(),
            body: String::new(),
            image_url: None,
            image_path: None,
            translated_title: None,
        }
    }

    /// Text fed to the analyzer: the translation when present, else the original title.
    pub fn analysis_text(&self) -> &str {
        self.translated_title.as_deref().unwrap_or(&self.title)
    }
}

/// Outcome of one translation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationResult {
    pub original: String,
    /// The translation, or `original` unchanged when translation failed.
    pub translated: String,
    pub success: bool,
    pub error: Option<String>,
}

impl TranslationResult {
    pub fn translated(original: &str, translated: String) -> Self {
        Self {
            original: original.to_string(),
            translated,
            success: true,
            error: None,
        }
    }

    /// Failed translation that falls back to the original text.
    pub fn fallback(original: &str, error: impl Into<String>) -> Self {
        Self {
            original: original.to_string(),
            translated: original.to_string(),
            success: false,
            error: Some(error.into()),
        }
    }
}

/// A word whose count exceeded the repetition threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatedWord {
    pub word: String,
    pub count: usize,
    /// Distinct titles containing the word, in input order.
    pub titles: Vec<String>,
}

/// Word frequencies over the translated titles of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordFrequencyReport {
    /// Count of every normalized word in the corpus.
    pub counts: BTreeMap<String, usize>,
    /// Words with a count above `threshold`, by descending count then word.
    pub repeated: Vec<RepeatedWord>,
    pub threshold: usize,
}

impl WordFrequencyReport {
    /// The `n` most frequent words, by descending count then word.
    pub fn top_words(&self, n: usize) -> Vec<(&str, usize)> {
        let mut all: Vec<(&str, usize)> = self
            .counts
            .iter()
            .map(|(w, c)| (w.as_str(), *c))
            .collect();
        all.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        all.truncate(n);
        all
    }

    /// `(word, count)` pairs of the qualifying words, in report order.
    pub fn repeated_pairs(&self) -> Vec<(&str, usize)> {
        self.repeated
            .iter()
            .map(|r| (r.word.as_str(), r.count))
            .collect()
    }
}

/// States a run passes through. `SessionReleased` is always the last entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Init,
    SessionAcquired,
    Extracted,
    Translated,
    Analyzed,
    SessionReleased,
}

/// Why a run failed and where it was when it did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    pub kind: FailureKind,
    /// Last stage reached before the failure.
    pub stage: RunStage,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed(RunFailure),
}

/// Everything a single run produced, successful or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Human-readable name of the execution environment.
    pub target: String,
    pub stages: Vec<RunStage>,
    pub status: RunStatus,
    pub records: Vec<ArticleRecord>,
    pub translations: Vec<TranslationResult>,
    pub report: Option<WordFrequencyReport>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u128,
}

impl RunResult {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            stages: vec![RunStage::Init],
            status: RunStatus::Completed,
            records: Vec::new(),
            translations: Vec::new(),
            report: None,
            started_at: Utc::now(),
            elapsed_ms: 0,
        }
    }

    pub fn stage(&self) -> RunStage {
        self.stages.last().copied().unwrap_or(RunStage::Init)
    }

    pub fn advance(&mut self, stage: RunStage) {
        self.stages.push(stage);
    }

    /// Mark the run failed at its current stage. The first failure wins.
    pub fn fail(&mut self, kind: FailureKind, message: impl Into<String>) {
        if self.is_completed() {
            self.status = RunStatus::Failed(RunFailure {
                kind,
                stage: self.stage(),
                message: message.into(),
            });
        }
    }

    pub fn fail_with(&mut self, err: &PipelineError) {
        self.fail(err.kind(), err.to_string());
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status, RunStatus::Completed)
    }

    pub fn failure(&self) -> Option<&RunFailure> {
        match &self.status {
            RunStatus::Failed(f) => Some(f),
            RunStatus::Completed => None,
        }
    }

    /// A run counts as productive when it extracted at least one article and
    /// reached analysis, even if something failed afterwards (e.g. teardown).
    pub fn is_productive(&self) -> bool {
        !self.records.is_empty() && self.stages.contains(&RunStage::Analyzed)
    }
}
