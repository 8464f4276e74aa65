//! Error types for browser adapters, the scraping pipeline and image downloads.
//!
//! Adapters speak [`BrowserError`]; the pipeline folds those into the
//! [`PipelineError`] taxonomy, which decides whether a failure is isolated to
//! one article or ends the whole run for a target.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a [`crate::browser::BrowserSession`] implementation.
#[derive(Error, Debug)]
pub enum BrowserError {
    /// The page could not be loaded.
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// A selector never matched within the allowed time.
    #[error("`{selector}` did not appear within {timeout:?}")]
    ElementTimeout { selector: String, timeout: Duration },

    /// The driver rejected or failed a command.
    #[error("driver command failed: {0}")]
    Command(String),

    /// The driver answered with something we could not understand.
    #[error("unexpected driver response: {0}")]
    Protocol(String),

    /// The browser or remote session could not be started or stopped.
    #[error("session error: {0}")]
    Launch(String),

    /// Transport failure talking to a remote driver.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Failure taxonomy of a pipeline run.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Section or article page unreachable. Fatal to the run.
    #[error("navigation error at {url}: {reason}")]
    Navigation { url: String, reason: String },

    /// An expected element was missing on one article. The article is skipped.
    #[error("parse error at {url}: {reason}")]
    Parse { url: String, reason: String },

    /// Remote translation failed. Degrades to untranslated text.
    #[error("translation error: {0}")]
    Translation(String),

    /// Session acquisition or teardown failed. Fatal to the run.
    #[error("session error: {0}")]
    Session(String),

    /// The run exceeded its time budget.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Invalid configuration supplied at startup.
    #[error("configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Wrap an adapter error raised while loading or reading `url`.
    pub fn navigation(url: &str, err: BrowserError) -> Self {
        PipelineError::Navigation {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }

    /// Classify this error for the serializable run record.
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Navigation { .. } => FailureKind::Navigation,
            PipelineError::Parse { .. } => FailureKind::Parse,
            PipelineError::Translation(_) => FailureKind::Translation,
            PipelineError::Session(_) => FailureKind::Session,
            PipelineError::Timeout(_) => FailureKind::Timeout,
            PipelineError::Config(_) => FailureKind::Config,
        }
    }
}

impl From<serde_yaml::Error> for PipelineError {
    fn from(e: serde_yaml::Error) -> Self {
        PipelineError::Config(e.to_string())
    }
}

/// Coarse category of a failure, kept in [`crate::models::RunFailure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Navigation,
    Parse,
    Translation,
    Session,
    Timeout,
    Config,
}

/// Errors from the image download collaborator. Logged, never propagated.
#[derive(Error, Debug)]
pub enum ImageError {
    #[error("image request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("image server answered HTTP {0}")]
    Status(u16),

    #[error("could not write image: {0}")]
    Io(#[from] std::io::Error),
}
