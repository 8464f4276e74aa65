//! Headline translation with a single-retry policy.
//!
//! - [`TranslationService`]: one request/response call to a remote service
//! - [`MyMemoryClient`]: the MyMemory HTTP implementation
//! - [`Translator`]: wraps any service with the retry policy and degrades to
//!   the original text when translation is unavailable
//!
//! # Retry Strategy
//!
//! - One retry after the first failure
//! - Fixed backoff between attempts (500 ms by default)
//! - Every failure is treated as transient

use crate::error::PipelineError;
use crate::models::{ArticleRecord, TranslationResult};
use crate::utils::truncate_for_log;
use reqwest::Client;
use serde_json::Value;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// Language of the scraped site.
pub const SOURCE_LANG: &str = "es";
pub const TARGET_LANG: &str = "en";

pub const DEFAULT_MAX_RETRIES: usize = 1;
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(500);

/// A remote translation service.
pub trait TranslationService {
    /// Translate `text` from `source` to `target` with a single request.
    async fn translate(&self, text: &str, source: &str, target: &str)
    -> Result<String, PipelineError>;
}

/// Client for the MyMemory translation API.
#[derive(Debug, Clone)]
pub struct MyMemoryClient {
    client: Client,
    endpoint: String,
}

impl MyMemoryClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| PipelineError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

impl TranslationService for MyMemoryClient {
    #[instrument(level = "debug", skip_all, fields(%source, %target))]
    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String, PipelineError> {
        let langpair = format!("{source}|{target}");
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", text), ("langpair", langpair.as_str())])
            .send()
            .await
            .map_err(|e| PipelineError::Translation(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Translation(format!("HTTP {status}")));
        }
        let payload: Value = response
            .json()
            .await
            .map_err(|e| PipelineError::Translation(format!("invalid response body: {e}")))?;
        parse_mymemory_response(&payload)
    }
}

/// Pull the translation out of a MyMemory response body.
///
/// `responseStatus` comes back as a number on success and sometimes as a
/// string on quota errors.
pub fn parse_mymemory_response(payload: &Value) -> Result<String, PipelineError> {
    let status = match &payload["responseStatus"] {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    };
    if status != Some(200) {
        let details = payload["responseDetails"]
            .as_str()
            .filter(|d| !d.is_empty())
            .unwrap_or("unknown error");
        return Err(PipelineError::Translation(format!(
            "service status {}: {details}",
            status.map_or_else(|| "missing".to_string(), |s| s.to_string())
        )));
    }
    match payload["responseData"]["translatedText"].as_str() {
        Some(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
        _ => Err(PipelineError::Translation("empty translation".into())),
    }
}

/// Translation with retry and fallback identity.
pub struct Translator<S> {
    service: S,
    max_retries: usize,
    backoff: Duration,
    source_lang: String,
    target_lang: String,
}

impl<S> fmt::Debug for Translator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Translator")
            .field("max_retries", &self.max_retries)
            .field("backoff", &self.backoff)
            .field("source_lang", &self.source_lang)
            .field("target_lang", &self.target_lang)
            .finish()
    }
}

impl<S> Translator<S>
where
    S: TranslationService,
{
    /// Spanish to English with one retry after [`DEFAULT_BACKOFF`].
    pub fn new(service: S) -> Self {
        Self {
            service,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: DEFAULT_BACKOFF,
            source_lang: SOURCE_LANG.to_string(),
            target_lang: TARGET_LANG.to_string(),
        }
    }

    pub fn with_retry(mut self, max_retries: usize, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.backoff = backoff;
        self
    }

    /// Translate `text`. Never fails: on exhausted retries the result carries
    /// `success = false` and the original text as its translation.
    #[instrument(level = "info", skip_all)]
    pub async fn translate(&self, text: &str) -> TranslationResult {
        if text.trim().is_empty() {
            return TranslationResult::fallback(text, "empty input");
        }

        let total_t0 = Instant::now();
        let mut attempt = 0usize;
        loop {
            match self
                .service
                .translate(text, &self.source_lang, &self.target_lang)
                .await
            {
                Ok(translated) => {
                    debug!(
                        attempt,
                        original = %truncate_for_log(text, 80),
                        translated = %truncate_for_log(&translated, 80),
                        "Translated"
                    );
                    return TranslationResult::translated(text, translated);
                }
                Err(e) => {
                    attempt += 1;
                    let total_dt = total_t0.elapsed();
                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_total = total_dt.as_millis(),
                            error = %e,
                            "translate() exhausted retries; keeping original text"
                        );
                        return TranslationResult::fallback(text, e.to_string());
                    }
                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_total = total_dt.as_millis(),
                        delay = ?self.backoff,
                        error = %e,
                        "translate() attempt failed; backing off"
                    );
                    sleep(self.backoff).await;
                }
            }
        }
    }

    /// Translate every record's title in order and store the outcome in
    /// `translated_title`. `title` is left untouched.
    #[instrument(level = "info", skip_all, fields(count = records.len()))]
    pub async fn translate_records(&self, records: &mut [ArticleRecord]) -> Vec<TranslationResult> {
        let mut results = Vec::with_capacity(records.len());
        for record in records.iter_mut() {
            let result = self.translate(&record.title).await;
            info!(
                id = record.id,
                success = result.success,
                original = %record.title,
                translated = %result.translated,
                "Title translated"
            );
            record.translated_title = Some(result.translated.clone());
            results.push(result);
        }
        results
    }
}
