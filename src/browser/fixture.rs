//! In-memory browser for tests.
//!
//! Pages are plain HTML strings keyed by URL and queried with `scraper`.
//! Elements are snapshotted when found, so handles stay valid after the
//! session navigates elsewhere.

use super::{BrowserSession, SessionFactory};
use crate::config::TargetDescriptor;
use crate::error::BrowserError;
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FixtureElement {
    pub text: String,
    pub attrs: HashMap<String, String>,
}

/// Shared counters so tests can observe sessions after they are consumed.
#[derive(Debug, Default)]
pub struct SessionLog {
    pub navigations: AtomicUsize,
    pub closed: AtomicUsize,
    pub statuses: std::sync::Mutex<Vec<(bool, String)>>,
}

#[derive(Debug, Clone, Default)]
pub struct FixtureSession {
    pages: Arc<HashMap<String, String>>,
    current: Option<String>,
    /// Each navigation sleeps this long first.
    delay: Duration,
    fail_close: bool,
    pub log: Arc<SessionLog>,
}

impl FixtureSession {
    pub fn new(pages: &[(&str, &str)]) -> Self {
        let pages = pages
            .iter()
            .map(|(url, html)| (url.to_string(), html.to_string()))
            .collect();
        Self {
            pages: Arc::new(pages),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    fn select(&self, selector: &str) -> Result<Vec<FixtureElement>, BrowserError> {
        let Some(html) = &self.current else {
            return Ok(Vec::new());
        };
        let selector = Selector::parse(selector)
            .map_err(|e| BrowserError::Command(format!("invalid selector `{selector}`: {e:?}")))?;
        let document = Html::parse_document(html);
        Ok(document
            .select(&selector)
            .map(|el| FixtureElement {
                text: el
                    .text()
                    .collect::<Vec<_>>()
                    .join(" ")
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" "),
                attrs: el
                    .value()
                    .attrs()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            })
            .collect())
    }
}

impl BrowserSession for FixtureSession {
    type Element = FixtureElement;

    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.log.navigations.fetch_add(1, Ordering::SeqCst);
        match self.pages.get(url) {
            Some(html) => {
                self.current = Some(html.clone());
                Ok(())
            }
            None => Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: "ERR_NAME_NOT_RESOLVED".to_string(),
            }),
        }
    }

    async fn find_elements(&mut self, selector: &str) -> Result<Vec<FixtureElement>, BrowserError> {
        self.select(selector)
    }

    async fn text(&mut self, element: &FixtureElement) -> Result<String, BrowserError> {
        Ok(element.text.clone())
    }

    async fn attribute(
        &mut self,
        element: &FixtureElement,
        name: &str,
    ) -> Result<Option<String>, BrowserError> {
        Ok(element.attrs.get(name).cloned())
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<(), BrowserError> {
        if self.select(selector)?.is_empty() {
            return Err(BrowserError::ElementTimeout {
                selector: selector.to_string(),
                timeout,
            });
        }
        Ok(())
    }

    async fn report_status(&mut self, passed: bool, reason: &str) -> Result<(), BrowserError> {
        if let Ok(mut statuses) = self.log.statuses.lock() {
            statuses.push((passed, reason.to_string()));
        }
        Ok(())
    }

    async fn close(self) -> Result<(), BrowserError> {
        self.log.closed.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(BrowserError::Launch("quit command rejected".into()));
        }
        Ok(())
    }
}

/// Hands out fixture sessions; per-target overrides make a target slow or
/// unavailable.
#[derive(Debug, Default)]
pub struct FixtureFactory {
    pub base: FixtureSession,
    pub overrides: HashMap<String, FixtureSession>,
    pub unavailable: Vec<String>,
    /// Each acquisition sleeps this long first.
    pub acquire_delay: Duration,
    pub acquired: AtomicUsize,
}

impl FixtureFactory {
    pub fn new(base: FixtureSession) -> Self {
        Self {
            base,
            ..Self::default()
        }
    }
}

impl SessionFactory for FixtureFactory {
    type Session = FixtureSession;

    async fn acquire(&self, target: &TargetDescriptor) -> Result<FixtureSession, BrowserError> {
        if !self.acquire_delay.is_zero() {
            tokio::time::sleep(self.acquire_delay).await;
        }
        if self.unavailable.contains(&target.name) {
            return Err(BrowserError::Launch(format!(
                "no capacity for {}",
                target.name
            )));
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .overrides
            .get(&target.name)
            .cloned()
            .unwrap_or_else(|| self.base.clone()))
    }
}
