//! Local Chromium adapter.
//!
//! Launches a Chromium process on this machine and drives it over the
//! DevTools protocol. The CDP event loop runs on its own tokio task for the
//! lifetime of the session.

use super::{BrowserSession, SessionFactory};
use crate::config::TargetDescriptor;
use crate::error::BrowserError;
use chromiumoxide::{Browser, BrowserConfig, Element, Page};
use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Starts local Chromium sessions.
#[derive(Debug, Clone)]
pub struct LocalChromium {
    pub headless: bool,
    /// Bound on each CDP request, including page loads.
    pub request_timeout: Duration,
}

impl LocalChromium {
    pub fn new(headless: bool, request_timeout: Duration) -> Self {
        Self {
            headless,
            request_timeout,
        }
    }

    fn browser_config(&self) -> Result<BrowserConfig, BrowserError> {
        let mut builder = BrowserConfig::builder()
            .window_size(1920, 1080)
            .request_timeout(self.request_timeout)
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--lang=es");
        if !self.headless {
            builder = builder.with_head();
        }
        builder.build().map_err(BrowserError::Launch)
    }
}

impl SessionFactory for LocalChromium {
    type Session = LocalSession;

    #[instrument(level = "info", skip_all, fields(target = %target, headless = self.headless))]
    async fn acquire(&self, target: &TargetDescriptor) -> Result<LocalSession, BrowserError> {
        let config = self.browser_config()?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "CDP handler stopped");
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                events.abort();
                return Err(BrowserError::Launch(e.to_string()));
            }
        };

        info!("Local browser started");
        Ok(LocalSession {
            browser,
            page,
            events,
        })
    }
}

/// A running local Chromium with a single tab.
pub struct LocalSession {
    browser: Browser,
    page: Page,
    events: JoinHandle<()>,
}

impl BrowserSession for LocalSession {
    type Element = Element;

    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| BrowserError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn find_elements(&mut self, selector: &str) -> Result<Vec<Element>, BrowserError> {
        self.page
            .find_elements(selector)
            .await
            .map_err(|e| BrowserError::Command(format!("find `{selector}`: {e}")))
    }

    async fn text(&mut self, element: &Element) -> Result<String, BrowserError> {
        let text = element
            .inner_text()
            .await
            .map_err(|e| BrowserError::Command(e.to_string()))?;
        Ok(text.unwrap_or_default())
    }

    async fn attribute(
        &mut self,
        element: &Element,
        name: &str,
    ) -> Result<Option<String>, BrowserError> {
        element
            .attribute(name)
            .await
            .map_err(|e| BrowserError::Command(format!("attribute `{name}`: {e}")))
    }

    #[instrument(level = "info", skip_all)]
    async fn close(mut self) -> Result<(), BrowserError> {
        let closed = self
            .browser
            .close()
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()));
        if let Err(e) = self.browser.wait().await {
            warn!(error = %e, "Browser process did not exit cleanly");
        }
        self.events.abort();
        closed.map(|_| info!("Local browser closed"))
    }
}
