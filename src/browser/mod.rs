//! Browser capability interface and its adapters.
//!
//! The pipeline only ever talks to a [`BrowserSession`]; how that session
//! came to be is the business of a [`SessionFactory`].
//!
//! | Adapter | Module | Transport |
//! |---------|--------|-----------|
//! | Local Chromium | [`local`] | Chrome DevTools Protocol via `chromiumoxide` |
//! | Device cloud grid | [`remote`] | W3C WebDriver JSON over HTTP |

use crate::config::TargetDescriptor;
use crate::error::BrowserError;
use std::time::Duration;
use tokio::time::{Instant, sleep};

pub mod local;
pub mod remote;

#[cfg(test)]
pub mod fixture;

/// Interval between element lookups while waiting for a selector.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A live, navigable browser.
pub trait BrowserSession {
    /// Handle to an element found on the current page.
    type Element;

    /// Load `url` in the session's window.
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;

    /// All elements matching a CSS selector, in document order.
    async fn find_elements(&mut self, selector: &str) -> Result<Vec<Self::Element>, BrowserError>;

    /// Rendered text of an element.
    async fn text(&mut self, element: &Self::Element) -> Result<String, BrowserError>;

    /// Attribute value of an element, `None` when the attribute is absent.
    async fn attribute(
        &mut self,
        element: &Self::Element,
        name: &str,
    ) -> Result<Option<String>, BrowserError>;

    /// Wait until `selector` matches at least one element.
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<(), BrowserError> {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.find_elements(selector).await?.is_empty() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::ElementTimeout {
                    selector: selector.to_string(),
                    timeout,
                });
            }
            sleep(POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now()))).await;
        }
    }

    /// Tell the execution environment how the run went. No-op unless the
    /// environment keeps a session dashboard.
    async fn report_status(&mut self, _passed: bool, _reason: &str) -> Result<(), BrowserError> {
        Ok(())
    }

    /// End the session and free the browser.
    async fn close(self) -> Result<(), BrowserError>
    where
        Self: Sized;
}

/// Creates sessions for a given execution environment.
pub trait SessionFactory {
    type Session: BrowserSession;

    async fn acquire(&self, target: &TargetDescriptor) -> Result<Self::Session, BrowserError>;
}
