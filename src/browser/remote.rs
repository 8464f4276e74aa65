//! Device cloud grid adapter.
//!
//! Speaks the W3C WebDriver protocol (JSON over HTTP) to a remote hub. The
//! target descriptor and the grid credentials travel in the
//! `bstack:options` capability block when the session is created; every
//! later command is addressed to `{hub}/session/{id}/...`.

use super::{BrowserSession, SessionFactory};
use crate::config::TargetDescriptor;
use crate::error::BrowserError;
use reqwest::{Client, Method};
use serde_json::{Value, json};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Key under which WebDriver returns element references.
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Account used to open grid sessions.
#[derive(Clone)]
pub struct GridCredentials {
    pub username: String,
    pub access_key: String,
}

impl fmt::Debug for GridCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GridCredentials")
            .field("username", &self.username)
            .field("access_key", &"<redacted>")
            .finish()
    }
}

/// Opens WebDriver sessions on a remote grid, one per target descriptor.
#[derive(Debug, Clone)]
pub struct RemoteGrid {
    client: Client,
    hub_url: String,
    credentials: GridCredentials,
    build_name: String,
    page_load_timeout: Duration,
}

impl RemoteGrid {
    pub fn new(
        hub_url: &str,
        credentials: GridCredentials,
        page_load_timeout: Duration,
    ) -> Result<Self, BrowserError> {
        // Session creation on a device cloud can take a while to queue.
        let client = Client::builder()
            .timeout(page_load_timeout + Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            hub_url: hub_url.trim_end_matches('/').to_string(),
            credentials,
            build_name: format!("opinion_digest {}", env!("CARGO_PKG_VERSION")),
            page_load_timeout,
        })
    }

    /// W3C capabilities requesting `target`.
    pub fn capabilities(&self, target: &TargetDescriptor) -> Value {
        let mut options = json!({
            "os": target.os,
            "osVersion": target.os_version,
            "sessionName": target.name,
            "buildName": self.build_name,
            "userName": self.credentials.username,
            "accessKey": self.credentials.access_key,
            "resolution": "1920x1080",
            "networkLogs": true,
            "consoleLogs": "info",
        });
        if let Some(device) = &target.device {
            options["deviceName"] = json!(device);
            // Real devices choose their own OS image and resolution.
            if let Some(map) = options.as_object_mut() {
                map.remove("os");
                map.remove("resolution");
            }
        }
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": target.browser,
                    "browserVersion": target.browser_version,
                    "acceptInsecureCerts": true,
                    "bstack:options": options,
                }
            }
        })
    }
}

impl SessionFactory for RemoteGrid {
    type Session = RemoteSession;

    #[instrument(level = "info", skip_all, fields(target = %target))]
    async fn acquire(&self, target: &TargetDescriptor) -> Result<RemoteSession, BrowserError> {
        let response = self
            .client
            .post(format!("{}/session", self.hub_url))
            .json(&self.capabilities(target))
            .send()
            .await?;
        let status = response.status();
        let payload: Value = response.json().await?;
        if !status.is_success() {
            return Err(BrowserError::Launch(webdriver_error_message(&payload)));
        }
        let session_id = parse_session_id(&payload)?;
        info!(%session_id, "Remote session created");

        let mut session = RemoteSession {
            client: self.client.clone(),
            base: format!("{}/session/{}", self.hub_url, session_id),
            session_id,
        };
        let timeouts = json!({
            "pageLoad": self.page_load_timeout.as_millis() as u64,
            "implicit": 0,
        });
        if let Err(e) = session.command(Method::POST, "/timeouts", Some(timeouts)).await {
            warn!(error = %e, "Could not set remote timeouts; keeping grid defaults");
        }
        Ok(session)
    }
}

/// One WebDriver session on the grid.
#[derive(Debug)]
pub struct RemoteSession {
    client: Client,
    base: String,
    session_id: String,
}

impl RemoteSession {
    /// Send a command and return its `value` member.
    async fn command(
        &mut self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, BrowserError> {
        let url = format!("{}{}", self.base, path);
        debug!(%method, %url, "WebDriver command");
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        let status = response.status();
        let mut payload: Value = response.json().await?;
        if !status.is_success() {
            return Err(BrowserError::Command(webdriver_error_message(&payload)));
        }
        Ok(payload["value"].take())
    }
}

impl BrowserSession for RemoteSession {
    type Element = String;

    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await
            .map_err(|e| BrowserError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn find_elements(&mut self, selector: &str) -> Result<Vec<String>, BrowserError> {
        let body = json!({ "using": "css selector", "value": selector });
        let value = self.command(Method::POST, "/elements", Some(body)).await?;
        parse_element_ids(&value)
    }

    async fn text(&mut self, element: &String) -> Result<String, BrowserError> {
        let value = self
            .command(Method::GET, &format!("/element/{element}/text"), None)
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn attribute(
        &mut self,
        element: &String,
        name: &str,
    ) -> Result<Option<String>, BrowserError> {
        let value = self
            .command(
                Method::GET,
                &format!("/element/{element}/attribute/{name}"),
                None,
            )
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn report_status(&mut self, passed: bool, reason: &str) -> Result<(), BrowserError> {
        let body = json!({ "script": status_script(passed, reason), "args": [] });
        self.command(Method::POST, "/execute/sync", Some(body))
            .await
            .map(|_| ())
    }

    #[instrument(level = "info", skip_all, fields(session_id = %self.session_id))]
    async fn close(mut self) -> Result<(), BrowserError> {
        self.command(Method::DELETE, "", None)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;
        info!("Remote session released");
        Ok(())
    }
}

/// Extract the session id from a New Session response.
pub fn parse_session_id(payload: &Value) -> Result<String, BrowserError> {
    payload["value"]["sessionId"]
        .as_str()
        // JSON wire protocol grids put it at the top level.
        .or_else(|| payload["sessionId"].as_str())
        .map(str::to_string)
        .ok_or_else(|| BrowserError::Protocol(format!("no sessionId in {payload}")))
}

/// Extract element references from a Find Elements `value`.
pub fn parse_element_ids(value: &Value) -> Result<Vec<String>, BrowserError> {
    let items = value
        .as_array()
        .ok_or_else(|| BrowserError::Protocol(format!("expected element list, got {value}")))?;
    items
        .iter()
        .map(|item| {
            item[ELEMENT_KEY]
                .as_str()
                .or_else(|| item["ELEMENT"].as_str())
                .map(str::to_string)
                .ok_or_else(|| BrowserError::Protocol(format!("malformed element {item}")))
        })
        .collect()
}

/// Human-readable message from a WebDriver error payload.
pub fn webdriver_error_message(payload: &Value) -> String {
    let error = payload["value"]["error"].as_str().unwrap_or("unknown error");
    match payload["value"]["message"].as_str() {
        Some(message) if !message.is_empty() => format!("{error}: {message}"),
        _ => error.to_string(),
    }
}

/// Script that sets the grid dashboard status of the current session.
pub fn status_script(passed: bool, reason: &str) -> String {
    let command = json!({
        "action": "setSessionStatus",
        "arguments": {
            "status": if passed { "passed" } else { "failed" },
            "reason": reason,
        }
    });
    format!("browserstack_executor: {command}")
}
