//! W3C WebDriver adapter
//!
//! Drives a chromedriver-compatible endpoint over HTTP with `reqwest`.
//! One [`WebDriverBrowser`] owns one remote session; elements are handles
//! into that session and share its HTTP client.

#![allow(clippy::uninlined_format_args)]

use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, ClientBuilder, Method};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::infrastructure::browser::{
    BrowserError, BrowserLauncher, BrowserResult, BrowserSession, PageElement,
};
use crate::infrastructure::config::BrowserConfig;

/// Key under which W3C element references are returned
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const COMMAND_TIMEOUT_SECS: u64 = 60;
const CSS_SELECTOR: &str = "css selector";

struct Connection {
    http: Client,
    session_url: String,
}

impl Connection {
    /// Send one command and unwrap the `value` member of the reply
    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> BrowserResult<Value> {
        let url = format!("{}{}", self.session_url, path);
        debug!("WebDriver {} {}", method, url);

        let mut request = self.http.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        let payload: Value = response.json().await?;
        let value = payload.get("value").cloned().unwrap_or(Value::Null);

        if status.is_success() {
            Ok(value)
        } else {
            Err(map_error(path, &value))
        }
    }

    async fn find_elements(&self, scope: &str, selector: &str) -> BrowserResult<Vec<String>> {
        let value = self
            .command(
                Method::POST,
                &format!("{}/elements", scope),
                Some(json!({ "using": CSS_SELECTOR, "value": selector })),
            )
            .await?;

        value
            .as_array()
            .ok_or_else(|| BrowserError::protocol("find elements", "invalid response", "expected an array"))?
            .iter()
            .map(element_id)
            .collect()
    }
}

fn element_id(value: &Value) -> BrowserResult<String> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| BrowserError::protocol("find elements", "invalid response", "missing element reference"))
}

/// Translate a W3C error object into a `BrowserError`
fn map_error(command: &str, value: &Value) -> BrowserError {
    let error = value.get("error").and_then(Value::as_str).unwrap_or("unknown error");
    let message = value.get("message").and_then(Value::as_str).unwrap_or_default();

    match error {
        "no such element" => BrowserError::NoSuchElement {
            selector: message.to_string(),
        },
        "no such frame" => BrowserError::NoSuchFrame {
            id: message.to_string(),
        },
        "stale element reference" => BrowserError::StaleElement {
            reason: message.to_string(),
        },
        _ => BrowserError::protocol(command, error, message),
    }
}

/// Starts one remote Chrome session per launch
#[derive(Debug, Clone)]
pub struct WebDriverLauncher {
    config: BrowserConfig,
    http: Client,
}

impl WebDriverLauncher {
    pub fn new(config: BrowserConfig) -> BrowserResult<Self> {
        let http = ClientBuilder::new()
            .timeout(Duration::from_secs(COMMAND_TIMEOUT_SECS))
            .user_agent(concat!("seance-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { config, http })
    }

    fn capabilities(&self) -> Value {
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": self.config.chrome_args() }
                }
            }
        })
    }
}

#[async_trait(?Send)]
impl BrowserLauncher for WebDriverLauncher {
    type Session = WebDriverBrowser;

    async fn launch(&self) -> BrowserResult<WebDriverBrowser> {
        let base = self.config.webdriver_url.trim_end_matches('/');
        let response = self
            .http
            .post(format!("{}/session", base))
            .json(&self.capabilities())
            .send()
            .await?;

        let status = response.status();
        let payload: Value = response.json().await?;
        let value = payload.get("value").cloned().unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(map_error("new session", &value));
        }

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::protocol("new session", "invalid response", "missing sessionId"))?;

        info!("Started browser session {} via {}", session_id, base);
        Ok(WebDriverBrowser {
            connection: Rc::new(Connection {
                http: self.http.clone(),
                session_url: format!("{}/session/{}", base, session_id),
            }),
        })
    }
}

pub struct WebDriverBrowser {
    connection: Rc<Connection>,
}

impl WebDriverBrowser {
    fn element(&self, id: String) -> WebDriverElement {
        WebDriverElement {
            connection: Rc::clone(&self.connection),
            id,
        }
    }
}

#[async_trait(?Send)]
impl BrowserSession for WebDriverBrowser {
    type Element = WebDriverElement;

    async fn navigate(&self, url: &str) -> BrowserResult<()> {
        self.connection
            .command(Method::POST, "/url", Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    async fn current_url(&self) -> BrowserResult<String> {
        let value = self.connection.command(Method::GET, "/url", None).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| BrowserError::protocol("get current url", "invalid response", "expected a string"))
    }

    async fn query_all(&self, selector: &str) -> BrowserResult<Vec<WebDriverElement>> {
        let ids = self.connection.find_elements("", selector).await?;
        Ok(ids.into_iter().map(|id| self.element(id)).collect())
    }

    async fn query(&self, selector: &str) -> BrowserResult<Option<WebDriverElement>> {
        Ok(self.query_all(selector).await?.into_iter().next())
    }

    async fn switch_to_frame(&self, id: &str) -> BrowserResult<()> {
        let selector = format!("iframe[id='{0}'], frame[id='{0}'], iframe[name='{0}'], frame[name='{0}']", id);
        let frame = self
            .connection
            .find_elements("", &selector)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| BrowserError::NoSuchFrame { id: id.to_string() })?;

        self.connection
            .command(Method::POST, "/frame", Some(json!({ "id": { ELEMENT_KEY: frame } })))
            .await?;
        Ok(())
    }

    async fn switch_to_default_content(&self) -> BrowserResult<()> {
        self.connection
            .command(Method::POST, "/frame", Some(json!({ "id": Value::Null })))
            .await?;
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> BrowserResult<()> {
        let value = self.connection.command(Method::GET, "/screenshot", None).await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| BrowserError::protocol("take screenshot", "invalid response", "expected base64 data"))?;
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| BrowserError::protocol("take screenshot", "invalid response", &e.to_string()))?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| BrowserError::io(&e))?;
        }
        tokio::fs::write(path, bytes).await.map_err(|e| BrowserError::io(&e))?;
        info!("Saved screenshot to {}", path.display());
        Ok(())
    }

    async fn quit(&self) -> BrowserResult<()> {
        match self.connection.command(Method::DELETE, "", None).await {
            Ok(_) => {
                debug!("Browser session closed");
                Ok(())
            }
            Err(e) => {
                warn!("Failed to close browser session: {}", e);
                Err(e)
            }
        }
    }
}

pub struct WebDriverElement {
    connection: Rc<Connection>,
    id: String,
}

impl WebDriverElement {
    fn path(&self, suffix: &str) -> String {
        format!("/element/{}{}", self.id, suffix)
    }
}

#[async_trait(?Send)]
impl PageElement for WebDriverElement {
    async fn text(&self) -> BrowserResult<String> {
        let value = self.connection.command(Method::GET, &self.path("/text"), None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn attribute(&self, name: &str) -> BrowserResult<Option<String>> {
        let value = self
            .connection
            .command(Method::GET, &self.path(&format!("/attribute/{}", name)), None)
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn find(&self, selector: &str) -> BrowserResult<Option<Self>> {
        Ok(self.find_all(selector).await?.into_iter().next())
    }

    async fn find_all(&self, selector: &str) -> BrowserResult<Vec<Self>> {
        let ids = self.connection.find_elements(&self.path(""), selector).await?;
        Ok(ids
            .into_iter()
            .map(|id| Self {
                connection: Rc::clone(&self.connection),
                id,
            })
            .collect())
    }

    async fn click(&self) -> BrowserResult<()> {
        self.connection
            .command(Method::POST, &self.path("/click"), Some(json!({})))
            .await?;
        Ok(())
    }

    async fn send_keys(&self, text: &str) -> BrowserResult<()> {
        self.connection
            .command(Method::POST, &self.path("/value"), Some(json!({ "text": text })))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    const SESSION: &str = "abc123";

    fn config(server: &MockServer) -> BrowserConfig {
        BrowserConfig {
            webdriver_url: server.base_url(),
            ..BrowserConfig::default()
        }
    }

    async fn start_session(server: &MockServer) -> WebDriverBrowser {
        server
            .mock_async(|when, then| {
                when.method(POST).path("/session");
                then.status(200)
                    .json_body(json!({ "value": { "sessionId": SESSION, "capabilities": {} } }));
            })
            .await;

        WebDriverLauncher::new(config(server)).unwrap().launch().await.unwrap()
    }

    #[tokio::test]
    async fn test_launch_sends_chrome_args() {
        let server = MockServer::start_async().await;
        let new_session = server
            .mock_async(|when, then| {
                when.method(POST).path("/session").json_body(json!({
                    "capabilities": {
                        "alwaysMatch": {
                            "browserName": "chrome",
                            "goog:chromeOptions": { "args": ["--headless", "--disable-gpu"] }
                        }
                    }
                }));
                then.status(200)
                    .json_body(json!({ "value": { "sessionId": SESSION, "capabilities": {} } }));
            })
            .await;

        WebDriverLauncher::new(config(&server)).unwrap().launch().await.unwrap();
        new_session.assert_async().await;
    }

    #[tokio::test]
    async fn test_query_and_read_element() {
        let server = MockServer::start_async().await;
        let browser = start_session(&server).await;

        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(format!("/session/{SESSION}/elements"))
                    .json_body(json!({ "using": "css selector", "value": "tbody tr" }));
                then.status(200)
                    .json_body(json!({ "value": [ { ELEMENT_KEY: "e1" }, { ELEMENT_KEY: "e2" } ] }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(format!("/session/{SESSION}/element/e2/text"));
                then.status(200).json_body(json!({ "value": " Istanbul " }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path(format!("/session/{SESSION}/element/e1/attribute/href"));
                then.status(200).json_body(json!({ "value": null }));
            })
            .await;

        let rows = browser.query_all("tbody tr").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].text().await.unwrap(), " Istanbul ");
        assert_eq!(rows[0].attribute("href").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_protocol_errors_are_mapped() {
        let server = MockServer::start_async().await;
        let browser = start_session(&server).await;

        server
            .mock_async(|when, then| {
                when.method(GET).path(format!("/session/{SESSION}/element/gone/text"));
                then.status(404).json_body(json!({
                    "value": { "error": "stale element reference", "message": "element is not attached" }
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(format!("/session/{SESSION}/url"));
                then.status(500).json_body(json!({
                    "value": { "error": "unknown error", "message": "net::ERR_NAME_NOT_RESOLVED" }
                }));
            })
            .await;

        let stale = WebDriverElement {
            connection: Rc::clone(&browser.connection),
            id: "gone".to_string(),
        };
        assert!(matches!(stale.text().await, Err(BrowserError::StaleElement { .. })));
        assert!(matches!(
            browser.navigate("https://nowhere.invalid").await,
            Err(BrowserError::Protocol { .. })
        ));
    }

    #[tokio::test]
    async fn test_switch_to_frame_uses_element_reference() {
        let server = MockServer::start_async().await;
        let browser = start_session(&server).await;

        server
            .mock_async(|when, then| {
                when.method(POST).path(format!("/session/{SESSION}/elements"));
                then.status(200).json_body(json!({ "value": [ { ELEMENT_KEY: "frame-1" } ] }));
            })
            .await;
        let switch = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(format!("/session/{SESSION}/frame"))
                    .json_body(json!({ "id": { ELEMENT_KEY: "frame-1" } }));
                then.status(200).json_body(json!({ "value": null }));
            })
            .await;

        browser.switch_to_frame("contentFrame").await.unwrap();
        switch.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_frame_is_no_such_frame() {
        let server = MockServer::start_async().await;
        let browser = start_session(&server).await;

        server
            .mock_async(|when, then| {
                when.method(POST).path(format!("/session/{SESSION}/elements"));
                then.status(200).json_body(json!({ "value": [] }));
            })
            .await;

        assert!(matches!(
            browser.switch_to_frame("contentFrame").await,
            Err(BrowserError::NoSuchFrame { .. })
        ));
    }

    #[tokio::test]
    async fn test_screenshot_is_decoded_to_file() {
        let server = MockServer::start_async().await;
        let browser = start_session(&server).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shots").join("login_failed_USER1.png");

        server
            .mock_async(|when, then| {
                when.method(GET).path(format!("/session/{SESSION}/screenshot"));
                then.status(200).json_body(json!({ "value": STANDARD.encode(b"png-bytes") }));
            })
            .await;

        browser.screenshot(&path).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"png-bytes");
    }

    #[tokio::test]
    async fn test_quit_deletes_session() {
        let server = MockServer::start_async().await;
        let browser = start_session(&server).await;

        let delete = server
            .mock_async(|when, then| {
                when.method(DELETE).path(format!("/session/{SESSION}"));
                then.status(200).json_body(json!({ "value": null }));
            })
            .await;

        browser.quit().await.unwrap();
        delete.assert_async().await;
    }
}
