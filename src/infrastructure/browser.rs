//! Browser automation capability
//!
//! The crawl only ever talks to the portal through these traits. Launching
//! and configuring the real browser lives in the adapters
//! ([`crate::infrastructure::webdriver_client`]); tests drive the same code
//! through [`crate::test_utils::FakeBrowser`].
//!
//! Everything here is `?Send`: sessions run one at a time on a
//! current-thread runtime and nothing is spawned.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Error, Debug, Clone)]
pub enum BrowserError {
    #[error("No such element: {selector}")]
    NoSuchElement { selector: String },

    #[error("No such frame: {id}")]
    NoSuchFrame { id: String },

    #[error("Stale element reference: {reason}")]
    StaleElement { reason: String },

    #[error("WebDriver command '{command}' failed: {error} - {message}")]
    Protocol {
        command: String,
        error: String,
        message: String,
    },

    #[error("HTTP transport failed: {message}")]
    Transport { message: String },

    #[error("Timed out after {timeout_ms}ms waiting for {condition}")]
    Timeout { condition: String, timeout_ms: u64 },

    #[error("I/O error: {message}")]
    Io { message: String },
}

impl BrowserError {
    pub fn protocol(command: &str, error: &str, message: &str) -> Self {
        Self::Protocol {
            command: command.to_string(),
            error: error.to_string(),
            message: message.to_string(),
        }
    }

    pub fn io(err: &std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for BrowserError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport {
            message: err.to_string(),
        }
    }
}

pub type BrowserResult<T> = Result<T, BrowserError>;

/// Handle to one element of the current page
#[async_trait(?Send)]
pub trait PageElement: Sized {
    /// Visible text, untrimmed
    async fn text(&self) -> BrowserResult<String>;

    /// Attribute value, `None` when the attribute is not set
    async fn attribute(&self, name: &str) -> BrowserResult<Option<String>>;

    /// First descendant matching `selector`
    async fn find(&self, selector: &str) -> BrowserResult<Option<Self>>;

    /// All descendants matching `selector`, in document order
    async fn find_all(&self, selector: &str) -> BrowserResult<Vec<Self>>;

    async fn click(&self) -> BrowserResult<()>;

    async fn send_keys(&self, text: &str) -> BrowserResult<()>;
}

/// One authenticated, exclusive browser session
#[async_trait(?Send)]
pub trait BrowserSession {
    type Element: PageElement;

    async fn navigate(&self, url: &str) -> BrowserResult<()>;

    async fn current_url(&self) -> BrowserResult<String>;

    async fn query_all(&self, selector: &str) -> BrowserResult<Vec<Self::Element>>;

    async fn query(&self, selector: &str) -> BrowserResult<Option<Self::Element>>;

    /// Switch the browsing context into the frame with this id (or name)
    async fn switch_to_frame(&self, id: &str) -> BrowserResult<()>;

    async fn switch_to_default_content(&self) -> BrowserResult<()>;

    async fn screenshot(&self, path: &Path) -> BrowserResult<()>;

    /// Release the session. Called exactly once per session on every exit path.
    async fn quit(&self) -> BrowserResult<()>;
}

/// Creates a fresh browser session for each credential run
#[async_trait(?Send)]
pub trait BrowserLauncher {
    type Session: BrowserSession;

    async fn launch(&self) -> BrowserResult<Self::Session>;
}

/// Poll-until-predicate with a bounded wait.
///
/// Errors from the probe count as "not yet" so that transient lookups during
/// page transitions do not abort the wait; the last one is logged on timeout.
pub async fn wait_until<F, Fut>(
    condition: &str,
    timeout: Duration,
    poll_interval: Duration,
    mut probe: F,
) -> BrowserResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = BrowserResult<bool>>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    let mut last_error = None;

    loop {
        match probe().await {
            Ok(true) => {
                trace!("Condition met: {}", condition);
                return Ok(());
            }
            Ok(false) => {}
            Err(e) => last_error = Some(e),
        }

        if tokio::time::Instant::now() >= deadline {
            if let Some(e) = last_error {
                debug!("Last probe error while waiting for {}: {}", condition, e);
            }
            return Err(BrowserError::Timeout {
                condition: condition.to_string(),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            });
        }

        tokio::time::sleep(poll_interval).await;
    }
}
