//! The browsing-session capability the solver drives.
//!
//! Implemented by whatever web-automation driver hosts the challenge page.

use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;

/// How to locate an element on the page.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum Selector {
    Css(String),
    Id(String),
    #[serde(rename = "xpath")]
    XPath(String),
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Css(s) => write!(f, "css={}", s),
            Selector::Id(s) => write!(f, "id={}", s),
            Selector::XPath(s) => write!(f, "xpath={}", s),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// The element vanished or never matched. Expected during solving.
    #[error("element not found: {0}")]
    NotFound(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// Anything else the driver reports.
    #[error("browser driver error: {0}")]
    Driver(String),
}

impl SessionError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SessionError::NotFound(_))
    }
}

/// Operations the solver needs from a live browsing session.
pub trait BrowserSession {
    type Element;

    /// Waits up to `wait` for `selector` to match.
    ///
    /// `Ok(None)` is the ordinary "no such element" outcome; `Err` is reserved
    /// for driver faults.
    fn find_element(
        &mut self,
        selector: &Selector,
        wait: Duration,
    ) -> Result<Option<Self::Element>, SessionError>;

    /// Renders the element to an image.
    fn screenshot(&mut self, element: &Self::Element) -> Result<RgbImage, SessionError>;

    fn click(&mut self, element: &Self::Element) -> Result<(), SessionError>;

    fn clear(&mut self, element: &Self::Element) -> Result<(), SessionError>;

    fn type_text(&mut self, element: &Self::Element, text: &str) -> Result<(), SessionError>;

    /// Evaluates a script in the page and returns its JSON result.
    fn evaluate(&mut self, script: &str) -> Result<serde_json::Value, SessionError>;
}

const READY_STATE_SCRIPT: &str = "return document.readyState";

/// Polls `document.readyState` until the page reports `complete`.
pub fn wait_for_page_ready<S: BrowserSession + ?Sized>(
    session: &mut S,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<(), SessionError> {
    let start = Instant::now();

    loop {
        let state = session.evaluate(READY_STATE_SCRIPT)?;
        if state.as_str() == Some("complete") {
            return Ok(());
        }

        if start.elapsed() >= timeout {
            return Err(SessionError::Timeout(timeout));
        }

        tracing::debug!(ready_state = %state, "page not ready yet");
        std::thread::sleep(poll_interval);
    }
}
