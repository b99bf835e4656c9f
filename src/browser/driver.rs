use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thirtyfour::error::WebDriverError;
use thiserror::Error;

/// Failures of a single browser primitive
#[derive(Debug, Error)]
pub enum DriverError {
    /// The awaited element never showed up
    #[error("timed out after {timeout:?} waiting for `{selector}`")]
    Timeout { selector: String, timeout: Duration },

    #[error("browser session is closed")]
    Closed,

    #[error("unexpected script result: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    WebDriver(#[from] WebDriverError),

    #[error("{0}")]
    Other(String),
}

impl DriverError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, DriverError::Timeout { .. })
    }
}

/// Low-level interaction with one open page.
/// No primitive retries; retry policy belongs to the caller.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Load `url` and wait for the document to be ready
    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    /// Send `text` to the first element matching `selector`
    async fn send_keys(&self, selector: &str, text: &str) -> Result<(), DriverError>;

    async fn click(&self, selector: &str) -> Result<(), DriverError>;

    /// Whether a matching element is displayed within `timeout`
    async fn is_visible(&self, selector: &str, timeout: Duration) -> Result<bool, DriverError>;

    /// Run a synchronous script and return its value
    async fn evaluate(&self, script: &str) -> Result<Value, DriverError>;

    /// Run a script that signals completion through its trailing callback argument
    async fn evaluate_async(&self, script: &str) -> Result<Value, DriverError>;

    /// Wait until an element matches `selector`, failing with [`DriverError::Timeout`]
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<(), DriverError>;

    /// Map every element matching `selector` through the JS arrow function `mapping`
    async fn extract_all(&self, selector: &str, mapping: &str) -> Result<Vec<Value>, DriverError>;

    /// Release the session. Safe to call more than once.
    async fn close(&mut self) -> Result<(), DriverError>;
}

/// Opens one independent browser session per task
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> anyhow::Result<Box<dyn PageDriver>>;
}

/// Quote a string as a JavaScript string literal
pub fn js_string(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

/// Script returning `mapping` applied to every element matching `selector`
pub fn extract_script(selector: &str, mapping: &str) -> String {
    format!(
        "return Array.from(document.querySelectorAll({})).map({});",
        js_string(selector),
        mapping
    )
}
