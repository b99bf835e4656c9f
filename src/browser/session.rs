use anyhow::{Result, Context};
use async_trait::async_trait;
use serde_json::Value;
use thirtyfour::prelude::*;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::browser::driver::{extract_script, DriverError, PageDriver, SessionFactory};
use crate::browser::fingerprint::{chrome_args, FingerprintManager};
use crate::cli::config::BrowserSettings;

/// Poll interval for element queries
const QUERY_POLL: Duration = Duration::from_millis(250);

/// Upper bound for scripts that call back asynchronously (full-page scrolling)
const SCRIPT_TIMEOUT: Duration = Duration::from_secs(120);

/// One Chrome session driven over WebDriver: a single window, a single page
pub struct BrowserSession {
    /// WebDriver instance, `None` once closed
    driver: Option<WebDriver>,
}

impl BrowserSession {
    /// Start a browser with a random fingerprint and automation signals disabled
    pub async fn launch(config: &BrowserSettings) -> Result<Self> {
        let fingerprint_manager = FingerprintManager::new(config.fingerprints.clone());
        let fingerprint = fingerprint_manager.random_fingerprint()?;

        let mut caps = DesiredCapabilities::chrome();
        for arg in chrome_args(fingerprint) {
            caps.add_chrome_arg(&arg)?;
        }

        if config.headless {
            caps.set_headless()?;
        }

        caps.add_chrome_option("excludeSwitches", vec!["enable-automation"])?;
        caps.add_chrome_option("useAutomationExtension", false)?;

        let driver = WebDriver::new(&config.webdriver_url, caps).await
            .context("Failed to connect to WebDriver")?;

        driver.set_page_load_timeout(Duration::from_secs(config.page_load_timeout_secs)).await?;
        driver.set_script_timeout(SCRIPT_TIMEOUT).await?;

        debug!("Browser session initialized with fingerprint: {}", fingerprint.name);

        Ok(Self { driver: Some(driver) })
    }

    fn driver(&self) -> Result<&WebDriver, DriverError> {
        self.driver.as_ref().ok_or(DriverError::Closed)
    }
}

#[async_trait]
impl PageDriver for BrowserSession {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        debug!("Navigating to: {}", url);
        self.driver()?.goto(url).await?;
        Ok(())
    }

    async fn send_keys(&self, selector: &str, text: &str) -> Result<(), DriverError> {
        let element = self.driver()?.find(By::Css(selector)).await?;
        element.send_keys(text).await?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), DriverError> {
        let element = self.driver()?.find(By::Css(selector)).await?;
        element.click().await?;
        Ok(())
    }

    async fn is_visible(&self, selector: &str, timeout: Duration) -> Result<bool, DriverError> {
        let visible = self.driver()?
            .query(By::Css(selector))
            .wait(timeout, QUERY_POLL)
            .and_displayed()
            .exists()
            .await?;
        Ok(visible)
    }

    async fn evaluate(&self, script: &str) -> Result<Value, DriverError> {
        let ret = self.driver()?.execute(script, Vec::new()).await?;
        Ok(ret.json().clone())
    }

    async fn evaluate_async(&self, script: &str) -> Result<Value, DriverError> {
        let ret = self.driver()?.execute_async(script, Vec::new()).await?;
        Ok(ret.json().clone())
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<(), DriverError> {
        let found = self.driver()?
            .query(By::Css(selector))
            .wait(timeout, QUERY_POLL)
            .first()
            .await;

        match found {
            Ok(_) => Ok(()),
            Err(e) if matches!(e, WebDriverError::NoSuchElement(..)) => Err(DriverError::Timeout {
                selector: selector.to_string(),
                timeout,
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn extract_all(&self, selector: &str, mapping: &str) -> Result<Vec<Value>, DriverError> {
        match self.evaluate(&extract_script(selector, mapping)).await? {
            Value::Array(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            other => Err(DriverError::Other(format!("expected an array from extraction, got {}", other))),
        }
    }

    /// Close the page, then end the WebDriver session
    async fn close(&mut self) -> Result<(), DriverError> {
        let Some(driver) = self.driver.take() else {
            return Ok(());
        };

        if let Err(e) = driver.close_window().await {
            warn!("Error closing browser window: {}", e);
        }
        driver.quit().await?;
        debug!("Browser session closed");
        Ok(())
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    if let Err(e) = driver.quit().await {
                        error!("Error closing browser session during drop: {}", e);
                    }
                });
            }
        }
    }
}

/// Opens a fresh [`BrowserSession`] per task
pub struct WebDriverSessionFactory {
    config: BrowserSettings,
}

impl WebDriverSessionFactory {
    pub fn new(config: BrowserSettings) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionFactory for WebDriverSessionFactory {
    async fn open(&self) -> Result<Box<dyn PageDriver>> {
        let session = BrowserSession::launch(&self.config).await?;
        Ok(Box::new(session))
    }
}
