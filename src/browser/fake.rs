//! Scripted in-memory page used by tests in place of a real browser.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::browser::driver::{DriverError, PageDriver, SessionFactory};

/// What a listing URL does when visited
#[derive(Debug, Clone)]
pub enum Listing {
    Links(Vec<Value>),
    Timeout,
    NavigationError(String),
}

#[derive(Debug, Default, Clone)]
pub struct FakeState {
    pub visible: HashSet<String>,
    pub listings: HashMap<String, Listing>,
    pub failing_scripts: bool,
    pub failing_close: bool,
    pub current_url: Option<String>,
    pub navigations: Vec<String>,
    pub typed: Vec<(String, String)>,
    pub clicks: Vec<String>,
    pub scripts: Vec<String>,
    pub async_scripts: Vec<String>,
    pub close_calls: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FakePage {
    state: Arc<Mutex<FakeState>>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visible<I, S>(self, selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().visible.extend(selectors.into_iter().map(Into::into));
        self
    }

    /// Serve `links` as `(href, name)` anchors at `url`
    pub fn listing(self, url: &str, links: &[(&str, &str)]) -> Self {
        let links = links.iter().map(|(href, name)| json!({ "href": href, "name": name })).collect();
        self.lock().listings.insert(url.to_string(), Listing::Links(links));
        self
    }

    pub fn listing_timeout(self, url: &str) -> Self {
        self.lock().listings.insert(url.to_string(), Listing::Timeout);
        self
    }

    pub fn listing_error(self, url: &str, message: &str) -> Self {
        self.lock().listings.insert(url.to_string(), Listing::NavigationError(message.to_string()));
        self
    }

    pub fn failing_scripts(self) -> Self {
        self.lock().failing_scripts = true;
        self
    }

    pub fn failing_close(self) -> Self {
        self.lock().failing_close = true;
        self
    }

    pub fn state(&self) -> FakeState {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    fn current_listing(&self) -> Option<Listing> {
        let state = self.lock();
        state.current_url.as_ref().and_then(|url| state.listings.get(url).cloned())
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        let mut state = self.lock();
        state.navigations.push(url.to_string());
        state.current_url = Some(url.to_string());
        match state.listings.get(url) {
            Some(Listing::NavigationError(message)) => Err(DriverError::Other(message.clone())),
            _ => Ok(()),
        }
    }

    async fn send_keys(&self, selector: &str, text: &str) -> Result<(), DriverError> {
        self.lock().typed.push((selector.to_string(), text.to_string()));
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), DriverError> {
        self.lock().clicks.push(selector.to_string());
        Ok(())
    }

    async fn is_visible(&self, selector: &str, _timeout: Duration) -> Result<bool, DriverError> {
        Ok(self.lock().visible.contains(selector))
    }

    async fn evaluate(&self, script: &str) -> Result<Value, DriverError> {
        let mut state = self.lock();
        state.scripts.push(script.to_string());
        if state.failing_scripts {
            return Err(DriverError::Other("script failed".to_string()));
        }
        Ok(Value::Null)
    }

    async fn evaluate_async(&self, script: &str) -> Result<Value, DriverError> {
        let mut state = self.lock();
        state.async_scripts.push(script.to_string());
        if state.failing_scripts {
            return Err(DriverError::Other("script failed".to_string()));
        }
        Ok(Value::Null)
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<(), DriverError> {
        match self.current_listing() {
            Some(Listing::Links(_)) => Ok(()),
            _ => Err(DriverError::Timeout { selector: selector.to_string(), timeout }),
        }
    }

    async fn extract_all(&self, _selector: &str, _mapping: &str) -> Result<Vec<Value>, DriverError> {
        match self.current_listing() {
            Some(Listing::Links(links)) => Ok(links),
            _ => Ok(Vec::new()),
        }
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        let mut state = self.lock();
        state.close_calls += 1;
        if state.failing_close {
            return Err(DriverError::Other("browser refused to quit".to_string()));
        }
        Ok(())
    }
}

/// Hands out clones of one shared [`FakePage`], or fails to launch
#[derive(Debug, Clone, Default)]
pub struct FakeFactory {
    pub page: FakePage,
    pub launch_error: Option<String>,
}

impl FakeFactory {
    pub fn new(page: FakePage) -> Self {
        Self { page, launch_error: None }
    }

    pub fn failing(message: &str) -> Self {
        Self { page: FakePage::new(), launch_error: Some(message.to_string()) }
    }
}

#[async_trait]
impl SessionFactory for FakeFactory {
    async fn open(&self) -> anyhow::Result<Box<dyn PageDriver>> {
        if let Some(message) = &self.launch_error {
            anyhow::bail!("{}", message);
        }
        Ok(Box::new(self.page.clone()))
    }
}
