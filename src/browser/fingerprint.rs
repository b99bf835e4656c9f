use anyhow::Result;
use rand::{thread_rng, Rng};
use tracing::debug;

use crate::cli::config::BrowserFingerprint;

/// Chrome flags that hide the usual automation signals
const STEALTH_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-dev-shm-usage",
    "--disable-infobars",
    "--no-first-run",
];

/// Picks the browser identity a session presents
pub struct FingerprintManager {
    /// Available fingerprints to use
    fingerprints: Vec<BrowserFingerprint>,
}

impl FingerprintManager {
    pub fn new(fingerprints: Vec<BrowserFingerprint>) -> Self {
        Self { fingerprints }
    }

    /// Select a random fingerprint
    pub fn random_fingerprint(&self) -> Result<&BrowserFingerprint> {
        if self.fingerprints.is_empty() {
            anyhow::bail!("No fingerprints available");
        }

        let fingerprint = &self.fingerprints[thread_rng().gen_range(0..self.fingerprints.len())];
        debug!("Selected fingerprint: {}", fingerprint.name);
        Ok(fingerprint)
    }
}

/// Command-line arguments presenting `fingerprint` to the target site
pub fn chrome_args(fingerprint: &BrowserFingerprint) -> Vec<String> {
    let language = fingerprint.accept_language
        .split(',')
        .next()
        .unwrap_or("en-US");

    let mut args = vec![
        format!("--user-agent={}", fingerprint.user_agent),
        format!("--lang={}", language),
        format!("--window-size={},{}", fingerprint.viewport.width, fingerprint.viewport.height),
    ];
    args.extend(STEALTH_ARGS.iter().map(|a| a.to_string()));
    args
}
