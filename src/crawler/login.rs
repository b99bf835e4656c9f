use anyhow::{Context, Result};
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::browser::{BehaviorSimulator, PageDriver};
use crate::cli::config::ScrapeSettings;
use crate::crawler::request::Credentials;

/// Why the site did not let us in. Fatal for the task.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoginError {
    #[error("Login failed: the site rejected the supplied credentials")]
    InvalidCredentials,

    #[error("Login failed: the site requires additional verification")]
    VerificationRequired,

    #[error("Login failed: no sign of success within {0:?}")]
    Inconclusive(Duration),
}

/// Open the login page, enter credentials and wait for the verdict
pub async fn log_in(
    driver: &dyn PageDriver,
    behavior: &BehaviorSimulator,
    settings: &ScrapeSettings,
    credentials: &Credentials,
) -> Result<()> {
    let selectors = &settings.selectors;

    driver.navigate(&settings.login_url).await
        .context("Failed to open login page")?;
    behavior
        .clear_overlays(
            driver,
            &selectors.consent_buttons,
            &selectors.overlays,
            Duration::from_millis(settings.consent_timeout_ms),
        )
        .await;

    behavior.type_text(driver, &selectors.username_input, &credentials.email).await
        .context("Failed to enter username")?;
    behavior.type_text(driver, &selectors.password_input, &credentials.password).await
        .context("Failed to enter password")?;
    driver.click(&selectors.submit_button).await
        .context("Failed to submit login form")?;

    await_verdict(driver, settings).await?;
    Ok(())
}

/// Poll until a success, challenge or error marker appears, or the timeout runs out
pub async fn await_verdict(driver: &dyn PageDriver, settings: &ScrapeSettings) -> Result<(), LoginError> {
    let selectors = &settings.selectors;
    let timeout = Duration::from_secs(settings.login_timeout_secs);
    let poll = Duration::from_millis(settings.login_poll_interval_ms.max(1));
    let deadline = Instant::now() + timeout;

    loop {
        if visible_now(driver, &selectors.login_success).await {
            return Ok(());
        }
        if visible_now(driver, &selectors.login_challenge).await {
            return Err(LoginError::VerificationRequired);
        }
        if visible_now(driver, &selectors.login_error).await {
            return Err(LoginError::InvalidCredentials);
        }
        if Instant::now() >= deadline {
            break;
        }
        sleep(poll).await;
    }

    if visible_now(driver, &selectors.password_input).await {
        Err(LoginError::InvalidCredentials)
    } else {
        Err(LoginError::Inconclusive(timeout))
    }
}

async fn visible_now(driver: &dyn PageDriver, selector: &str) -> bool {
    match driver.is_visible(selector, Duration::ZERO).await {
        Ok(visible) => visible,
        Err(e) => {
            debug!("Visibility check for {} failed: {}", selector, e);
            false
        }
    }
}
