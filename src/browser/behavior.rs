use rand::{thread_rng, Rng};
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use crate::browser::driver::{js_string, DriverError, PageDriver};
use crate::cli::config::PacingSettings;

/// Human-like pacing layered over the raw driver primitives
#[derive(Debug, Clone)]
pub struct BehaviorSimulator {
    /// Configuration for behavior simulation
    config: PacingSettings,
}

impl BehaviorSimulator {
    pub fn new(config: PacingSettings) -> Self {
        Self { config }
    }

    /// Random duration in the inclusive millisecond range
    fn jitter((min, max): (u64, u64)) -> Duration {
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
        Duration::from_millis(thread_rng().gen_range(lo..=hi))
    }

    /// Sleep for a random interval in the given range
    pub async fn pause(&self, range: (u64, u64)) {
        let pause = Self::jitter(range);
        if !pause.is_zero() {
            sleep(pause).await;
        }
    }

    /// Settle time after a listing page loads
    pub async fn pause_after_navigation(&self) {
        self.pause(self.config.after_navigation_ms).await;
    }

    /// Cool-down between two (company, keyword) pairs
    pub async fn pause_between_pairs(&self) {
        self.pause(self.config.between_pairs_ms).await;
    }

    /// Type character by character with a random delay between keystrokes
    pub async fn type_text(&self, driver: &dyn PageDriver, selector: &str, text: &str) -> Result<(), DriverError> {
        let mut buf = [0u8; 4];
        for c in text.chars() {
            driver.send_keys(selector, c.encode_utf8(&mut buf)).await?;
            self.pause(self.config.typing_delay_ms).await;
        }

        debug!("Typed {} characters into {}", text.chars().count(), selector);
        Ok(())
    }

    /// Best effort: click visible consent buttons and strip overlay elements.
    /// Every failure is swallowed.
    pub async fn clear_overlays(
        &self,
        driver: &dyn PageDriver,
        consent_buttons: &[String],
        overlays: &[String],
        consent_timeout: Duration,
    ) {
        for selector in consent_buttons {
            match driver.is_visible(selector, consent_timeout).await {
                Ok(true) => {
                    if driver.click(selector).await.is_ok() {
                        debug!("Clicked consent selector: {}", selector);
                    }
                }
                Ok(false) => {}
                Err(e) => debug!("Consent selector {} not usable: {}", selector, e),
            }
        }

        for selector in overlays {
            let script = format!(
                "document.querySelectorAll({}).forEach(e => e.remove());",
                js_string(selector)
            );
            if let Err(e) = driver.evaluate(&script).await {
                debug!("Failed to remove overlay {}: {}", selector, e);
            }
        }
    }

    /// Scroll in fixed steps until the accumulated distance reaches the document height,
    /// so lazily loaded entries render
    pub async fn full_page_scroll(&self, driver: &dyn PageDriver) -> Result<(), DriverError> {
        driver.evaluate_async(&self.scroll_script()).await?;
        debug!("Scrolled to the bottom of the page");
        Ok(())
    }

    fn scroll_script(&self) -> String {
        format!(
            r#"const done = arguments[arguments.length - 1];
let total = 0;
const step = {step};
const timer = setInterval(() => {{
    window.scrollBy(0, step);
    total += step;
    if (total >= document.body.scrollHeight) {{
        clearInterval(timer);
        done(total);
    }}
}}, {interval});"#,
            step = self.config.scroll_step_px.max(1),
            interval = self.config.scroll_interval_ms,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::FakePage;

    fn instant() -> BehaviorSimulator {
        BehaviorSimulator::new(PacingSettings {
            typing_delay_ms: (0, 0),
            after_navigation_ms: (0, 0),
            between_pairs_ms: (0, 0),
            scroll_step_px: 100,
            scroll_interval_ms: 100,
        })
    }

    #[test]
    fn jitter_stays_in_range() {
        for _ in 0..100 {
            let d = BehaviorSimulator::jitter((50, 200));
            assert!(d >= Duration::from_millis(50) && d <= Duration::from_millis(200));
        }
        assert_eq!(BehaviorSimulator::jitter((0, 0)), Duration::ZERO);
        let swapped = BehaviorSimulator::jitter((30, 10));
        assert!(swapped >= Duration::from_millis(10) && swapped <= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn typing_sends_one_key_at_a_time() {
        let page = FakePage::new();
        instant().type_text(&page, "#user", "añb").await.unwrap();
        assert_eq!(page.state().typed, vec![
            ("#user".to_string(), "a".to_string()),
            ("#user".to_string(), "ñ".to_string()),
            ("#user".to_string(), "b".to_string()),
        ]);
    }

    #[tokio::test]
    async fn overlays_clicks_visible_consent_and_removes_overlays() {
        let page = FakePage::new().visible(["button.accept"]);
        instant()
            .clear_overlays(
                &page,
                &["button.accept".to_string(), "button.missing".to_string()],
                &[".cookie-popup".to_string()],
                Duration::ZERO,
            )
            .await;

        let state = page.state();
        assert_eq!(state.clicks, ["button.accept"]);
        assert!(state.scripts.iter().any(|s| s.contains(".cookie-popup") && s.contains("remove()")));
    }

    #[tokio::test]
    async fn overlay_failures_are_swallowed() {
        let page = FakePage::new().failing_scripts();
        instant()
            .clear_overlays(&page, &["button.accept".to_string()], &[".x".to_string()], Duration::ZERO)
            .await;
        assert!(page.state().clicks.is_empty());
    }

    #[tokio::test]
    async fn full_scroll_runs_an_async_script() {
        let page = FakePage::new();
        instant().full_page_scroll(&page).await.unwrap();
        let state = page.state();
        assert_eq!(state.async_scripts.len(), 1);
        assert!(state.async_scripts[0].contains("document.body.scrollHeight"));
    }
}
