use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::browser::{BehaviorSimulator, DriverError, PageDriver, SessionFactory};
use crate::cli::config::ScrapeSettings;
use crate::crawler::classifier::{ClassifierHandle, NameClassifier};
use crate::crawler::login;
use crate::crawler::registry::{TaskRegistry, TaskUpdate};
use crate::crawler::request::ScrapeRequest;
use crate::crawler::stats::Statistics;
use crate::crawler::task::{generate_task_id, ProfileMatch, TaskStatus};
use crate::storage::ResultStore;

/// Maps each matched anchor to `{href, name}`: link without query, first line of the text
const PROFILE_LINK_MAPPING: &str =
    r#"e => ({ href: (e.href || "").split("?")[0], name: (e.textContent || "").trim().split("\n")[0] })"#;

/// Step counter behind the progress percentage. Login counts as one step.
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    total: usize,
    done: usize,
}

impl Progress {
    pub fn new(total: usize) -> Self {
        Self { total: total.max(1), done: 0 }
    }

    pub fn advance(&mut self) {
        self.done = (self.done + 1).min(self.total);
    }

    pub fn done(&self) -> usize {
        self.done
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn percent(&self) -> u8 {
        (self.done * 100 / self.total) as u8
    }
}

/// How one (company, keyword) pair ended short of success
enum PairError {
    /// Results never appeared
    NoResults,
    Failed(anyhow::Error),
}

impl From<DriverError> for PairError {
    fn from(e: DriverError) -> Self {
        if e.is_timeout() {
            PairError::NoResults
        } else {
            PairError::Failed(e.into())
        }
    }
}

impl From<anyhow::Error> for PairError {
    fn from(e: anyhow::Error) -> Self {
        PairError::Failed(e)
    }
}

#[derive(Debug, Deserialize)]
struct ExtractedLink {
    href: Option<String>,
    name: Option<String>,
}

/// Drop the query string and fragment from a profile link
pub fn canonical_profile_link(href: &str) -> String {
    match url::Url::parse(href) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => href.split(['?', '#']).next().unwrap_or_default().to_string(),
    }
}

/// Turn raw extraction output into `(href, name)` pairs, discarding incomplete ones
fn clean_links(raw: Vec<Value>) -> Vec<(String, String)> {
    raw.into_iter()
        .filter_map(|value| serde_json::from_value::<ExtractedLink>(value).ok())
        .filter_map(|link| {
            let name = link.name?.trim().lines().next()?.trim().to_string();
            let href = canonical_profile_link(link.href?.trim());
            (!name.is_empty() && !href.is_empty()).then_some((href, name))
        })
        .collect()
}

/// Runs scrape tasks: login, then the company × keyword crawl, then statistics
#[derive(Clone)]
pub struct ScrapeController {
    registry: TaskRegistry,
    sessions: Arc<dyn SessionFactory>,
    classifier: ClassifierHandle,
    settings: Arc<ScrapeSettings>,
    behavior: BehaviorSimulator,
    output_dir: PathBuf,
}

impl ScrapeController {
    pub fn new(
        registry: TaskRegistry,
        sessions: Arc<dyn SessionFactory>,
        classifier: ClassifierHandle,
        settings: ScrapeSettings,
        output_dir: PathBuf,
    ) -> Self {
        let behavior = BehaviorSimulator::new(settings.pacing.clone());
        Self {
            registry,
            sessions,
            classifier,
            settings: Arc::new(settings),
            behavior,
            output_dir,
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Register a task and start it in the background. Returns immediately.
    pub async fn submit(&self, request: ScrapeRequest) -> String {
        let task_id = self.create_task().await;

        let controller = self.clone();
        let id = task_id.clone();
        tokio::spawn(async move { controller.supervise(id, request).await });

        task_id
    }

    /// Register a pending task without starting it
    pub async fn create_task(&self) -> String {
        let task_id = generate_task_id();
        let output = ResultStore::path_for(&self.output_dir, &task_id);
        self.registry.create(&task_id, output).await;
        info!("Created task {} ({} tracked)", task_id, self.registry.len().await);
        task_id
    }

    /// Run the task on its own worker and fail it if the worker dies
    async fn supervise(self, task_id: String, request: ScrapeRequest) {
        let worker = {
            let controller = self.clone();
            let task_id = task_id.clone();
            tokio::spawn(async move { controller.run(&task_id, &request).await })
        };

        match worker.await {
            Ok(status) => info!("Task {} finished: {}", task_id, status),
            Err(e) => {
                error!("Task {} aborted: {}", task_id, e);
                self.registry
                    .update(&task_id, TaskUpdate::status(TaskStatus::Failed).with_message(format!("Internal error: {}", e)))
                    .await;
            }
        }
    }

    /// Execute a registered task to its terminal state on the current task
    pub async fn run(&self, task_id: &str, request: &ScrapeRequest) -> TaskStatus {
        let store = ResultStore::new(ResultStore::path_for(&self.output_dir, task_id));
        self.registry
            .update(task_id, TaskUpdate::status(TaskStatus::Running).with_message("Starting LinkedIn scraper..."))
            .await;

        let mut progress = Progress::new(request.total_steps());
        let status = match self.scrape(task_id, request, &store, &mut progress).await {
            Ok(()) => {
                self.registry
                    .update(
                        task_id,
                        TaskUpdate::status(TaskStatus::Completed)
                            .with_message("Scraping completed successfully")
                            .with_progress(100),
                    )
                    .await;
                TaskStatus::Completed
            }
            Err(e) => {
                warn!("Task {} failed: {:#}", task_id, e);
                self.registry
                    .update(
                        task_id,
                        TaskUpdate::status(TaskStatus::Failed).with_message(format!("Scraping failed: {:#}", e)),
                    )
                    .await;
                TaskStatus::Failed
            }
        };

        self.publish_statistics(task_id, request, &store).await;
        status
    }

    /// Acquire the classifier and a browser, drive the crawl, always release the browser
    async fn scrape(
        &self,
        task_id: &str,
        request: &ScrapeRequest,
        store: &ResultStore,
        progress: &mut Progress,
    ) -> Result<()> {
        store.reset()?;
        let classifier = self.classifier.get().await?;
        let mut driver = self.sessions.open().await
            .context("Failed to launch browser")?;

        let outcome = self
            .drive(task_id, driver.as_ref(), classifier.as_ref(), request, store, progress)
            .await;

        if let Err(e) = driver.close().await {
            warn!("Failed to close browser session for task {}: {}", task_id, e);
            self.log(task_id, format!("Failed to close browser session: {}", e)).await;
        }

        outcome
    }

    async fn drive(
        &self,
        task_id: &str,
        driver: &dyn PageDriver,
        classifier: &dyn NameClassifier,
        request: &ScrapeRequest,
        store: &ResultStore,
        progress: &mut Progress,
    ) -> Result<()> {
        self.log_progress(task_id, "Logging in to LinkedIn...", progress).await;
        login::log_in(driver, &self.behavior, &self.settings, request.credentials()).await?;
        progress.advance();
        self.log_progress(task_id, "Login successful", progress).await;

        for company in request.companies() {
            for keyword in request.keywords() {
                let url = self.settings.people_url(company, keyword);
                self.log_progress(
                    task_id,
                    format!("Scraping company: {} with keyword: {}", company, keyword),
                    progress,
                )
                .await;

                match self.scrape_pair(task_id, driver, classifier, company, keyword, &url, store, progress).await {
                    Ok(saved) => debug!("Pair {}/{} saved {} profiles", company, keyword, saved),
                    Err(PairError::NoResults) => {
                        self.log_progress(
                            task_id,
                            format!("Timeout on {} - No profiles found or page structure changed", url),
                            progress,
                        )
                        .await;
                    }
                    Err(PairError::Failed(e)) => {
                        self.log_progress(task_id, format!("Error on {}: {:#}", url, e), progress).await;
                    }
                }

                progress.advance();
                self.registry.update(task_id, TaskUpdate::progress(progress.percent())).await;
                self.behavior.pause_between_pairs().await;
            }
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn scrape_pair(
        &self,
        task_id: &str,
        driver: &dyn PageDriver,
        classifier: &dyn NameClassifier,
        company: &str,
        keyword: &str,
        url: &str,
        store: &ResultStore,
        progress: &Progress,
    ) -> Result<usize, PairError> {
        let selectors = &self.settings.selectors;

        driver.navigate(url).await?;
        self.behavior.pause_after_navigation().await;
        self.behavior
            .clear_overlays(
                driver,
                &selectors.consent_buttons,
                &selectors.overlays,
                Duration::from_millis(self.settings.consent_timeout_ms),
            )
            .await;
        self.behavior.full_page_scroll(driver).await?;
        driver
            .wait_for_selector(&selectors.profile_links, Duration::from_secs(self.settings.results_timeout_secs))
            .await?;

        let links = clean_links(driver.extract_all(&selectors.profile_links, PROFILE_LINK_MAPPING).await?);
        self.log_progress(
            task_id,
            format!("Found {} profiles for {} with keyword '{}'", links.len(), company, keyword),
            progress,
        )
        .await;

        let matches: Vec<ProfileMatch> = links
            .into_iter()
            .filter(|(_, name)| classifier.is_person_name(name))
            .map(|(href, name)| ProfileMatch {
                name,
                href,
                company: company.to_string(),
                keyword: keyword.to_string(),
                url: url.to_string(),
            })
            .collect();

        if matches.is_empty() {
            return Ok(0);
        }

        let saved = store.append(&matches)?;
        self.log_progress(
            task_id,
            format!("Saved {} profiles for {} with keyword '{}'", saved, company, keyword),
            progress,
        )
        .await;
        Ok(saved)
    }

    /// Compute statistics from whatever the result store holds. Never fails the task.
    pub async fn publish_statistics(&self, task_id: &str, request: &ScrapeRequest, store: &ResultStore) {
        match store.read_all() {
            Ok(Some(rows)) if !rows.is_empty() => {
                let statistics = Statistics::from_rows(&rows, request.companies().len(), request.keywords().len());
                self.log(task_id, statistics.summary()).await;
                self.registry.set_statistics(task_id, statistics).await;
            }
            Ok(_) => {
                self.log(task_id, "No profiles found").await;
                self.registry.set_statistics(task_id, Statistics::empty()).await;
            }
            Err(e) => {
                warn!("Statistics for task {} unavailable: {:#}", task_id, e);
                self.log(task_id, format!("Generated output file but failed to compute statistics: {:#}", e)).await;
            }
        }
    }

    async fn log(&self, task_id: &str, message: impl Into<String>) {
        let message = message.into();
        info!(task_id = %task_id, "{}", message);
        self.registry.update(task_id, TaskUpdate::message(message)).await;
    }

    async fn log_progress(&self, task_id: &str, message: impl Into<String>, progress: &Progress) {
        let message = message.into();
        info!(task_id = %task_id, progress = progress.percent(), "{}", message);
        self.registry
            .update(task_id, TaskUpdate::message(message).with_progress(progress.percent()))
            .await;
    }
}
