use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::browser::WebDriverSessionFactory;
use crate::cli::config::AppConfig;
use crate::crawler::{ClassifierHandle, ScrapeController, ScrapeRequest, TaskRegistry, TaskStatus};
use crate::server::{self, AppState};
use crate::storage::ApiKeyStore;

/// Wire the production browser and classifier into a controller
fn build_controller(config: &AppConfig) -> ScrapeController {
    ScrapeController::new(
        TaskRegistry::new(),
        Arc::new(WebDriverSessionFactory::new(config.browser.clone())),
        ClassifierHandle::heuristic(config.scrape.name_blocklist_file.clone()),
        config.scrape.clone(),
        config.storage.output_dir.clone(),
    )
}

/// Start the web UI and API
pub async fn serve(config_path: Option<&Path>, host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = AppConfig::load(config_path)?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let controller = build_controller(&config);
    server::serve(AppState::new(config, controller)).await
}

/// Run a single task to completion and report it on stdout
pub async fn scrape(
    config_path: Option<&Path>,
    companies: Vec<String>,
    keywords: Vec<String>,
    email: String,
    password: String,
) -> Result<()> {
    let config = AppConfig::load(config_path)?;
    let request = ScrapeRequest::new(&companies, &keywords, &email, &password)?;

    let controller = build_controller(&config);
    let task_id = controller.create_task().await;
    info!("Running task {} ({} steps)", task_id, request.total_steps());

    let status = controller.run(&task_id, &request).await;
    let record = controller
        .registry()
        .get(&task_id)
        .await
        .context("Task record disappeared")?;

    println!("Task ID: {}", record.task_id);
    println!("Status: {}", record.status);
    println!("Progress: {}%", record.progress);
    println!("Log:");
    for entry in &record.logs {
        println!("  [{}] {}", entry.time.format("%Y-%m-%d %H:%M:%S"), entry.message);
    }

    if let Some(statistics) = &record.statistics {
        println!("Statistics:");
        println!("{}", serde_json::to_string_pretty(statistics)?);
    }
    if record.output_file.exists() {
        println!("Results: {}", record.output_file.display());
    }

    if status == TaskStatus::Failed {
        anyhow::bail!("Task {} failed", task_id);
    }
    Ok(())
}

fn key_store(config_path: Option<&Path>) -> Result<ApiKeyStore> {
    let config = AppConfig::load(config_path)?;
    Ok(ApiKeyStore::new(config.auth.keys_file))
}

/// Create an API key and print it once
pub async fn create_key(config_path: Option<&Path>, name: String, description: String) -> Result<()> {
    let keys = key_store(config_path)?;
    let key = keys.create(&name, &description).await?;
    println!("Created API key '{}': {}", name, key);
    println!("Store this key securely. It will not be shown again.");
    Ok(())
}

/// List masked API keys
pub async fn list_keys(config_path: Option<&Path>) -> Result<()> {
    let keys = key_store(config_path)?;
    let listing = keys.list().await;
    if listing.is_empty() {
        println!("No API keys in {}", keys.path().display());
        return Ok(());
    }

    println!("API keys:");
    for key in listing {
        println!(
            "  - {} {} ({}) created {}",
            key.masked_key,
            key.name,
            key.description,
            key.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

/// Delete an API key
pub async fn delete_key(config_path: Option<&Path>, key: String) -> Result<()> {
    let keys = key_store(config_path)?;
    if keys.delete(&key).await? {
        println!("API key deleted");
    } else {
        warn!("API key not found");
        println!("API key not found");
    }
    Ok(())
}

/// Write the default configuration, refusing to overwrite an existing file
pub async fn init_config(config_path: Option<&Path>) -> Result<()> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(AppConfig::default_path);
    if path.exists() {
        anyhow::bail!("Configuration already exists: {}", path.display());
    }

    AppConfig::default().save_to_file(&path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

/// Show the current configuration
pub async fn show_config(config_path: Option<&Path>) -> Result<()> {
    let config = AppConfig::load(config_path)?;
    println!("Current configuration:");
    println!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}
