use anyhow::{Result, Context};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::fs;
use tracing::{info, debug, error};

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub browser: BrowserSettings,
    pub scrape: ScrapeSettings,
    pub auth: AuthSettings,
    pub storage: StorageSettings,
}

/// HTTP server settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Prefix every route is nested under, e.g. "/linkedinpeoplescraper". Empty for none.
    pub base_path: String,
    /// Minimum seconds between two web scrape submissions from one IP
    pub rate_limit_secs: u64,
}

/// Browser session settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct BrowserSettings {
    pub webdriver_url: String,
    pub headless: bool,
    pub page_load_timeout_secs: u64,
    pub fingerprints: Vec<BrowserFingerprint>,
}

/// Browser fingerprint settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BrowserFingerprint {
    pub name: String,
    pub user_agent: String,
    pub accept_language: String,
    pub viewport: Viewport,
}

/// Browser viewport settings
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Pacing ranges in milliseconds, inclusive on both ends
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PacingSettings {
    pub typing_delay_ms: (u64, u64),
    pub after_navigation_ms: (u64, u64),
    pub between_pairs_ms: (u64, u64),
    pub scroll_step_px: u32,
    pub scroll_interval_ms: u64,
}

/// CSS selectors for the target site
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SelectorSettings {
    pub username_input: String,
    pub password_input: String,
    pub submit_button: String,
    pub login_success: String,
    pub login_challenge: String,
    pub login_error: String,
    pub consent_buttons: Vec<String>,
    pub overlays: Vec<String>,
    pub profile_links: String,
}

/// Scrape orchestration settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ScrapeSettings {
    pub login_url: String,
    /// Listing URL with `{company}` and `{keyword}` placeholders
    pub people_url_template: String,
    pub login_timeout_secs: u64,
    pub login_poll_interval_ms: u64,
    pub results_timeout_secs: u64,
    pub consent_timeout_ms: u64,
    pub pacing: PacingSettings,
    pub selectors: SelectorSettings,
    pub name_blocklist_file: Option<PathBuf>,
}

/// API authentication settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AuthSettings {
    /// Token signing secret; `JWT_SECRET_KEY` takes precedence
    pub jwt_secret: Option<String>,
    pub token_expiry_hours: i64,
    pub keys_file: PathBuf,
}

/// File locations
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StorageSettings {
    pub output_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub keywords_file: PathBuf,
    /// Output and upload files older than this are pruned on new web submissions
    pub retention_hours: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5001,
            base_path: String::new(),
            rate_limit_secs: 60,
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:4444".to_string(),
            headless: true,
            page_load_timeout_secs: 30,
            fingerprints: vec![
                BrowserFingerprint {
                    name: "windows_chrome".to_string(),
                    user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string(),
                    accept_language: "en-US,en;q=0.9".to_string(),
                    viewport: Viewport { width: 1920, height: 1080 },
                },
                BrowserFingerprint {
                    name: "mac_chrome".to_string(),
                    user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string(),
                    accept_language: "en-US,en;q=0.9".to_string(),
                    viewport: Viewport { width: 1440, height: 900 },
                },
            ],
        }
    }
}

impl Default for PacingSettings {
    fn default() -> Self {
        Self {
            typing_delay_ms: (50, 200),
            after_navigation_ms: (2000, 3000),
            between_pairs_ms: (3000, 5000),
            scroll_step_px: 100,
            scroll_interval_ms: 100,
        }
    }
}

impl Default for SelectorSettings {
    fn default() -> Self {
        Self {
            username_input: "input[name=\"session_key\"]".to_string(),
            password_input: "input[name=\"session_password\"]".to_string(),
            submit_button: "button[type=\"submit\"]".to_string(),
            login_success: "input.search-global-typeahead__input, #global-nav".to_string(),
            login_challenge: "form#email-pin-challenge, input[name=\"pin\"], #captcha-internal".to_string(),
            login_error: "#error-for-password, #error-for-username".to_string(),
            consent_buttons: vec![
                "button[title='Accept cookies']".to_string(),
                "button[action-type='ACCEPT']".to_string(),
            ],
            overlays: vec![
                ".message-overlay".to_string(),
                ".cookie-popup".to_string(),
                "div[id*='notice']".to_string(),
            ],
            profile_links: "div.artdeco-entity-lockup__title a[href*=\"/in/\"]".to_string(),
        }
    }
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            login_url: "https://www.linkedin.com/login".to_string(),
            people_url_template: "https://www.linkedin.com/company/{company}/people/?keywords={keyword}".to_string(),
            login_timeout_secs: 30,
            login_poll_interval_ms: 500,
            results_timeout_secs: 15,
            consent_timeout_ms: 1000,
            pacing: PacingSettings::default(),
            selectors: SelectorSettings::default(),
            name_blocklist_file: None,
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_expiry_hours: 24,
            keys_file: PathBuf::from("api_keys.json"),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            upload_dir: PathBuf::from("uploads"),
            keywords_file: PathBuf::from("keywords.txt"),
            retention_hours: 24,
        }
    }
}

impl ServerSettings {
    /// `base_path` with a leading slash and no trailing one, empty when unset
    pub fn route_prefix(&self) -> String {
        let trimmed = self.base_path.trim().trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{}", trimmed)
        }
    }
}

/// Bytes escaped inside a single URL path segment
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

impl ScrapeSettings {
    /// Build the people listing URL for one (company, keyword) pair
    pub fn people_url(&self, company: &str, keyword: &str) -> String {
        let company = utf8_percent_encode(company, PATH_SEGMENT).to_string();
        let keyword: String = url::form_urlencoded::byte_serialize(keyword.as_bytes()).collect();
        self.people_url_template
            .replace("{company}", &company)
            .replace("{keyword}", &keyword)
    }
}

impl AppConfig {
    /// Get the path to the config directory
    fn config_dir() -> PathBuf {
        let path = if let Some(proj_dirs) = directories::ProjectDirs::from("com", "people-scraper", "people-scraper") {
            proj_dirs.config_dir().to_path_buf()
        } else {
            PathBuf::from("./config")
        };

        if !path.exists() {
            if let Err(e) = fs::create_dir_all(&path) {
                error!("Failed to create config directory: {}", e);
            }
        }

        path
    }

    /// Path of the default configuration file
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("default.yaml")
    }

    /// Load the configuration from an explicit path, or the default location
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Self::load_default(),
        }
    }

    /// Load the default configuration
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_path();

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            info!("Default configuration not found. Creating...");
            let config = Self::default();
            config.save_to_file(&config_path)?;
            Ok(config)
        }
    }

    /// Load configuration from a file
    fn load_from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from: {}", path.display());
        let contents = fs::read_to_string(path)
            .context(format!("Failed to read configuration file: {}", path.display()))?;

        let config: Self = serde_yaml::from_str(&contents)
            .context(format!("Failed to parse configuration file: {}", path.display()))?;

        Ok(config)
    }

    /// Save the configuration to a file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        debug!("Saving configuration to: {}", path.display());

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .context(format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        let contents = serde_yaml::to_string(self)
            .context("Failed to serialize configuration")?;

        fs::write(path, contents)
            .context(format!("Failed to write configuration file: {}", path.display()))?;

        Ok(())
    }

    /// Token signing secret: environment first, then the file, then a random per-process value
    pub fn jwt_secret(&self) -> String {
        std::env::var("JWT_SECRET_KEY")
            .ok()
            .filter(|s| !s.is_empty())
            .or_else(|| self.auth.jwt_secret.clone())
            .unwrap_or_else(|| {
                use rand::distributions::{Alphanumeric, DistString};
                Alphanumeric.sample_string(&mut rand::thread_rng(), 64)
            })
    }
}
