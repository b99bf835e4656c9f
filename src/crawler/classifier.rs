use anyhow::{Context, Result};
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Decides whether a display string is a plausible person name
#[cfg_attr(test, mockall::automock)]
pub trait NameClassifier: Send + Sync {
    fn is_person_name(&self, text: &str) -> bool;
}

/// Words that show up in listing anchors but never in a person's name
const NON_NAME_TERMS: &[&str] = &[
    "linkedin", "member", "members", "view", "profile", "profiles",
    "inc", "llc", "ltd", "gmbh", "corp", "corporation", "company", "group",
    "services", "solutions", "technologies", "consulting", "recruiting",
    "hiring", "careers", "the", "and", "of", "for", "at", "people",
];

/// Anchor phrases built from words that are also real surnames ("Lisa See", "Steve Jobs").
/// Matched against the leading words only.
const NON_NAME_PHRASES: &[&str] = &["see all", "see more", "jobs at", "our team", "meet the team"];

/// Lowercase particles allowed inside a name ("Ludwig van Beethoven")
const NAME_PARTICLES: &[&str] = &[
    "van", "von", "der", "den", "de", "del", "della", "da", "di", "du",
    "la", "le", "bin", "bint", "al", "ibn", "y", "e", "ter", "ten",
];

/// Rule-based person-name detector
pub struct HeuristicNameClassifier {
    token: Regex,
    blocklist: HashSet<String>,
}

impl HeuristicNameClassifier {
    pub fn new<I, S>(extra_blocklist: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let token = Regex::new(r"^\p{Lu}[\p{L}\p{M}'’\-]*\.?$")
            .context("Failed to compile name token pattern")?;

        let blocklist = NON_NAME_TERMS
            .iter()
            .map(|t| t.to_string())
            .chain(
                extra_blocklist
                    .into_iter()
                    .map(|t| t.as_ref().trim().to_lowercase())
                    .filter(|t| !t.is_empty()),
            )
            .collect();

        Ok(Self { token, blocklist })
    }

    /// Build the classifier, reading extra blocklist terms (one per line) if a file is given
    pub fn load(blocklist_file: Option<&PathBuf>) -> Result<Self> {
        let extra = match blocklist_file {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .context(format!("Failed to read name blocklist: {}", path.display()))?;
                contents.lines().map(str::to_string).collect()
            }
            None => Vec::new(),
        };
        let classifier = Self::new(extra)?;
        debug!("Name classifier ready with {} blocked terms", classifier.blocklist.len());
        Ok(classifier)
    }
}

impl NameClassifier for HeuristicNameClassifier {
    fn is_person_name(&self, text: &str) -> bool {
        // "Jane Doe, PhD" -> "Jane Doe"
        let name = text.split(',').next().unwrap_or("").trim();
        if name.is_empty() || name.chars().count() > 80 {
            return false;
        }
        if name.chars().any(|c| c.is_ascii_digit() || c == '@' || c == '/' || c == '|') {
            return false;
        }

        let tokens: Vec<&str> = name.split_whitespace().collect();
        if !(2..=5).contains(&tokens.len()) {
            return false;
        }

        let lowered = tokens.join(" ").to_lowercase();
        if NON_NAME_PHRASES
            .iter()
            .any(|phrase| lowered == *phrase || lowered.starts_with(&format!("{phrase} ")))
        {
            return false;
        }

        let mut capitalized = 0;
        for token in &tokens {
            let lower = token.to_lowercase();
            if self.blocklist.contains(lower.trim_end_matches('.')) {
                return false;
            }
            if self.token.is_match(token) {
                capitalized += 1;
            } else if !NAME_PARTICLES.contains(&lower.as_str()) {
                return false;
            }
        }

        capitalized >= 2
    }
}

type Loader = dyn Fn() -> Result<Arc<dyn NameClassifier>> + Send + Sync;

/// Process-wide classifier, initialized once on first use
#[derive(Clone)]
pub struct ClassifierHandle {
    cell: Arc<OnceCell<Arc<dyn NameClassifier>>>,
    loader: Arc<Loader>,
}

impl ClassifierHandle {
    pub fn lazy<F>(loader: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn NameClassifier>> + Send + Sync + 'static,
    {
        Self {
            cell: Arc::new(OnceCell::new()),
            loader: Arc::new(loader),
        }
    }

    /// Handle around an already constructed classifier
    pub fn ready(classifier: Arc<dyn NameClassifier>) -> Self {
        Self {
            cell: Arc::new(OnceCell::new_with(Some(classifier))),
            loader: Arc::new(|| -> Result<Arc<dyn NameClassifier>> {
                anyhow::bail!("classifier already initialized")
            }),
        }
    }

    /// Heuristic classifier with the configured blocklist
    pub fn heuristic(blocklist_file: Option<PathBuf>) -> Self {
        Self::lazy(move || {
            let classifier = HeuristicNameClassifier::load(blocklist_file.as_ref())?;
            info!("Name classifier initialized");
            Ok(Arc::new(classifier) as Arc<dyn NameClassifier>)
        })
    }

    /// Get the classifier, running the initializer if nobody has yet.
    /// A failed initialization is retried on the next call.
    pub async fn get(&self) -> Result<Arc<dyn NameClassifier>> {
        let loader = self.loader.clone();
        self.cell
            .get_or_try_init(|| async move { loader() })
            .await
            .cloned()
            .context("Failed to initialize name classifier")
    }
}

impl fmt::Debug for ClassifierHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifierHandle")
            .field("initialized", &self.cell.initialized())
            .finish()
    }
}
