use std::fmt;
use thiserror::Error;

/// Reasons a scrape request is rejected before any task exists
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("LinkedIn credentials are required")]
    MissingCredentials,

    #[error("No companies provided")]
    NoCompanies,

    #[error("At least one keyword is required")]
    NoKeywords,
}

/// Login credentials. Never logged, never persisted.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &"<redacted>")
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A validated scrape request
#[derive(Debug, Clone)]
pub struct ScrapeRequest {
    companies: Vec<String>,
    keywords: Vec<String>,
    credentials: Credentials,
}

impl ScrapeRequest {
    /// Normalize and validate the raw inputs
    pub fn new<C, K>(companies: C, keywords: K, email: &str, password: &str) -> Result<Self, RequestError>
    where
        C: IntoIterator,
        C::Item: AsRef<str>,
        K: IntoIterator,
        K::Item: AsRef<str>,
    {
        if email.trim().is_empty() || password.is_empty() {
            return Err(RequestError::MissingCredentials);
        }

        let companies = normalize_companies(companies);
        if companies.is_empty() {
            return Err(RequestError::NoCompanies);
        }

        let keywords = split_keywords(keywords);
        if keywords.is_empty() {
            return Err(RequestError::NoKeywords);
        }

        Ok(Self {
            companies,
            keywords,
            credentials: Credentials {
                email: email.trim().to_string(),
                password: password.to_string(),
            },
        })
    }

    pub fn companies(&self) -> &[String] {
        &self.companies
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Login plus one step per (company, keyword) pair
    pub fn total_steps(&self) -> usize {
        self.companies.len() * self.keywords.len() + 1
    }
}

/// Split every entry on commas, trim, drop blanks. Order is preserved.
pub fn split_keywords<K>(keywords: K) -> Vec<String>
where
    K: IntoIterator,
    K::Item: AsRef<str>,
{
    keywords
        .into_iter()
        .flat_map(|k| {
            k.as_ref()
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Trim company identifiers and drop blanks
pub fn normalize_companies<C>(companies: C) -> Vec<String>
where
    C: IntoIterator,
    C::Item: AsRef<str>,
{
    companies
        .into_iter()
        .map(|c| c.as_ref().trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}
