pub mod keys;
pub mod keywords;
pub mod results;
pub mod uploads;

// Re-export common types
pub use keys::ApiKeyStore;
pub use keywords::load_keywords;
pub use results::ResultStore;
