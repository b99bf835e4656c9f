pub mod behavior;
pub mod driver;
pub mod fingerprint;
pub mod session;

#[cfg(test)]
pub mod fake;

// Re-export common types
pub use behavior::BehaviorSimulator;
pub use driver::{DriverError, PageDriver, SessionFactory};
pub use session::WebDriverSessionFactory;
