pub mod classifier;
pub mod controller;
pub mod login;
pub mod registry;
pub mod request;
pub mod stats;
pub mod task;

// Re-export common types
pub use classifier::ClassifierHandle;
pub use controller::ScrapeController;
pub use registry::{TaskRegistry, TaskUpdate};
pub use request::ScrapeRequest;
pub use task::{ProfileMatch, TaskStatus};
