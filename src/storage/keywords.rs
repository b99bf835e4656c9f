use std::fs;
use std::path::Path;
use tracing::error;

/// Read the keyword list, one per line. Read on every call, blank lines skipped.
pub fn load_keywords(path: &Path) -> Vec<String> {
    match fs::read_to_string(path) {
        Ok(contents) => contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
        Err(e) => {
            error!("Failed to load keywords from {}: {}", path.display(), e);
            Vec::new()
        }
    }
}
