use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

const ALLOWED_EXTENSIONS: &[&str] = &["csv", "txt"];
const COMPANY_COLUMN: &str = "linkedin_company_name";

/// Lowercased extension of an accepted upload, or `None` if the type is not allowed
pub fn allowed_extension(filename: &str) -> Option<String> {
    let ext = Path::new(filename).extension()?.to_str()?.to_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Strip directories and anything outside `[A-Za-z0-9._-]` from a client-supplied file name
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() { "upload".to_string() } else { cleaned }
}

/// Save an uploaded file under `dir`, returning its path
pub fn save_upload(dir: &Path, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
    fs::create_dir_all(dir).context(format!("Failed to create upload directory: {}", dir.display()))?;
    let path = dir.join(sanitize_filename(filename));
    fs::write(&path, bytes).context(format!("Failed to save upload: {}", path.display()))?;
    Ok(path)
}

/// Company identifiers from an uploaded list. Blanks and duplicates are dropped.
pub fn parse_company_file(extension: &str, bytes: &[u8]) -> Result<Vec<String>> {
    let companies = match extension {
        "txt" => String::from_utf8_lossy(bytes)
            .lines()
            .map(str::to_string)
            .collect::<Vec<_>>(),
        "csv" => parse_company_csv(bytes)?,
        other => anyhow::bail!("Unsupported company file type: {}", other),
    };

    let mut seen = HashSet::new();
    Ok(companies
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty() && seen.insert(c.clone()))
        .collect())
}

/// Read the `linkedin_company_name` column, or the first column if that is absent
fn parse_company_csv(bytes: &[u8]) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);
    let column = reader
        .headers()
        .context("Error processing CSV")?
        .iter()
        .position(|h| h.trim() == COMPANY_COLUMN)
        .unwrap_or(0);

    let mut companies = Vec::new();
    for record in reader.records() {
        let record = record.context("Error processing CSV")?;
        if let Some(value) = record.get(column) {
            companies.push(value.to_string());
        }
    }
    Ok(companies)
}

/// Delete result and upload files older than `max_age`. Failures are logged and skipped.
pub fn prune_stale_files(dirs: &[&Path], max_age: Duration) -> usize {
    let Some(cutoff) = SystemTime::now().checked_sub(max_age) else {
        return 0;
    };

    let mut removed = 0;
    for dir in dirs {
        let Ok(entries) = fs::read_dir(dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let eligible = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| ALLOWED_EXTENSIONS.contains(&e));
            if !eligible || !path.is_file() {
                continue;
            }

            let stale = entry
                .metadata()
                .and_then(|m| m.modified())
                .map(|modified| modified < cutoff)
                .unwrap_or(false);
            if stale {
                match fs::remove_file(&path) {
                    Ok(()) => {
                        debug!("Pruned stale file {}", path.display());
                        removed += 1;
                    }
                    Err(e) => warn!("Failed to prune {}: {}", path.display(), e),
                }
            }
        }
    }
    removed
}
