use anyhow::Result;
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Default filter directives for the given verbosity
fn filter_directives(verbose: bool) -> [&'static str; 3] {
    if verbose {
        ["people_scraper=debug", "tower_http=debug", "warn"]
    } else {
        ["people_scraper=info", "tower_http=info", "warn"]
    }
}

/// Initialize the logging system. `RUST_LOG` directives are layered on top of the defaults.
pub fn init_logging(verbose: bool, log_file: Option<PathBuf>) -> Result<()> {
    let mut env_filter = EnvFilter::from_default_env();
    for directive in filter_directives(verbose) {
        env_filter = env_filter.add_directive(directive.parse()?);
    }

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE);

    if let Some(log_file) = log_file {
        if let Some(parent) = log_file.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = fs::OpenOptions::new().create(true).append(true).open(&log_file)?;
        let file_layer = fmt::layer()
            .with_target(true)
            .with_ansi(false)
            .with_writer(file);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    }

    Ok(())
}

/// Log file under the platform data directory
pub fn default_log_file() -> PathBuf {
    let mut path = if let Some(proj_dirs) = directories::ProjectDirs::from("com", "people-scraper", "people-scraper") {
        proj_dirs.data_dir().to_path_buf()
    } else {
        PathBuf::from("./logs")
    };

    path.push("scraper.log");
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_parse() {
        for verbose in [false, true] {
            for directive in filter_directives(verbose) {
                assert!(directive.parse::<tracing_subscriber::filter::Directive>().is_ok());
            }
        }
        assert!(filter_directives(true).contains(&"people_scraper=debug"));
    }

    #[test]
    fn default_log_file_is_named() {
        assert!(default_log_file().ends_with("scraper.log"));
    }
}
