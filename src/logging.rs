// Logging setup
//
// env_logger behind the `log` facade. RUST_LOG wins over the configured
// level; the optional file sink replaces stderr.

use crate::config::DebugConfig;
use env_logger::{Builder, Target};
use log::LevelFilter;
use std::fs::OpenOptions;
use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize logging once per process. Later calls are ignored.
pub fn init_logging(config: &DebugConfig) {
    INIT.call_once(|| {
        let mut builder = Builder::new();
        builder.filter_level(parse_level(&config.log_level));

        if let Ok(filters) = std::env::var("RUST_LOG") {
            builder.parse_filters(&filters);
        }

        if config.log_to_file {
            match OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&config.log_file)
            {
                Ok(file) => {
                    builder.target(Target::Pipe(Box::new(file)));
                }
                Err(e) => {
                    eprintln!("Could not open log file {}: {}", config.log_file, e);
                }
            }
        }

        if builder.try_init().is_err() {
            eprintln!("A logger was already installed; keeping it");
        }
    });
}

fn parse_level(level: &str) -> LevelFilter {
    level.parse().unwrap_or(LevelFilter::Info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_parse_case_insensitively() {
        assert_eq!(parse_level("debug"), LevelFilter::Debug);
        assert_eq!(parse_level("WARN"), LevelFilter::Warn);
        assert_eq!(parse_level("nonsense"), LevelFilter::Info);
    }
}
