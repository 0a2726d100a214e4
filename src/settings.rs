//! Builder defaults and logging configuration.
//!
//! Settings are layered with the `config` crate: built-in defaults, then an
//! optional file, then `POSTQUERY_*` environment variables.

use std::fs::OpenOptions;
use std::sync::Mutex;

use config::{Config, Environment, File};
use serde::Deserialize;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::error::{QueryError, Result};

pub const DEVELOPMENT: &str = "development";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub orderby: String,
    pub order: String,
    pub post_status: String,
    pub nopaging: bool,
    pub suppress_filters: bool,
    /// Query logging is only emitted in the development environment.
    pub environment: String,
    pub log_level: String,
    /// Log lines are also appended here, without colors, when set.
    #[serde(default)]
    pub log_file: Option<String>,
}
impl Default for Settings {
    fn default() -> Self {
        Self {
            orderby: "title".to_string(),
            order: "ASC".to_string(),
            post_status: "any".to_string(),
            nopaging: true,
            suppress_filters: true,
            environment: DEVELOPMENT.to_string(),
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}
impl Settings {
    /// Loads settings, reading `path` when it exists.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let defaults = Settings::default();
        let mut builder = Config::builder()
            .set_default("orderby", defaults.orderby)?
            .set_default("order", defaults.order)?
            .set_default("post_status", defaults.post_status)?
            .set_default("nopaging", defaults.nopaging)?
            .set_default("suppress_filters", defaults.suppress_filters)?
            .set_default("environment", defaults.environment)?
            .set_default("log_level", defaults.log_level)?;
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(false));
        }
        let settings = builder
            .add_source(Environment::with_prefix("POSTQUERY"))
            .build()?
            .try_deserialize::<Settings>()?;
        Ok(settings)
    }
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case(DEVELOPMENT)
    }
}

/// Installs a console subscriber, plus a plain-text file sink when
/// `log_file` is set. `RUST_LOG` takes precedence over the configured level.
/// Calling it again once a subscriber is installed does nothing.
pub fn init_logging(settings: &Settings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    let file_layer = match &settings.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| QueryError::Config(format!("Cannot open log file {}: {}", path, e)))?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_target(false),
            )
        }
        None => None,
    };
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .try_init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let settings = Settings::load(Some("no_such_postquery_settings")).unwrap();
        assert_eq!(settings.orderby, "title");
        assert_eq!(settings.post_status, "any");
        assert!(settings.nopaging);
        assert!(settings.suppress_filters);
    }

    #[test]
    fn file_overrides_defaults() {
        let path = std::env::temp_dir().join("postquery_settings_test.toml");
        std::fs::write(&path, "orderby = \"date\"\nenvironment = \"production\"\n").unwrap();
        let settings = Settings::load(path.to_str()).unwrap();
        assert_eq!(settings.orderby, "date");
        assert_eq!(settings.order, "ASC");
        assert!(!settings.is_development());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn unwritable_log_file_is_a_config_error() {
        let settings = Settings {
            log_file: Some("/no/such/postquery/dir/query.log".to_string()),
            ..Settings::default()
        };
        assert!(matches!(init_logging(&settings), Err(QueryError::Config(_))));
    }

    #[test]
    fn statements_are_appended_to_the_log_file() {
        use crate::instrument::{Instrument, TracingInstrument};

        let path = std::env::temp_dir().join("postquery_logging_test.log");
        let _ = std::fs::remove_file(&path);
        let settings = Settings {
            log_file: path.to_str().map(str::to_string),
            ..Settings::default()
        };
        init_logging(&settings).unwrap();
        let instrument = TracingInstrument::new(&settings);
        instrument.on_complete(instrument.on_start(), "select *\n  from posts");
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("[Query] select * from posts (Done in"), "{}", written);
        let _ = std::fs::remove_file(&path);
    }
}
