use std::env;

use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let level = env::var("LOG_LEVEL")
            .ok()
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.level);
        let json = env::var("LOG_FORMAT")
            .map(|v| v.trim().eq_ignore_ascii_case("json"))
            .unwrap_or(defaults.json);
        Self { level, json }
    }

    /// Installs the global subscriber. `RUST_LOG` wins over `level`. Logs go to stderr.
    pub fn init(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));
        let builder = fmt().with_env_filter(filter).with_writer(std::io::stderr);
        let res = if self.json {
            builder.json().try_init()
        } else {
            builder.try_init()
        };
        if let Err(err) = res {
            eprintln!("[WARN] logging already initialised: {err}");
        }
    }
}
