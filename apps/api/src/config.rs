use std::time::Duration;

use anyhow::{ensure, Context, Result};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub scoring_service_url: String,
    pub scoring_timeout_secs: u64,
    pub max_upload_mb: usize,
    pub port: u16,
    pub rust_log: String,
    pub session_ttl_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let session_ttl_secs = optional_env("SESSION_TTL_SECS", "3600")
            .parse::<u64>()
            .context("SESSION_TTL_SECS must be a whole number of seconds")?;
        ensure!(session_ttl_secs > 0, "SESSION_TTL_SECS must be greater than zero");

        Ok(Config {
            scoring_service_url: require_env("SCORING_SERVICE_URL")?
                .trim_end_matches('/')
                .to_string(),
            scoring_timeout_secs: optional_env("SCORING_TIMEOUT_SECS", "120")
                .parse::<u64>()
                .context("SCORING_TIMEOUT_SECS must be a whole number of seconds")?,
            max_upload_mb: optional_env("MAX_UPLOAD_MB", "20")
                .parse::<usize>()
                .context("MAX_UPLOAD_MB must be a whole number")?,
            port: optional_env("PORT", "8080")
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: optional_env("RUST_LOG", "info"),
            session_ttl_secs,
        })
    }

    pub fn scoring_timeout(&self) -> Duration {
        Duration::from_secs(self.scoring_timeout_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// How often idle sessions are swept; never longer than a minute.
    pub fn session_sweep_interval(&self) -> Duration {
        self.session_ttl().min(Duration::from_secs(60))
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb * 1024 * 1024
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(session_ttl_secs: u64) -> Config {
        Config {
            scoring_service_url: "http://localhost:8000".to_string(),
            scoring_timeout_secs: 120,
            max_upload_mb: 20,
            port: 8080,
            rust_log: "info".to_string(),
            session_ttl_secs,
        }
    }

    #[test]
    fn test_sweep_interval_is_capped_at_a_minute() {
        assert_eq!(config(3600).session_sweep_interval(), Duration::from_secs(60));
        assert_eq!(config(20).session_sweep_interval(), Duration::from_secs(20));
        assert_eq!(config(3600).max_upload_bytes(), 20 * 1024 * 1024);
    }
}
