use std::time::Duration;

use anyhow::Context;

pub const DEFAULT_JWT_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: String,
    pub jwt_secret: String,
    pub recommender_url: String,
    pub moderation_url: String,
    pub service_timeout: Duration,
    pub starting_coins: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let port = var("ORRANGE_PORT", "5000")
            .parse()
            .context("ORRANGE_PORT must be a port number")?;
        let timeout_ms: u64 = var("ORRANGE_SERVICE_TIMEOUT_MS", "2000")
            .parse()
            .context("ORRANGE_SERVICE_TIMEOUT_MS must be a number of milliseconds")?;
        let starting_coins = var("ORRANGE_STARTING_COINS", "1000")
            .parse()
            .context("ORRANGE_STARTING_COINS must be an integer")?;

        Ok(Self {
            host: var("ORRANGE_HOST", "0.0.0.0"),
            port,
            db_path: var("ORRANGE_DB_PATH", "orrange.db"),
            jwt_secret: var("ORRANGE_JWT_SECRET", DEFAULT_JWT_SECRET),
            recommender_url: var("ORRANGE_RECOMMENDER_URL", "http://localhost:5001/recommend"),
            moderation_url: var("ORRANGE_MODERATION_URL", "http://localhost:5002/moderate"),
            service_timeout: Duration::from_millis(timeout_ms),
            starting_coins,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.db_path, "orrange.db");
        assert_eq!(config.jwt_secret, DEFAULT_JWT_SECRET);
        assert_eq!(config.service_timeout, Duration::from_millis(2000));
        assert_eq!(config.starting_coins, 1000);
    }

    #[test]
    fn overrides_and_bad_values() {
        let config = Config::from_lookup(|key| match key {
            "ORRANGE_PORT" => Some("8080".into()),
            "ORRANGE_STARTING_COINS" => Some("0".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.starting_coins, 0);

        assert!(Config::from_lookup(|key| (key == "ORRANGE_PORT").then(|| "http".to_string())).is_err());
    }
}
