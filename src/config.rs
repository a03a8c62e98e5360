use crate::engine::conflict::DetectorConfig;
use crate::engine::punctuality::PunctualityThresholds;
use anyhow::Result;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub thresholds: PunctualityThresholds,
    pub detector: DetectorConfig,
    pub debounce_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:kintai-engine.db".to_string());

        let bind_address =
            env::var("BIND_ADDRESS").unwrap_or_else(|_| "127.0.0.1:8080".to_string());

        // 定時判定のしきい値は運用ごとに異なるため必須。既定値は持たない
        let grace_minutes = require_i64("PUNCTUALITY_GRACE_MINUTES")?;
        let absent_after_minutes = require_i64("PUNCTUALITY_ABSENT_AFTER_MINUTES")?;
        let thresholds = PunctualityThresholds::new(grace_minutes, absent_after_minutes)?;

        let minor_overlap_minutes = optional_i64("OVERLAP_WARNING_MINUTES")?.unwrap_or(15);
        let debounce_ms = optional_i64("VALIDATION_DEBOUNCE_MS")?.unwrap_or(400).max(0) as u64;

        Ok(Config {
            database_url,
            bind_address,
            thresholds,
            detector: DetectorConfig {
                minor_overlap_minutes,
            },
            debounce_ms,
        })
    }
}

fn require_i64(name: &str) -> Result<i64> {
    let value = env::var(name)
        .map_err(|_| anyhow::anyhow!("{} environment variable is required", name))?;
    parse_i64(name, &value)
}

fn optional_i64(name: &str) -> Result<Option<i64>> {
    match env::var(name) {
        Ok(value) => Ok(Some(parse_i64(name, &value)?)),
        Err(_) => Ok(None),
    }
}

fn parse_i64(name: &str, value: &str) -> Result<i64> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("{} must be an integer (got '{}')", name, value))
}
