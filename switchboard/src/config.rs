//! Environment-derived configuration

use std::time::Duration;

use crate::processor::PacingConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorStrategy {
    /// Local rule-based conversation synthesis
    Scripted,
    /// Delegate conversation generation to the external oracle
    Oracle,
}

impl GeneratorStrategy {
    fn from_env(value: &str) -> anyhow::Result<Self> {
        match value {
            "scripted" => Ok(Self::Scripted),
            "oracle" => Ok(Self::Oracle),
            other => Err(anyhow::anyhow!(
                "Invalid GENERATOR_STRATEGY '{other}'. Expected 'scripted' or 'oracle'"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Port the engine listens on
    pub port: u16,
    /// Path to the SQLite task database; ":memory:" keeps state process-local
    pub database_path: String,
    /// Which conversation generator drives task runs
    pub generator_strategy: GeneratorStrategy,
    /// Oracle endpoint URL (oracle strategy only)
    pub oracle_url: String,
    /// Fixed task identifier sent with every oracle query
    pub oracle_task_id: String,
    /// Hard timeout on oracle requests
    pub oracle_timeout: Duration,
    /// Fixed delay before each emitted step
    pub pacing_base: Duration,
    /// Upper bound of the random extra delay per step
    pub pacing_jitter: Duration,
    /// Origins allowed by CORS
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let generator_strategy = match std::env::var("GENERATOR_STRATEGY") {
            Ok(value) => GeneratorStrategy::from_env(&value)?,
            Err(_) => GeneratorStrategy::Scripted,
        };

        Ok(Self {
            port: env_parse("SWITCHBOARD_PORT", 8080)?,
            database_path: std::env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "data/switchboard.db".to_string()),
            generator_strategy,
            oracle_url: std::env::var("ORACLE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:9100/resolve".to_string()),
            oracle_task_id: std::env::var("ORACLE_TASK_ID")
                .unwrap_or_else(|_| "multi-agent-demo".to_string()),
            oracle_timeout: Duration::from_millis(env_parse("ORACLE_TIMEOUT_MS", 15_000)?),
            pacing_base: Duration::from_millis(env_parse("PACING_BASE_MS", 1_000)?),
            pacing_jitter: Duration::from_millis(env_parse("PACING_JITTER_MS", 2_000)?),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|value| {
                    value
                        .split(',')
                        .map(|origin| origin.trim().to_string())
                        .filter(|origin| !origin.is_empty())
                        .collect()
                })
                .unwrap_or_else(|_| {
                    vec![
                        "http://localhost:3000".to_string(),
                        "http://127.0.0.1:3000".to_string(),
                    ]
                }),
        })
    }

    pub fn pacing(&self) -> PacingConfig {
        PacingConfig {
            base: self.pacing_base,
            jitter: self.pacing_jitter,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Invalid {key} '{value}': {e}")),
        Err(_) => Ok(default),
    }
}
