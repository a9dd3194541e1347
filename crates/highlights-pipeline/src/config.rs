//! Pipeline configuration
//!
//! Built once at startup and handed to each component; nothing reads the
//! environment after that.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_API_URL: &str = "https://sport-highlights-api.p.rapidapi.com/basketball/highlights";

pub const DEFAULT_API_HOST: &str = "sport-highlights-api.p.rapidapi.com";

/// Upper bound on one highlights request, in seconds.
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 120;

pub const DEFAULT_LEAGUE: &str = "NCAA";

pub const DEFAULT_LIMIT: u32 = 10;

pub const DEFAULT_ARCHIVE_NAME: &str = "basketball_highlights";

/// Region whose buckets are created without a location constraint.
pub const DEFAULT_REGION: &str = "us-east-1";

pub const DEFAULT_TABLE: &str = "SportsHighlights";

pub const DEFAULT_RETRY_COUNT: u32 = 3;

pub const DEFAULT_RETRY_DELAY_SECS: u64 = 30;

pub const DEFAULT_STAGE_WAIT_SECS: u64 = 60;

pub const DEFAULT_TABLE_READY_POLL_SECS: u64 = 20;

pub const DEFAULT_TABLE_READY_MAX_POLLS: u32 = 25;

/// Date format for the `date` query parameter and `fetch_date`
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub api: ApiConfig,
    pub query: QueryConfig,
    pub storage: StorageConfig,
    pub retry: RetryConfig,
    pub stages: StageCommands,
}

/// Highlights API connection
#[derive(Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub url: String,
    pub host: String,
    pub key: String,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("url", &self.url)
            .field("host", &self.host)
            .field("key", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Which highlights to fetch and where to archive them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// `YYYY-MM-DD`; also stamped on every stored record
    pub date: String,
    pub league: String,
    pub limit: u32,
    /// Archive object is written to `highlights/<archive_name>.json`
    pub archive_name: String,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub region: String,
    pub bucket: String,
    pub table: String,
    /// Endpoint override for S3/DynamoDB compatible services
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub table_ready_poll_secs: u64,
    pub table_ready_max_polls: u32,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("table", &self.table)
            .field("endpoint", &self.endpoint)
            .field("static_credentials", &self.access_key.is_some())
            .finish()
    }
}

impl StorageConfig {
    pub fn table_ready_poll_interval(&self) -> Duration {
        Duration::from_secs(self.table_ready_poll_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per stage, including the first
    pub retry_count: u32,
    pub retry_delay_secs: u64,
    /// Stabilisation wait between consecutive stages
    pub stage_wait_secs: u64,
}

impl RetryConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn stage_wait(&self) -> Duration {
        Duration::from_secs(self.stage_wait_secs)
    }
}

/// External commands for the downstream media stages
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageCommands {
    pub video: Option<String>,
    pub mediaconvert: Option<String>,
}

impl PipelineConfig {
    /// Load from the environment (and `.env` if present), then validate.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = Self {
            api: ApiConfig {
                url: env_or("HIGHLIGHTS_API_URL", DEFAULT_API_URL),
                host: env_or("RAPIDAPI_HOST", DEFAULT_API_HOST),
                key: env_opt("RAPIDAPI_KEY").ok_or(ConfigError::Missing("RAPIDAPI_KEY"))?,
                timeout_secs: env_parse("HIGHLIGHTS_API_TIMEOUT_SECS", DEFAULT_API_TIMEOUT_SECS)?,
            },
            query: QueryConfig {
                date: env_opt("HIGHLIGHTS_DATE").unwrap_or_else(today),
                league: env_or("HIGHLIGHTS_LEAGUE", DEFAULT_LEAGUE),
                limit: env_parse("HIGHLIGHTS_LIMIT", DEFAULT_LIMIT)?,
                archive_name: env_or("HIGHLIGHTS_ARCHIVE_NAME", DEFAULT_ARCHIVE_NAME),
            },
            storage: StorageConfig {
                region: env_or("AWS_REGION", DEFAULT_REGION),
                bucket: env_opt("S3_BUCKET_NAME").ok_or(ConfigError::Missing("S3_BUCKET_NAME"))?,
                table: env_or("DYNAMODB_TABLE", DEFAULT_TABLE),
                endpoint: env_opt("AWS_ENDPOINT_URL"),
                access_key: env_opt("AWS_ACCESS_KEY_ID"),
                secret_key: env_opt("AWS_SECRET_ACCESS_KEY"),
                table_ready_poll_secs: env_parse(
                    "TABLE_READY_POLL_SECS",
                    DEFAULT_TABLE_READY_POLL_SECS,
                )?,
                table_ready_max_polls: env_parse(
                    "TABLE_READY_MAX_POLLS",
                    DEFAULT_TABLE_READY_MAX_POLLS,
                )?,
            },
            retry: RetryConfig {
                retry_count: env_parse("RETRY_COUNT", DEFAULT_RETRY_COUNT)?,
                retry_delay_secs: env_parse("RETRY_DELAY_SECS", DEFAULT_RETRY_DELAY_SECS)?,
                stage_wait_secs: env_parse(
                    "WAIT_TIME_BETWEEN_STAGES_SECS",
                    DEFAULT_STAGE_WAIT_SECS,
                )?,
            },
            stages: StageCommands {
                video: env_opt("VIDEO_STAGE_COMMAND"),
                mediaconvert: env_opt("MEDIACONVERT_STAGE_COMMAND"),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        require("HIGHLIGHTS_API_URL", &self.api.url)?;
        require("RAPIDAPI_KEY", &self.api.key)?;
        require("S3_BUCKET_NAME", &self.storage.bucket)?;
        require("DYNAMODB_TABLE", &self.storage.table)?;
        require("AWS_REGION", &self.storage.region)?;
        require("HIGHLIGHTS_ARCHIVE_NAME", &self.query.archive_name)?;

        NaiveDate::parse_from_str(&self.query.date, DATE_FORMAT).map_err(|e| {
            ConfigError::invalid("HIGHLIGHTS_DATE", format!("'{}': {}", self.query.date, e))
        })?;

        if self.query.limit == 0 {
            return Err(ConfigError::invalid("HIGHLIGHTS_LIMIT", "must be greater than 0"));
        }

        if self.retry.retry_count == 0 {
            return Err(ConfigError::invalid("RETRY_COUNT", "must be at least 1"));
        }

        if self.storage.table_ready_max_polls == 0 {
            return Err(ConfigError::invalid("TABLE_READY_MAX_POLLS", "must be at least 1"));
        }

        if self.storage.access_key.is_some() != self.storage.secret_key.is_some() {
            return Err(ConfigError::invalid(
                "AWS_ACCESS_KEY_ID",
                "access key and secret key must be set together",
            ));
        }

        Ok(())
    }
}

fn today() -> String {
    Utc::now().format(DATE_FORMAT).to_string()
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_or(name: &str, default: &str) -> String {
    env_opt(name).unwrap_or_else(|| default.to_string())
}

fn env_parse<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env_opt(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(name, format!("'{}': {}", raw, e))),
        None => Ok(default),
    }
}

fn require(name: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::Missing(name))
    } else {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub(crate) mod tests {
    use super::*;
    use serial_test::serial;

    /// A valid configuration for tests that never touch the network
    pub(crate) fn sample() -> PipelineConfig {
        PipelineConfig {
            api: ApiConfig {
                url: "http://localhost:1/highlights".to_string(),
                host: DEFAULT_API_HOST.to_string(),
                key: "test-key".to_string(),
                timeout_secs: DEFAULT_API_TIMEOUT_SECS,
            },
            query: QueryConfig {
                date: "2024-05-01".to_string(),
                league: DEFAULT_LEAGUE.to_string(),
                limit: DEFAULT_LIMIT,
                archive_name: DEFAULT_ARCHIVE_NAME.to_string(),
            },
            storage: StorageConfig {
                region: DEFAULT_REGION.to_string(),
                bucket: "highlights-test".to_string(),
                table: DEFAULT_TABLE.to_string(),
                endpoint: None,
                access_key: None,
                secret_key: None,
                table_ready_poll_secs: 1,
                table_ready_max_polls: 3,
            },
            retry: RetryConfig {
                retry_count: DEFAULT_RETRY_COUNT,
                retry_delay_secs: 5,
                stage_wait_secs: 10,
            },
            stages: StageCommands::default(),
        }
    }

    const VARS: &[&str] = &[
        "RAPIDAPI_KEY",
        "S3_BUCKET_NAME",
        "HIGHLIGHTS_DATE",
        "HIGHLIGHTS_LIMIT",
        "RETRY_COUNT",
        "AWS_REGION",
        "DYNAMODB_TABLE",
        "AWS_ACCESS_KEY_ID",
        "AWS_SECRET_ACCESS_KEY",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_sample_is_valid() {
        assert_eq!(sample().validate(), Ok(()));
    }

    #[test]
    #[serial]
    fn test_from_env_requires_api_key() {
        clear_env();
        std::env::set_var("S3_BUCKET_NAME", "bucket");

        assert_eq!(
            PipelineConfig::from_env().unwrap_err(),
            ConfigError::Missing("RAPIDAPI_KEY")
        );
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        std::env::set_var("RAPIDAPI_KEY", "secret");
        std::env::set_var("S3_BUCKET_NAME", "bucket");
        std::env::set_var("HIGHLIGHTS_DATE", "2024-05-01");

        let config = PipelineConfig::from_env().unwrap();
        assert_eq!(config.api.timeout_secs, 120);
        assert_eq!(config.query.date, "2024-05-01");
        assert_eq!(config.query.league, "NCAA");
        assert_eq!(config.storage.region, "us-east-1");
        assert_eq!(config.storage.table, "SportsHighlights");
        assert_eq!(config.retry.retry_count, 3);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_unparsable_number() {
        clear_env();
        std::env::set_var("RAPIDAPI_KEY", "secret");
        std::env::set_var("S3_BUCKET_NAME", "bucket");
        std::env::set_var("HIGHLIGHTS_LIMIT", "ten");

        let err = PipelineConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "HIGHLIGHTS_LIMIT", .. }));
        clear_env();
    }

    #[test]
    fn test_validate_rejects_bad_date() {
        let mut config = sample();
        config.query.date = "05/01/2024".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { name: "HIGHLIGHTS_DATE", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_retries() {
        let mut config = sample();
        config.retry.retry_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_table_polls() {
        let mut config = sample();
        config.storage.table_ready_max_polls = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::invalid("TABLE_READY_MAX_POLLS", "must be at least 1"))
        );
    }

    #[test]
    fn test_validate_rejects_half_credentials() {
        let mut config = sample();
        config.storage.access_key = Some("AKIA".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let rendered = format!("{:?}", sample().api);
        assert!(!rendered.contains("test-key"));
    }
}
