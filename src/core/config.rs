use std::env;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Environment {
    Development,
    Test,
    Production,
}

impl Environment {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Test => "test",
            Environment::Production => "production",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Settings {
    runtime: RuntimeSettings,
    database: DatabaseSettings,
    redis: RedisSettings,
    grading: GradingSettings,
    consumer: ConsumerSettings,
    images: ImageSettings,
    telemetry: TelemetrySettings,
}

#[derive(Debug, Clone)]
pub(crate) struct RuntimeSettings {
    pub(crate) environment: Environment,
}

#[derive(Debug, Clone)]
pub(crate) struct DatabaseSettings {
    pub(crate) postgres_server: String,
    pub(crate) postgres_port: u16,
    pub(crate) postgres_user: String,
    pub(crate) postgres_password: String,
    pub(crate) postgres_db: String,
    pub(crate) database_url: Option<String>,
}

impl DatabaseSettings {
    pub(crate) fn database_url(&self) -> String {
        if let Some(url) = &self.database_url {
            return url.clone();
        }
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.postgres_user,
            self.postgres_password,
            self.postgres_server,
            self.postgres_port,
            self.postgres_db
        )
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RedisSettings {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) db: u16,
    pub(crate) password: String,
}

impl RedisSettings {
    pub(crate) fn redis_url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}:{}/{}", self.host, self.port, self.db)
        } else {
            format!("redis://:{}@{}:{}/{}", self.password, self.host, self.port, self.db)
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct GradingSettings {
    pub(crate) confidence_threshold: f64,
    pub(crate) lock_wait_seconds: u64,
    pub(crate) lock_lease_seconds: u64,
    pub(crate) question_cache_ttl_seconds: u64,
}

impl GradingSettings {
    pub(crate) fn lock_wait(&self) -> Duration {
        Duration::from_secs(self.lock_wait_seconds)
    }

    pub(crate) fn lock_lease(&self) -> Duration {
        Duration::from_secs(self.lock_lease_seconds)
    }

    pub(crate) fn question_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.question_cache_ttl_seconds)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ConsumerSettings {
    pub(crate) poll_interval_ms: u64,
    pub(crate) pending_retry_interval_seconds: u64,
    pub(crate) pending_max_attempts: u32,
}

impl ConsumerSettings {
    pub(crate) fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub(crate) fn pending_retry_interval(&self) -> Duration {
        Duration::from_secs(self.pending_retry_interval_seconds)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ImageSettings {
    pub(crate) image_dir: String,
    pub(crate) student_id_cache_ttl_seconds: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct TelemetrySettings {
    pub(crate) log_level: String,
    pub(crate) json: bool,
    pub(crate) prometheus_enabled: bool,
    pub(crate) prometheus_addr: String,
}

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let environment = parse_environment(
            env_optional("GRADEFLOW_ENV").or_else(|| env_optional("ENVIRONMENT")),
        );

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "gradeflow");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "gradeflow_db");
        let database_url = env_optional("DATABASE_URL");

        let redis_host = env_or_default("REDIS_HOST", "localhost");
        let redis_port = parse_u16("REDIS_PORT", env_or_default("REDIS_PORT", "6379"))?;
        let redis_db = parse_u16("REDIS_DB", env_or_default("REDIS_DB", "0"))?;
        let redis_password = env_or_default("REDIS_PASSWORD", "");

        let confidence_threshold = parse_f64(
            "GRADING_CONFIDENCE_THRESHOLD",
            env_or_default("GRADING_CONFIDENCE_THRESHOLD", "0.85"),
        )?;
        let lock_wait_seconds = parse_u64(
            "GRADING_LOCK_WAIT_SECONDS",
            env_or_default("GRADING_LOCK_WAIT_SECONDS", "5"),
        )?;
        let lock_lease_seconds = parse_u64(
            "GRADING_LOCK_LEASE_SECONDS",
            env_or_default("GRADING_LOCK_LEASE_SECONDS", "60"),
        )?;
        let question_cache_ttl_seconds = parse_u64(
            "QUESTION_CACHE_TTL_SECONDS",
            env_or_default("QUESTION_CACHE_TTL_SECONDS", "1800"),
        )?;

        let poll_interval_ms = parse_u64(
            "CONSUMER_POLL_INTERVAL_MS",
            env_or_default("CONSUMER_POLL_INTERVAL_MS", "500"),
        )?;
        let pending_retry_interval_seconds = parse_u64(
            "PENDING_RETRY_INTERVAL_SECONDS",
            env_or_default("PENDING_RETRY_INTERVAL_SECONDS", "5"),
        )?;
        let pending_max_attempts =
            parse_u32("PENDING_MAX_ATTEMPTS", env_or_default("PENDING_MAX_ATTEMPTS", "5"))?;

        let image_dir = env_or_default("IMAGE_DIR", "data/images");
        let student_id_cache_ttl_seconds = parse_u64(
            "STUDENT_ID_CACHE_TTL_SECONDS",
            env_or_default("STUDENT_ID_CACHE_TTL_SECONDS", "600"),
        )?;

        let log_level = env_or_default("LOG_LEVEL", "info");
        let telemetry_json =
            env_optional("LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(true);
        let prometheus_addr = env_or_default("PROMETHEUS_ADDR", "0.0.0.0:9000");

        let settings = Settings {
            runtime: RuntimeSettings { environment },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
            },
            redis: RedisSettings {
                host: redis_host,
                port: redis_port,
                db: redis_db,
                password: redis_password,
            },
            grading: GradingSettings {
                confidence_threshold,
                lock_wait_seconds,
                lock_lease_seconds,
                question_cache_ttl_seconds,
            },
            consumer: ConsumerSettings {
                poll_interval_ms,
                pending_retry_interval_seconds,
                pending_max_attempts,
            },
            images: ImageSettings { image_dir, student_id_cache_ttl_seconds },
            telemetry: TelemetrySettings {
                log_level,
                json: telemetry_json,
                prometheus_enabled,
                prometheus_addr,
            },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn redis(&self) -> &RedisSettings {
        &self.redis
    }

    pub(crate) fn grading(&self) -> &GradingSettings {
        &self.grading
    }

    pub(crate) fn consumer(&self) -> &ConsumerSettings {
        &self.consumer
    }

    pub(crate) fn images(&self) -> &ImageSettings {
        &self.images
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.grading.confidence_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "GRADING_CONFIDENCE_THRESHOLD",
                value: self.grading.confidence_threshold.to_string(),
            });
        }
        if self.grading.lock_lease_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "GRADING_LOCK_LEASE_SECONDS",
                value: String::from("0"),
            });
        }
        Ok(())
    }
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn env_or_default(key: &str, default: &str) -> String {
    env_optional(key).unwrap_or_else(|| default.to_string())
}

fn parse_u16(field: &'static str, value: String) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidValue { field, value })
}

fn parse_u32(field: &'static str, value: String) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidValue { field, value })
}

fn parse_u64(field: &'static str, value: String) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidValue { field, value })
}

fn parse_f64(field: &'static str, value: String) -> Result<f64, ConfigError> {
    value.parse::<f64>().map_err(|_| ConfigError::InvalidValue { field, value })
}

fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "yes" | "YES" | "on" | "ON")
}

fn parse_environment(value: Option<String>) -> Environment {
    match value.as_deref() {
        Some("production") | Some("prod") => Environment::Production,
        Some("test") => Environment::Test,
        _ => Environment::Development,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redis_url_without_password_omits_auth() {
        let redis = RedisSettings {
            host: "localhost".to_string(),
            port: 6379,
            db: 2,
            password: String::new(),
        };
        assert_eq!(redis.redis_url(), "redis://localhost:6379/2");
    }

    #[test]
    fn redis_url_with_password_includes_auth() {
        let redis = RedisSettings {
            host: "cache".to_string(),
            port: 6380,
            db: 0,
            password: "secret".to_string(),
        };
        assert_eq!(redis.redis_url(), "redis://:secret@cache:6380/0");
    }

    #[test]
    fn database_url_prefers_explicit_url() {
        let database = DatabaseSettings {
            postgres_server: "db".to_string(),
            postgres_port: 5432,
            postgres_user: "user".to_string(),
            postgres_password: "pass".to_string(),
            postgres_db: "grading".to_string(),
            database_url: Some("postgresql://explicit/url".to_string()),
        };
        assert_eq!(database.database_url(), "postgresql://explicit/url");
    }

    #[test]
    fn confidence_threshold_outside_unit_range_is_rejected() {
        let database = DatabaseSettings {
            postgres_server: String::new(),
            postgres_port: 5432,
            postgres_user: String::new(),
            postgres_password: String::new(),
            postgres_db: String::new(),
            database_url: None,
        };
        let settings = Settings {
            runtime: RuntimeSettings { environment: Environment::Test },
            database,
            redis: RedisSettings {
                host: String::new(),
                port: 6379,
                db: 0,
                password: String::new(),
            },
            grading: GradingSettings {
                confidence_threshold: 1.5,
                lock_wait_seconds: 5,
                lock_lease_seconds: 60,
                question_cache_ttl_seconds: 1800,
            },
            consumer: ConsumerSettings {
                poll_interval_ms: 500,
                pending_retry_interval_seconds: 5,
                pending_max_attempts: 5,
            },
            images: ImageSettings {
                image_dir: String::new(),
                student_id_cache_ttl_seconds: 600,
            },
            telemetry: TelemetrySettings {
                log_level: "info".to_string(),
                json: false,
                prometheus_enabled: false,
                prometheus_addr: "0.0.0.0:9000".to_string(),
            },
        };
        assert!(settings.validate().is_err());
    }
}
