use std::str::FromStr;
use std::time::Duration;

use beacon_push::dispatcher::{DEFAULT_ANDROID_COLOR, DEFAULT_ANDROID_ICON};
use beacon_push::fcm::DEFAULT_FCM_ENDPOINT;
use beacon_push::{DispatchConfig, PipelineConfig, PruningPolicy};

/// Error raised while reading configuration at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Read a variable, falling back to `default` when it is unset.
fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}

/// Read a duration in whole seconds that must not be zero.
fn positive_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match parse_or(lookup, var, default.as_secs())? {
        0 => Err(ConfigError::Invalid {
            var,
            value: "0".into(),
            reason: "must be at least 1 second".into(),
        }),
        secs => Ok(Duration::from_secs(secs)),
    }
}

/// Read an optional string variable; empty values count as unset.
fn optional(lookup: &impl Fn(&str) -> Option<String>, var: &str) -> Option<String> {
    lookup(var).filter(|v| !v.trim().is_empty())
}

fn env_lookup(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("expected 'text' or 'json', got '{other}'")),
        }
    }
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    pub log_format: LogFormat,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default   |
    /// |------------------------|-----------|
    /// | `HOST`                 | `0.0.0.0` |
    /// | `PORT`                 | `3000`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`      |
    /// | `LOG_FORMAT`           | `text`    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&lookup, "PORT", 3000)?,
            request_timeout_secs: parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 30)?,
            log_format: parse_or(&lookup, "LOG_FORMAT", LogFormat::Text)?,
        })
    }
}

// ---------------------------------------------------------------------------
// DatabaseConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    /// | Env Var              | Default  |
    /// |----------------------|----------|
    /// | `DATABASE_URL`       | required |
    /// | `DB_MAX_CONNECTIONS` | `10`     |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            url: optional(&lookup, "DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?,
        })
    }
}

// ---------------------------------------------------------------------------
// PushConfig
// ---------------------------------------------------------------------------

/// How the service authenticates against FCM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FcmCredentials {
    /// Path to a service-account JSON key.
    ServiceAccount(String),
    /// Fixed bearer token (emulators, local testing).
    Static(String),
}

/// FCM provider settings.
#[derive(Debug, Clone)]
pub struct FcmSettings {
    /// Explicit project id; when `None` the service-account key's is used.
    pub project_id: Option<String>,
    pub endpoint: String,
    pub credentials: FcmCredentials,
}

/// Fan-out, pruning and provider settings.
#[derive(Debug, Clone)]
pub struct PushConfig {
    pub dispatch: DispatchConfig,
    pub pipeline: PipelineConfig,
    pub policy: PruningPolicy,
    pub fcm: FcmSettings,
}

impl PushConfig {
    /// Load push settings from environment variables.
    ///
    /// | Env Var                          | Default                        |
    /// |----------------------------------|--------------------------------|
    /// | `FCM_PROJECT_ID`                 | project of the service account |
    /// | `GOOGLE_APPLICATION_CREDENTIALS` | required unless a token is set |
    /// | `FCM_ACCESS_TOKEN`               | unset                          |
    /// | `FCM_ENDPOINT`                   | `https://fcm.googleapis.com`   |
    /// | `PUSH_MAX_CONCURRENT_SENDS`      | `16`                           |
    /// | `PUSH_SEND_TIMEOUT_SECS`         | `10`                           |
    /// | `PUSH_REQUEST_DEADLINE_SECS`     | `25`                           |
    /// | `PUSH_PRUNING_POLICY`            | `conservative`                 |
    /// | `PUSH_MAX_WRITE_ATTEMPTS`        | `3`                            |
    /// | `PUSH_WRITE_TIMEOUT_SECS`        | `4`                            |
    /// | `ANDROID_NOTIFICATION_ICON`      | built-in icon URL              |
    /// | `ANDROID_NOTIFICATION_COLOR`     | `#4CB050`                      |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let dispatch_defaults = DispatchConfig::default();
        let pipeline_defaults = PipelineConfig::default();

        let max_concurrent_sends: usize = parse_or(
            &lookup,
            "PUSH_MAX_CONCURRENT_SENDS",
            dispatch_defaults.max_concurrent_sends,
        )?;
        if max_concurrent_sends == 0 {
            return Err(ConfigError::Invalid {
                var: "PUSH_MAX_CONCURRENT_SENDS",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }
        let send_timeout = positive_secs(
            &lookup,
            "PUSH_SEND_TIMEOUT_SECS",
            dispatch_defaults.send_timeout,
        )?;

        let dispatch = DispatchConfig {
            max_concurrent_sends,
            send_timeout,
            android_icon: Some(
                optional(&lookup, "ANDROID_NOTIFICATION_ICON")
                    .unwrap_or_else(|| DEFAULT_ANDROID_ICON.to_string()),
            ),
            android_color: Some(
                optional(&lookup, "ANDROID_NOTIFICATION_COLOR")
                    .unwrap_or_else(|| DEFAULT_ANDROID_COLOR.to_string()),
            ),
        };
        let pipeline = PipelineConfig {
            request_deadline: positive_secs(
                &lookup,
                "PUSH_REQUEST_DEADLINE_SECS",
                pipeline_defaults.request_deadline,
            )?,
            max_write_attempts: parse_or(
                &lookup,
                "PUSH_MAX_WRITE_ATTEMPTS",
                pipeline_defaults.max_write_attempts,
            )?,
            write_timeout: positive_secs(
                &lookup,
                "PUSH_WRITE_TIMEOUT_SECS",
                pipeline_defaults.write_timeout,
            )?,
        };

        let credentials = match (
            optional(&lookup, "FCM_ACCESS_TOKEN"),
            optional(&lookup, "GOOGLE_APPLICATION_CREDENTIALS"),
        ) {
            (Some(token), _) => FcmCredentials::Static(token),
            (None, Some(path)) => FcmCredentials::ServiceAccount(path),
            (None, None) => return Err(ConfigError::Missing("GOOGLE_APPLICATION_CREDENTIALS")),
        };
        let fcm = FcmSettings {
            project_id: optional(&lookup, "FCM_PROJECT_ID"),
            endpoint: optional(&lookup, "FCM_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_FCM_ENDPOINT.to_string()),
            credentials,
        };

        Ok(Self {
            dispatch,
            pipeline,
            policy: parse_or(&lookup, "PUSH_PRUNING_POLICY", PruningPolicy::default())?,
            fcm,
        })
    }

    /// Check that a push finishes, write-back included, before the HTTP
    /// timeout cancels the request.
    ///
    /// `request_deadline + write_timeout` must stay strictly below
    /// `REQUEST_TIMEOUT_SECS`.
    pub fn check_request_timeout(&self, server: &ServerConfig) -> Result<(), ConfigError> {
        let http_timeout = Duration::from_secs(server.request_timeout_secs);
        let push_budget = self.pipeline.request_deadline + self.pipeline.write_timeout;
        if push_budget >= http_timeout {
            return Err(ConfigError::Invalid {
                var: "PUSH_REQUEST_DEADLINE_SECS",
                value: self.pipeline.request_deadline.as_secs().to_string(),
                reason: format!(
                    "deadline plus PUSH_WRITE_TIMEOUT_SECS ({}s) must be below \
                     REQUEST_TIMEOUT_SECS ({}s)",
                    self.pipeline.write_timeout.as_secs(),
                    server.request_timeout_secs
                ),
            });
        }
        Ok(())
    }
}
