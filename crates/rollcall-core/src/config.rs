//! Application configuration management.
//!
//! Configuration is layered with the `config` crate:
//!
//! 1. Built-in defaults ([`Config::default`])
//! 2. A TOML file (`/etc/rollcall/config.toml` on Linux, the platform config
//!    directory elsewhere)
//! 3. Environment variables prefixed `ROLLCALL__`, with `__` between nested
//!    keys, e.g. `ROLLCALL__POLICY__GEOFENCE_RADIUS_METERS=75`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested configuration file does not exist.
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    /// The configuration sources could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] ::config::ConfigError),

    /// A single field holds an invalid value.
    #[error("Invalid value for '{field}': {message}")]
    ValidationError {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields are invalid.
    #[error("{} configuration fields are invalid", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Largest accepted attendance threshold: one week, in minutes.
pub const MAX_THRESHOLD_MINUTES: i64 = 7 * 24 * 60;

/// Rules deciding when a check-in counts as on time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttendancePolicy {
    /// Radius of the venue geofence.
    pub geofence_radius_meters: f64,

    /// Minutes either side of the start during which a check-in is on time.
    pub on_time_threshold_minutes: i64,

    /// Minutes after the start until which a late reason may be filed before
    /// the session counts as expired.
    pub late_threshold_minutes: i64,
}

impl Default for AttendancePolicy {
    fn default() -> Self {
        Self {
            geofence_radius_meters: 50.0,
            on_time_threshold_minutes: 10,
            late_threshold_minutes: 30,
        }
    }
}

impl AttendancePolicy {
    /// The on-time threshold as a duration, saturating out of range.
    #[must_use]
    pub fn on_time_threshold(&self) -> chrono::Duration {
        saturating_minutes(self.on_time_threshold_minutes)
    }

    /// The late threshold as a duration, saturating out of range.
    #[must_use]
    pub fn late_threshold(&self) -> chrono::Duration {
        saturating_minutes(self.late_threshold_minutes)
    }
}

fn saturating_minutes(minutes: i64) -> chrono::Duration {
    chrono::Duration::try_minutes(minutes).unwrap_or(if minutes < 0 {
        chrono::Duration::MIN
    } else {
        chrono::Duration::MAX
    })
}

/// Location behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// Oldest cached fix the coordinator will send with a check-in before it
    /// asks the platform for a fresh one.
    pub max_fix_age_secs: u64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            max_fix_age_secs: 30,
        }
    }
}

impl LocationConfig {
    /// Maximum fix age as a duration.
    #[must_use]
    pub const fn max_fix_age(&self) -> Duration {
        Duration::from_secs(self.max_fix_age_secs)
    }
}

/// HTTP bridge listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub bind_address: String,

    /// Port to bind.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Club backend that records attendance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the club API, e.g. `https://club.example.com/api/`.
    pub base_url: String,

    /// Bearer token sent with every request.
    #[serde(skip_serializing)]
    pub api_token: Option<String>,

    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/api/".to_string(),
            api_token: None,
            timeout_secs: 15,
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Check-in timing and geofence rules.
    pub policy: AttendancePolicy,

    /// Location freshness.
    pub location: LocationConfig,

    /// Bridge listener.
    pub server: ServerConfig,

    /// Club backend.
    pub upstream: UpstreamConfig,
}

impl Config {
    /// Load configuration from defaults, a file and the environment.
    ///
    /// When `path` is `None` the platform default file is used if it exists.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if `path` is given but missing, a
    /// load error if any source fails to parse, or validation errors.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut builder = ::config::Config::builder();

        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound(path.display().to_string()));
                }
                builder = builder.add_source(::config::File::from(path).required(true));
            }
            None => {
                if let Some(default_path) = default_config_path() {
                    builder =
                        builder.add_source(::config::File::from(default_path).required(false));
                }
            }
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix("ROLLCALL")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every field, collecting all problems.
    ///
    /// # Errors
    ///
    /// Returns the single error, or [`ConfigError::MultipleValidationErrors`].
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();

        if !(self.policy.geofence_radius_meters.is_finite()
            && self.policy.geofence_radius_meters > 0.0)
        {
            errors.push(ConfigError::ValidationError {
                field: "policy.geofence_radius_meters",
                message: format!(
                    "must be a positive number of meters (got {})",
                    self.policy.geofence_radius_meters
                ),
            });
        }
        if !(1..=MAX_THRESHOLD_MINUTES).contains(&self.policy.on_time_threshold_minutes) {
            errors.push(ConfigError::ValidationError {
                field: "policy.on_time_threshold_minutes",
                message: format!(
                    "must be between 1 and {MAX_THRESHOLD_MINUTES} (got {})",
                    self.policy.on_time_threshold_minutes
                ),
            });
        }
        if self.policy.late_threshold_minutes > MAX_THRESHOLD_MINUTES {
            errors.push(ConfigError::ValidationError {
                field: "policy.late_threshold_minutes",
                message: format!(
                    "must be at most {MAX_THRESHOLD_MINUTES} (got {})",
                    self.policy.late_threshold_minutes
                ),
            });
        } else if self.policy.late_threshold_minutes < self.policy.on_time_threshold_minutes {
            errors.push(ConfigError::ValidationError {
                field: "policy.late_threshold_minutes",
                message: format!(
                    "must not be shorter than the on-time threshold ({} < {})",
                    self.policy.late_threshold_minutes, self.policy.on_time_threshold_minutes
                ),
            });
        }
        if self.server.port == 0 {
            errors.push(ConfigError::ValidationError {
                field: "server.port",
                message: "must be between 1 and 65535".to_string(),
            });
        }
        if let Err(e) = url::Url::parse(&self.upstream.base_url) {
            errors.push(ConfigError::ValidationError {
                field: "upstream.base_url",
                message: e.to_string(),
            });
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }
}

/// Returns the platform default configuration file path.
///
/// Linux deployments read `/etc/rollcall/config.toml`; other platforms use the
/// per-user config directory.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        Some(PathBuf::from("/etc/rollcall/config.toml"))
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "rollcall")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_policy_constants() {
        let policy = AttendancePolicy::default();
        assert!((policy.geofence_radius_meters - 50.0).abs() < f64::EPSILON);
        assert_eq!(policy.on_time_threshold(), chrono::Duration::minutes(10));
        assert_eq!(policy.late_threshold(), chrono::Duration::minutes(30));
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = Config::default();
        config.policy.geofence_radius_meters = -1.0;
        config.server.port = 0;

        match config.validate() {
            Err(ConfigError::MultipleValidationErrors(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }

    #[test]
    fn test_late_threshold_must_cover_on_time() {
        let mut config = Config::default();
        config.policy.late_threshold_minutes = 5;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("policy.late_threshold_minutes"));
    }

    #[test]
    fn test_thresholds_above_one_week_are_rejected() {
        let mut config = Config::default();
        config.policy.on_time_threshold_minutes = i64::MAX / 2;
        config.policy.late_threshold_minutes = i64::MAX / 2;

        match config.validate() {
            Err(ConfigError::MultipleValidationErrors(errors)) => {
                assert_eq!(errors.len(), 2);
                assert!(errors[0].to_string().contains("policy.on_time_threshold_minutes"));
                assert!(errors[1].to_string().contains("policy.late_threshold_minutes"));
            }
            other => panic!("expected two threshold errors, got {other:?}"),
        }

        config.policy.on_time_threshold_minutes = MAX_THRESHOLD_MINUTES;
        config.policy.late_threshold_minutes = MAX_THRESHOLD_MINUTES;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_huge_thresholds_saturate() {
        let policy = AttendancePolicy {
            on_time_threshold_minutes: i64::MAX / 2,
            late_threshold_minutes: i64::MIN / 2,
            ..AttendancePolicy::default()
        };
        assert_eq!(policy.on_time_threshold(), chrono::Duration::MAX);
        assert_eq!(policy.late_threshold(), chrono::Duration::MIN);
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[policy]\ngeofence_radius_meters = 75.0\n\n[server]\nport = 4100"
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert!((config.policy.geofence_radius_meters - 75.0).abs() < f64::EPSILON);
        assert_eq!(config.policy.on_time_threshold_minutes, 10);
        assert_eq!(config.server.port, 4100);
    }

    #[test]
    fn test_load_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");

        assert!(matches!(
            Config::load(Some(&missing)),
            Err(ConfigError::NotFound(_))
        ));
    }
}
