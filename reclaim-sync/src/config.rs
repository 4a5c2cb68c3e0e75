//! Configuration loading for the Reclaim sync client.
//!
//! Connection and auth fields are required. Polling, cache and broadcast
//! sections fall back to the values the backend was tuned for.

use reclaim_core::{ConfigError, Identity, Resource, Role};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::broadcast::REFRESH_MARKER_KEY;
use crate::poller::PollerConfig;
use crate::telemetry::LogFormat;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    pub api_base_url: String,
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub log_format: LogFormat,
    pub auth: AuthConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub cache: CacheTtlConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    pub username: String,
    pub role: Role,
    pub bearer_token: String,
}

impl AuthConfig {
    pub fn identity(&self) -> Identity {
        Identity::new(self.username.clone(), self.role)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollingConfig {
    pub delivery_interval_ms: u64,
    pub admin_interval_ms: u64,
    pub user_interval_ms: u64,
    pub max_interval_ms: u64,
    pub activity_threshold_ms: u64,
    /// Run one refresh cycle as soon as an identity is bound.
    pub refresh_on_start: bool,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            delivery_interval_ms: Role::Delivery.base_interval().as_millis() as u64,
            admin_interval_ms: Role::Admin.base_interval().as_millis() as u64,
            user_interval_ms: Role::User.base_interval().as_millis() as u64,
            max_interval_ms: 30_000,
            activity_threshold_ms: 30_000,
            refresh_on_start: true,
        }
    }
}

impl PollingConfig {
    pub fn base_interval(&self, role: Role) -> Duration {
        let ms = match role {
            Role::Delivery => self.delivery_interval_ms,
            Role::Admin => self.admin_interval_ms,
            Role::User => self.user_interval_ms,
        };
        Duration::from_millis(ms)
    }

    /// Poller settings for a session bound to `role`.
    pub fn poller_config(&self, role: Role) -> PollerConfig {
        PollerConfig::new(self.base_interval(role))
            .with_max_interval(Duration::from_millis(self.max_interval_ms))
            .with_activity_threshold(Duration::from_millis(self.activity_threshold_ms))
            .with_fire_immediately(self.refresh_on_start)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheTtlConfig {
    pub enabled: bool,
    pub max_size: usize,
    pub assignments_ttl_ms: u64,
    pub pickups_ttl_ms: u64,
    pub dashboard_ttl_ms: u64,
    pub bookings_ttl_ms: u64,
    pub points_balance_ttl_ms: u64,
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: 100,
            assignments_ttl_ms: 15_000,
            pickups_ttl_ms: 10_000,
            dashboard_ttl_ms: 30_000,
            bookings_ttl_ms: 10_000,
            points_balance_ttl_ms: 15_000,
        }
    }
}

impl CacheTtlConfig {
    pub fn ttl_for(&self, resource: Resource) -> Duration {
        let ms = match resource {
            Resource::Assignments => self.assignments_ttl_ms,
            Resource::Pickups => self.pickups_ttl_ms,
            Resource::Dashboard => self.dashboard_ttl_ms,
            Resource::Bookings => self.bookings_ttl_ms,
            Resource::PointsBalance => self.points_balance_ttl_ms,
        };
        Duration::from_millis(ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BroadcastConfig {
    pub marker_key: String,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            marker_key: REFRESH_MARKER_KEY.to_string(),
        }
    }
}

impl SyncConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must not be empty".to_string(),
            });
        }
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://")
        {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must start with http:// or https://".to_string(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.auth.username.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "auth.username",
                reason: "must not be empty".to_string(),
            });
        }
        if self.auth.bearer_token.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "auth.bearer_token",
                reason: "must not be empty".to_string(),
            });
        }
        for (field, value) in [
            ("polling.delivery_interval_ms", self.polling.delivery_interval_ms),
            ("polling.admin_interval_ms", self.polling.admin_interval_ms),
            ("polling.user_interval_ms", self.polling.user_interval_ms),
            ("polling.max_interval_ms", self.polling.max_interval_ms),
            ("polling.activity_threshold_ms", self.polling.activity_threshold_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be > 0".to_string(),
                });
            }
        }
        if self.cache.max_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.max_size",
                reason: "must be > 0".to_string(),
            });
        }
        for resource in Resource::ALL {
            if self.cache.ttl_for(resource).is_zero() {
                return Err(ConfigError::InvalidValue {
                    field: "cache.*_ttl_ms",
                    reason: format!("ttl for {} must be > 0", resource),
                });
            }
        }
        if self.broadcast.marker_key.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "broadcast.marker_key",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var("RECLAIM_CONFIG").ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
api_base_url = "http://localhost:8000"
request_timeout_ms = 10000

[auth]
username = "ravi"
role = "delivery"
bearer_token = "token"
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = SyncConfig::from_toml(MINIMAL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.auth.role, Role::Delivery);
        assert_eq!(config.polling, PollingConfig::default());
        assert_eq!(config.cache, CacheTtlConfig::default());
        assert_eq!(config.broadcast.marker_key, "e_waste_refresh_trigger");
        assert_eq!(config.log_format, LogFormat::Compact);
    }

    #[test]
    fn test_role_intervals_follow_config() {
        let polling = PollingConfig {
            admin_interval_ms: 1_500,
            ..PollingConfig::default()
        };
        assert_eq!(polling.base_interval(Role::Admin), Duration::from_millis(1_500));
        assert_eq!(polling.base_interval(Role::Delivery), Duration::from_secs(10));

        let poller = polling.poller_config(Role::User);
        assert_eq!(poller.base_interval, Duration::from_secs(20));
        assert_eq!(poller.max_interval, Duration::from_secs(30));
        assert!(poller.fire_immediately);
    }

    #[test]
    fn test_cache_ttls_match_resource_volatility() {
        let cache = CacheTtlConfig::default();
        assert_eq!(cache.ttl_for(Resource::Dashboard), Duration::from_secs(30));
        assert_eq!(cache.ttl_for(Resource::Bookings), Duration::from_secs(10));
        assert_eq!(cache.ttl_for(Resource::PointsBalance), Duration::from_secs(15));
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let toml = format!("{}\nrefresh_everything = true\n", MINIMAL);
        assert!(matches!(
            SyncConfig::from_toml(&toml),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = SyncConfig::from_toml(MINIMAL).unwrap();
        config.polling.max_interval_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "polling.max_interval_ms", .. })
        ));
    }

    #[test]
    fn test_base_url_scheme_required() {
        let mut config = SyncConfig::from_toml(MINIMAL).unwrap();
        config.api_base_url = "localhost:8000".to_string();
        assert!(config.validate().is_err());
    }
}
