//! Error types for Reclaim operations

use crate::Resource;
use thiserror::Error;

/// Backend gateway errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Transport failure calling {path}: {reason}")]
    Transport { path: String, reason: String },

    #[error("Request to {path} failed with status {status}: {body}")]
    Status {
        path: String,
        status: u16,
        body: String,
    },

    #[error("Unauthorized request to {path}")]
    Unauthorized { path: String },

    #[error("Invalid response from {path}: {reason}")]
    InvalidResponse { path: String, reason: String },

    #[error("Role {role} may not call {resource:?}")]
    RoleMismatch { role: String, resource: Resource },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or RECLAIM_CONFIG)")]
    MissingConfigPath,

    #[error("Failed to read config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config TOML: {reason}")]
    Parse { reason: String },

    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Cross-tab broadcast errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BroadcastError {
    #[error("Shared store lock poisoned")]
    LockPoisoned,

    #[error("Broadcast channel closed")]
    Closed,
}

/// Master error type for all Reclaim errors.
#[derive(Debug, Clone, Error)]
pub enum ReclaimError {
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Broadcast error: {0}")]
    Broadcast(#[from] BroadcastError),
}

impl ReclaimError {
    /// True when the backend rejected the session's credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Gateway(GatewayError::Unauthorized { .. }))
    }
}

/// Result type alias for Reclaim operations.
pub type ReclaimResult<T> = Result<T, ReclaimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_error_display_status() {
        let err = GatewayError::Status {
            path: "/admin/pickups".to_string(),
            status: 503,
            body: "maintenance".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("/admin/pickups"));
        assert!(msg.contains("503"));
        assert!(msg.contains("maintenance"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "polling.max_interval_ms",
            reason: "must be > 0".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("polling.max_interval_ms"));
        assert!(msg.contains("must be > 0"));
    }

    #[test]
    fn test_unauthorized_detection() {
        let err: ReclaimError = GatewayError::Unauthorized {
            path: "/bookings".to_string(),
        }
        .into();
        assert!(err.is_unauthorized());

        let err: ReclaimError = BroadcastError::Closed.into();
        assert!(!err.is_unauthorized());
    }
}
