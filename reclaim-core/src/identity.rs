//! Session identity, role scopes and the resources each role refreshes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Polling interval used when no identity is bound.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Role of the authenticated identity. Determines which resources are
/// refreshed and how often.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Delivery,
    Admin,
    User,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Delivery, Role::Admin, Role::User];

    /// Base polling interval for this role.
    pub fn base_interval(&self) -> Duration {
        match self {
            Role::Delivery => Duration::from_secs(10),
            Role::Admin => Duration::from_secs(15),
            Role::User => Duration::from_secs(20),
        }
    }

    /// Resources refreshed on every cycle for this role.
    pub fn resources(&self) -> &'static [Resource] {
        match self {
            Role::Delivery => &[Resource::Assignments],
            Role::Admin => &[Resource::Pickups, Resource::Dashboard],
            Role::User => &[Resource::Bookings, Resource::PointsBalance],
        }
    }

    /// True if this role owns `resource`.
    pub fn owns(&self, resource: Resource) -> bool {
        resource.owner() == *self
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Delivery => "delivery",
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "delivery" => Ok(Role::Delivery),
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Base polling interval for an optional identity.
pub fn poll_interval_for(role: Option<Role>) -> Duration {
    role.map(|r| r.base_interval())
        .unwrap_or(DEFAULT_POLL_INTERVAL)
}

/// The authenticated identity a session is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub username: String,
    pub role: Role,
}

impl Identity {
    pub fn new(username: impl Into<String>, role: Role) -> Self {
        Self {
            username: username.into(),
            role,
        }
    }
}

/// A readable resource family exposed by the backend gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Assignments,
    Pickups,
    Dashboard,
    Bookings,
    PointsBalance,
}

impl Resource {
    pub const ALL: [Resource; 5] = [
        Resource::Assignments,
        Resource::Pickups,
        Resource::Dashboard,
        Resource::Bookings,
        Resource::PointsBalance,
    ];

    /// Role whose sessions refresh this resource.
    pub fn owner(&self) -> Role {
        match self {
            Resource::Assignments => Role::Delivery,
            Resource::Pickups | Resource::Dashboard => Role::Admin,
            Resource::Bookings | Resource::PointsBalance => Role::User,
        }
    }

    /// Gateway path for the read endpoint.
    pub fn path(&self) -> &'static str {
        match self {
            Resource::Assignments => "/delivery/assignments",
            Resource::Pickups => "/admin/pickups",
            Resource::Dashboard => "/dashboard",
            Resource::Bookings => "/bookings",
            Resource::PointsBalance => "/points/balance",
        }
    }

    /// Cache key used for the memoized read.
    pub fn cache_key(&self) -> &'static str {
        match self {
            Resource::Assignments => "delivery_assignments",
            Resource::Pickups => "admin_pickups",
            Resource::Dashboard => "dashboard",
            Resource::Bookings => "bookings",
            Resource::PointsBalance => "points_balance",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cache_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_intervals() {
        assert_eq!(poll_interval_for(Some(Role::Delivery)), Duration::from_secs(10));
        assert_eq!(poll_interval_for(Some(Role::Admin)), Duration::from_secs(15));
        assert_eq!(poll_interval_for(Some(Role::User)), Duration::from_secs(20));
        assert_eq!(poll_interval_for(None), Duration::from_secs(30));
    }

    #[test]
    fn test_role_resources_are_owned() {
        for role in Role::ALL {
            for resource in role.resources() {
                assert!(role.owns(*resource));
            }
        }
        assert_eq!(Role::Admin.resources(), &[Resource::Pickups, Resource::Dashboard]);
    }

    #[test]
    fn test_every_resource_has_an_owner_that_refreshes_it() {
        for resource in Resource::ALL {
            assert!(resource.owner().resources().contains(&resource));
        }
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("Admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!(" delivery ".parse::<Role>(), Ok(Role::Delivery));
        assert!("courier".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_serde_snake_case() {
        let json = serde_json::to_string(&Role::Delivery).unwrap();
        assert_eq!(json, "\"delivery\"");
    }
}
