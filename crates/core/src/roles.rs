//! Role levels and their total order.
//!
//! Stored as lowercase text in `roles.role`. Sufficiency is always a rank
//! comparison: a grant satisfies a requirement when its rank is greater than
//! or equal to the required rank.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_OWNER: &str = "owner";
pub const ROLE_EDITOR: &str = "editor";
pub const ROLE_VIEWER: &str = "viewer";

/// Access level carried by a role grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleLevel {
    Viewer,
    Editor,
    Owner,
    Admin,
}

impl RoleLevel {
    /// All levels, lowest first.
    pub const ALL: [RoleLevel; 4] = [
        RoleLevel::Viewer,
        RoleLevel::Editor,
        RoleLevel::Owner,
        RoleLevel::Admin,
    ];

    /// Numeric rank: admin=4 > owner=3 > editor=2 > viewer=1.
    pub fn rank(self) -> u8 {
        match self {
            RoleLevel::Viewer => 1,
            RoleLevel::Editor => 2,
            RoleLevel::Owner => 3,
            RoleLevel::Admin => 4,
        }
    }

    /// Whether a grant at this level is enough for `required`.
    pub fn satisfies(self, required: RoleLevel) -> bool {
        self.rank() >= required.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RoleLevel::Viewer => ROLE_VIEWER,
            RoleLevel::Editor => ROLE_EDITOR,
            RoleLevel::Owner => ROLE_OWNER,
            RoleLevel::Admin => ROLE_ADMIN,
        }
    }
}

impl fmt::Display for RoleLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleLevel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ROLE_VIEWER => Ok(RoleLevel::Viewer),
            ROLE_EDITOR => Ok(RoleLevel::Editor),
            ROLE_OWNER => Ok(RoleLevel::Owner),
            ROLE_ADMIN => Ok(RoleLevel::Admin),
            other => Err(CoreError::Validation(format!(
                "Unknown role '{other}'. Must be one of: viewer, editor, owner, admin"
            ))),
        }
    }
}

impl TryFrom<String> for RoleLevel {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_are_strictly_increasing() {
        let ranks: Vec<u8> = RoleLevel::ALL.iter().map(|r| r.rank()).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
    }

    #[test]
    fn satisfies_is_monotone() {
        for granted in RoleLevel::ALL {
            for required in RoleLevel::ALL {
                assert_eq!(granted.satisfies(required), granted.rank() >= required.rank());
            }
        }
        assert!(RoleLevel::Admin.satisfies(RoleLevel::Viewer));
        assert!(!RoleLevel::Viewer.satisfies(RoleLevel::Editor));
    }

    #[test]
    fn parses_lowercase_names_only() {
        assert_eq!("owner".parse::<RoleLevel>().unwrap(), RoleLevel::Owner);
        assert!("Owner".parse::<RoleLevel>().is_err());
        assert!("superuser".parse::<RoleLevel>().is_err());
    }

    #[test]
    fn serde_uses_lowercase() {
        let json = serde_json::to_string(&RoleLevel::Editor).unwrap();
        assert_eq!(json, "\"editor\"");
    }
}
