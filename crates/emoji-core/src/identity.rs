//! Authenticated identities and their capabilities.

use serde::{Deserialize, Serialize};

use crate::UserId;

/// An authenticated caller, as established at session start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable user ID from the identity provider.
    pub user_id: UserId,

    /// Verified primary email, if the provider supplied one.
    pub email: Option<String>,

    /// Capabilities granted to this session.
    pub capabilities: Capabilities,
}

impl Identity {
    /// An identity without elevated capabilities.
    #[must_use]
    pub fn user(user_id: UserId) -> Self {
        Self {
            user_id,
            email: None,
            capabilities: Capabilities::default(),
        }
    }

    /// An identity with the admin capability.
    #[must_use]
    pub fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            email: None,
            capabilities: Capabilities { admin: true },
        }
    }

    /// Whether the session may soft-delete and see deleted content.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        self.capabilities.admin
    }
}

/// Capability flags attached to an identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Soft-delete and view deleted artifacts.
    pub admin: bool,
}
