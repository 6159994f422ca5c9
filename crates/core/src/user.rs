use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Submitter,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Submitter => "submitter",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "admin" => Ok(Self::Admin),
            "submitter" => Ok(Self::Submitter),
            _ => Err(CoreError::InvalidData(format!("unknown role: {s}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub role: Role,
    pub display_name: String,
}

impl User {
    pub fn new(email: impl Into<String>, role: Role, display_name: impl Into<String>) -> Self {
        Self {
            id: UserId::new(),
            email: email.into(),
            role,
            display_name: display_name.into(),
        }
    }

    pub fn principal(&self) -> Principal {
        Principal {
            user_id: self.id,
            role: self.role,
        }
    }
}

/// The acting identity a store call is made on behalf of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Admins reach every row; submitters only rows they own.
    pub fn can_access(&self, owner_id: UserId) -> bool {
        self.is_admin() || self.user_id == owner_id
    }
}
