//! Identity directory models: users, role profiles and pets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role carried by a user account. A single account may hold several.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Owner,
    Vet,
    Assistant,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "OWNER",
            Role::Vet => "VET",
            Role::Assistant => "ASSISTANT",
            Role::Admin => "ADMIN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OWNER" => Some(Role::Owner),
            "VET" => Some(Role::Vet),
            "ASSISTANT" => Some(Role::Assistant),
            "ADMIN" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// A login-bearing user account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    pub login: String,
    pub roles: Vec<Role>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a new user with a lowercased login.
    pub fn new(login: &str, roles: Vec<Role>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            login: login.trim().to_lowercase(),
            roles,
            created_at: super::now(),
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

/// Owner profile (the person who brings pets in).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Owner {
    pub id: String,
    pub user_id: String,
    pub name: String,
}

/// Vet profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vet {
    pub id: String,
    pub user_id: String,
    pub name: String,
}

/// Assistant profile. Assistants receive delegated work from vets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assistant {
    pub id: String,
    pub user_id: String,
    pub name: String,
}

macro_rules! profile_ctor {
    ($ty:ident) => {
        impl $ty {
            pub fn new(user_id: String, name: String) -> Self {
                Self {
                    id: uuid::Uuid::new_v4().to_string(),
                    user_id,
                    name,
                }
            }
        }
    };
}

profile_ctor!(Owner);
profile_ctor!(Vet);
profile_ctor!(Assistant);

/// A pet. The owner reference may be missing for strays brought in by staff.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pet {
    pub id: String,
    pub name: String,
    pub species: String,
    pub owner_id: Option<String>,
}

impl Pet {
    pub fn new(name: String, species: String, owner_id: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            species,
            owner_id,
        }
    }
}
