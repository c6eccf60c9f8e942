//! Appointment workflow engine.
//!
//! Every state-changing operation runs inside one `BEGIN IMMEDIATE`
//! transaction: validation, conflict reads and all dependent writes commit
//! together or not at all. Owner notifications are sent after commit and
//! never fail the operation that triggered them.

mod conflict;
mod scheduler;
mod status;
mod ledger;
mod assistants;
mod messages;

pub use conflict::*;
pub use scheduler::*;
pub use status::*;
pub use ledger::*;
pub use assistants::*;
pub use lab_tests::*;
pub use messages::*;

use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db::{Database, DbError};
use crate::models::{Appointment, Assistant, Pet, User, Vet};

/// Kinds of records an operation can fail to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Appointment,
    Action,
    LabTest,
    Pet,
    Owner,
    Vet,
    Assistant,
    User,
    Creator,
    Assignee,
    Requester,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::Appointment => "Appointment",
            Entity::Action => "Appointment action",
            Entity::LabTest => "Lab test",
            Entity::Pet => "Pet",
            Entity::Owner => "Owner",
            Entity::Vet => "Vet",
            Entity::Assistant => "Assistant",
            Entity::User => "User",
            Entity::Creator => "Creator",
            Entity::Assignee => "Assignee",
            Entity::Requester => "Requester",
        };
        f.write_str(name)
    }
}

/// Whose calendar a conflict was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorKind {
    Vet,
    Assistant,
}

impl fmt::Display for ActorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActorKind::Vet => f.write_str("Vet"),
            ActorKind::Assistant => f.write_str("Assistant"),
        }
    }
}

/// Coarse error taxonomy surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    Conflict,
    NotAuthorized,
    IllegalTransition,
    Storage,
}

/// Workflow errors.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: Entity, id: String },

    #[error("Pet {0} has no owner")]
    PetHasNoOwner(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{actor} {actor_id} is not available in this time range (conflicts with {conflicting_start})")]
    Conflict {
        actor: ActorKind,
        actor_id: String,
        conflicting_start: DateTime<Utc>,
    },

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Illegal transition from {from} to {to}")]
    IllegalTransition { from: String, to: String },

    #[error("Appointment {0} is closed")]
    AppointmentClosed(String),
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::Database(_) => ErrorKind::Storage,
            WorkflowError::NotFound { .. } => ErrorKind::NotFound,
            WorkflowError::PetHasNoOwner(_) | WorkflowError::InvalidInput(_) => {
                ErrorKind::InvalidInput
            }
            WorkflowError::Conflict { .. } => ErrorKind::Conflict,
            WorkflowError::NotAuthorized(_) => ErrorKind::NotAuthorized,
            WorkflowError::IllegalTransition { .. } | WorkflowError::AppointmentClosed(_) => {
                ErrorKind::IllegalTransition
            }
        }
    }

    pub(crate) fn not_found(entity: Entity, id: impl Into<String>) -> Self {
        WorkflowError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub(crate) fn illegal(from: impl fmt::Display, to: impl fmt::Display) -> Self {
        WorkflowError::IllegalTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

impl From<serde_json::Error> for WorkflowError {
    fn from(err: serde_json::Error) -> Self {
        WorkflowError::Database(DbError::Json(err))
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Turn an optional lookup into a `NotFound` error.
pub(crate) fn found<T>(value: Option<T>, entity: Entity, id: &str) -> WorkflowResult<T> {
    value.ok_or_else(|| WorkflowError::not_found(entity, id))
}

pub(crate) fn require_appointment(db: &Database, id: &str) -> WorkflowResult<Appointment> {
    found(db.get_appointment(id)?, Entity::Appointment, id)
}

pub(crate) fn require_pet(db: &Database, id: &str) -> WorkflowResult<Pet> {
    found(db.get_pet(id)?, Entity::Pet, id)
}

pub(crate) fn require_user(db: &Database, login: &str, entity: Entity) -> WorkflowResult<User> {
    found(db.get_user_by_login(login)?, entity, login)
}

pub(crate) fn require_vet_by_login(db: &Database, login: &str) -> WorkflowResult<Vet> {
    found(db.get_vet_by_login(login)?, Entity::Vet, login)
}

pub(crate) fn require_assistant_by_login(db: &Database, login: &str) -> WorkflowResult<Assistant> {
    found(db.get_assistant_by_login(login)?, Entity::Assistant, login)
}

/// Optional free text: blank means absent.
pub(crate) fn non_blank(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}
