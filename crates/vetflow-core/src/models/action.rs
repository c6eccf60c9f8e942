//! Action ledger models.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Kind of vet-initiated workflow action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    Approve,
    Reject,
    Reschedule,
    AssignAssistant,
    RequestHomeVisit,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Approve => "APPROVE",
            ActionKind::Reject => "REJECT",
            ActionKind::Reschedule => "RESCHEDULE",
            ActionKind::AssignAssistant => "ASSIGN_ASSISTANT",
            ActionKind::RequestHomeVisit => "REQUEST_HOME_VISIT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "APPROVE" => Some(ActionKind::Approve),
            "REJECT" => Some(ActionKind::Reject),
            "RESCHEDULE" => Some(ActionKind::Reschedule),
            "ASSIGN_ASSISTANT" => Some(ActionKind::AssignAssistant),
            "REQUEST_HOME_VISIT" => Some(ActionKind::RequestHomeVisit),
            _ => None,
        }
    }
}

/// Sub-status of a ledger row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStatus {
    Pending,
    Completed,
    Cancelled,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Pending => "PENDING",
            ActionStatus::Completed => "COMPLETED",
            ActionStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "PENDING" => Some(ActionStatus::Pending),
            "COMPLETED" => Some(ActionStatus::Completed),
            "CANCELLED" => Some(ActionStatus::Cancelled),
            _ => None,
        }
    }

    /// Only `PENDING -> COMPLETED | CANCELLED`; nothing moves backward.
    pub fn can_transition_to(&self, next: ActionStatus) -> bool {
        matches!(
            (self, next),
            (ActionStatus::Pending, ActionStatus::Completed)
                | (ActionStatus::Pending, ActionStatus::Cancelled)
        )
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the append-only action ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppointmentAction {
    pub id: String,
    pub appointment_id: String,
    pub kind: ActionKind,
    pub status: ActionStatus,
    pub description: String,
    pub notes: Option<String>,
    pub scheduled_time: DateTime<Utc>,
    pub completed_time: Option<DateTime<Utc>>,
    /// User id of the vet who created the action
    pub created_by: String,
    /// User id of the delegate, if any
    pub assigned_to: Option<String>,
    /// Hash of the previous ledger row (empty for the first row)
    pub prev_hash: String,
    /// sha256(prev_hash || canonical JSON of the immutable fields)
    pub entry_hash: String,
}

/// The immutable part of a ledger row, hashed into the chain.
#[derive(Serialize)]
struct LedgerPayload<'a> {
    id: &'a str,
    appointment_id: &'a str,
    kind: ActionKind,
    description: &'a str,
    notes: Option<&'a str>,
    scheduled_time: String,
    created_by: &'a str,
    assigned_to: Option<&'a str>,
}

impl AppointmentAction {
    /// Build a new, not yet chained ledger row.
    pub fn new(
        appointment_id: String,
        kind: ActionKind,
        status: ActionStatus,
        description: String,
        notes: Option<String>,
        created_by: String,
        assigned_to: Option<String>,
    ) -> Self {
        let now = super::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            appointment_id,
            kind,
            status,
            description,
            notes,
            scheduled_time: now,
            completed_time: (status == ActionStatus::Completed).then_some(now),
            created_by,
            assigned_to,
            prev_hash: String::new(),
            entry_hash: String::new(),
        }
    }

    /// Serialize the immutable fields to canonical JSON.
    pub fn to_canonical_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&LedgerPayload {
            id: &self.id,
            appointment_id: &self.appointment_id,
            kind: self.kind,
            description: &self.description,
            notes: self.notes.as_deref(),
            scheduled_time: self
                .scheduled_time
                .to_rfc3339_opts(SecondsFormat::Micros, true),
            created_by: &self.created_by,
            assigned_to: self.assigned_to.as_deref(),
        })
    }

    /// Compute the chained hash of this row given its predecessor's hash.
    pub fn compute_hash(&self, prev_hash: &str) -> Result<String, serde_json::Error> {
        let payload = self.to_canonical_json()?;
        Ok(hash_data(format!("{}{}", prev_hash, payload).as_bytes()))
    }

    /// Link this row after `prev_hash`.
    pub fn seal(&mut self, prev_hash: &str) -> Result<(), serde_json::Error> {
        self.prev_hash = prev_hash.to_string();
        self.entry_hash = self.compute_hash(prev_hash)?;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.status == ActionStatus::Pending
    }
}

/// Hex-encoded SHA-256.
pub fn hash_data(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
