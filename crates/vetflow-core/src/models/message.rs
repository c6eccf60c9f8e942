//! Appointment conversation thread and assistant links.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Appointment;

/// An immutable note on an appointment's conversation thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppointmentMessage {
    pub id: String,
    pub appointment_id: String,
    /// User id of the author
    pub sender_id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl AppointmentMessage {
    pub fn new(appointment_id: String, sender_id: String, message: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            appointment_id,
            sender_id,
            message,
            timestamp: super::now(),
        }
    }
}

/// Listing order for a message thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOrder {
    Ascending,
    Descending,
}

/// Structural appointment <-> assistant link.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssistantAssignment {
    pub id: String,
    pub appointment_id: String,
    pub assistant_id: String,
    pub created_at: DateTime<Utc>,
}

impl AssistantAssignment {
    pub fn new(appointment_id: String, assistant_id: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            appointment_id,
            assistant_id,
            created_at: super::now(),
        }
    }
}

/// A link joined with its appointment.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignedAppointment {
    pub assignment: AssistantAssignment,
    pub appointment: Appointment,
}
