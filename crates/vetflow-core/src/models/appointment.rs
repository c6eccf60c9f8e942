//! Appointment models and the main status table.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Appointment kind. Drives the default duration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentKind {
    Emergency,
    Normal,
}

impl AppointmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentKind::Emergency => "EMERGENCY",
            AppointmentKind::Normal => "NORMAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "EMERGENCY" => Some(AppointmentKind::Emergency),
            "NORMAL" => Some(AppointmentKind::Normal),
            _ => None,
        }
    }
}

/// Where the appointment takes place.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocationKind {
    AtClinic,
    AtHome,
}

impl LocationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationKind::AtClinic => "AT_CLINIC",
            LocationKind::AtHome => "AT_HOME",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "AT_CLINIC" => Some(LocationKind::AtClinic),
            "AT_HOME" => Some(LocationKind::AtHome),
            _ => None,
        }
    }
}

/// Main appointment status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    /// Requested by the owner, awaiting a vet decision
    Pending,
    Approved,
    Rejected,
    Scheduled,
    Confirmed,
    InProgress,
    /// Moved to a new time; may be moved again
    Rescheduled,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 9] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Approved,
        AppointmentStatus::Rejected,
        AppointmentStatus::Scheduled,
        AppointmentStatus::Confirmed,
        AppointmentStatus::InProgress,
        AppointmentStatus::Rescheduled,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "PENDING",
            AppointmentStatus::Approved => "APPROVED",
            AppointmentStatus::Rejected => "REJECTED",
            AppointmentStatus::Scheduled => "SCHEDULED",
            AppointmentStatus::Confirmed => "CONFIRMED",
            AppointmentStatus::InProgress => "IN_PROGRESS",
            AppointmentStatus::Rescheduled => "RESCHEDULED",
            AppointmentStatus::Completed => "COMPLETED",
            AppointmentStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s.trim())
    }

    /// Statuses reachable from this one.
    pub fn valid_transitions(&self) -> &'static [AppointmentStatus] {
        use AppointmentStatus::*;
        match self {
            Pending => &[Approved, Rejected, Rescheduled, Completed, Cancelled],
            Approved => &[Scheduled, Confirmed, InProgress, Rescheduled, Completed, Cancelled],
            Scheduled => &[Confirmed, InProgress, Rescheduled, Completed, Cancelled],
            Confirmed => &[InProgress, Rescheduled, Completed, Cancelled],
            InProgress => &[Completed, Cancelled],
            Rescheduled => &[
                Approved,
                Rejected,
                Scheduled,
                Confirmed,
                InProgress,
                Rescheduled,
                Completed,
                Cancelled,
            ],
            // Terminal for the main workflow
            Rejected | Completed | Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        self.valid_transitions().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }

    /// Whether an appointment in this status still occupies the vet's time.
    pub fn is_active_commitment(&self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled | AppointmentStatus::Rejected)
    }

    /// Decision statuses pin the deciding vet to the appointment.
    pub fn is_decision(&self) -> bool {
        matches!(self, AppointmentStatus::Approved | AppointmentStatus::Rejected)
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One owner/pet/vet time commitment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: String,
    pub time_start: DateTime<Utc>,
    /// Always set by the scheduler; older rows may lack it
    pub time_end: Option<DateTime<Utc>>,
    pub kind: AppointmentKind,
    pub location: LocationKind,
    pub status: AppointmentStatus,
    /// Append-only annotation log
    pub notes: Option<String>,
    pub pet_id: String,
    pub owner_id: String,
    /// Provisional until `vet_bound` is set by the first approve/reject
    pub vet_id: Option<String>,
    pub vet_bound: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// Create a new pending appointment.
    pub fn new(
        time_start: DateTime<Utc>,
        time_end: DateTime<Utc>,
        kind: AppointmentKind,
        location: LocationKind,
        pet_id: String,
        owner_id: String,
        vet_id: String,
    ) -> Self {
        let now = super::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            time_start,
            time_end: Some(time_end),
            kind,
            location,
            status: AppointmentStatus::Pending,
            notes: None,
            pet_id,
            owner_id,
            vet_id: Some(vet_id),
            vet_bound: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Scheduled length, if the end time is known.
    pub fn duration(&self) -> Option<Duration> {
        self.time_end.map(|end| end - self.time_start)
    }

    /// Append a marked annotation, keeping earlier notes intact.
    pub fn append_note(&mut self, marker: &str, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let entry = format!("[{}] {}", marker, text);
        self.notes = match self.notes.take().filter(|n| !n.trim().is_empty()) {
            Some(existing) => Some(format!("{}\n\n{}", existing, entry)),
            None => Some(entry),
        };
    }

    /// Whether `vet_id` is the decision-bound vet of this appointment.
    pub fn is_bound_to(&self, vet_id: &str) -> bool {
        self.vet_bound && self.vet_id.as_deref() == Some(vet_id)
    }

    pub fn touch(&mut self) {
        self.updated_at = super::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_appointment() -> Appointment {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();
        Appointment::new(
            start,
            start + Duration::hours(1),
            AppointmentKind::Normal,
            LocationKind::AtClinic,
            "pet-1".into(),
            "owner-1".into(),
            "vet-1".into(),
        )
    }

    #[test]
    fn test_new_appointment_is_pending_and_unbound() {
        let appt = make_appointment();
        assert_eq!(appt.status, AppointmentStatus::Pending);
        assert!(!appt.vet_bound);
        assert!(!appt.is_bound_to("vet-1"));
        assert_eq!(appt.duration(), Some(Duration::hours(1)));
    }

    #[test]
    fn test_append_note_preserves_history() {
        let mut appt = make_appointment();
        appt.append_note("Rescheduled", "owner asked for later");
        assert_eq!(appt.notes.as_deref(), Some("[Rescheduled] owner asked for later"));

        appt.append_note("Rescheduled", "vet running late");
        assert_eq!(
            appt.notes.as_deref(),
            Some("[Rescheduled] owner asked for later\n\n[Rescheduled] vet running late")
        );

        // Blank notes are ignored
        appt.append_note("Rescheduled", "   ");
        assert!(appt.notes.as_deref().unwrap().ends_with("vet running late"));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(AppointmentStatus::Rejected.is_terminal());
        assert!(AppointmentStatus::Completed.is_terminal());
        assert!(AppointmentStatus::Cancelled.is_terminal());
        assert!(!AppointmentStatus::Rescheduled.is_terminal());
        assert!(!AppointmentStatus::Pending.is_terminal());
    }

    #[test]
    fn test_transition_table() {
        use AppointmentStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Approved.can_transition_to(Rescheduled));
        assert!(Rescheduled.can_transition_to(Rescheduled));
        assert!(InProgress.can_transition_to(Completed));
        assert!(!Approved.can_transition_to(Pending));
        assert!(!Rejected.can_transition_to(Approved));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!InProgress.can_transition_to(Approved));

        // Every non-terminal status can still be completed or cancelled
        for status in AppointmentStatus::ALL.iter().filter(|s| !s.is_terminal()) {
            assert!(status.can_transition_to(Completed), "{status} -> COMPLETED");
            assert!(status.can_transition_to(Cancelled), "{status} -> CANCELLED");
        }
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in AppointmentStatus::ALL {
            assert_eq!(AppointmentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(AppointmentStatus::parse("DONE"), None);
        assert_eq!(AppointmentKind::parse("REGULAR"), None);
        assert_eq!(LocationKind::parse("AT_HOME"), Some(LocationKind::AtHome));
    }
}
