//! Lab test models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lab test status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LabTestStatus {
    Requested,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
}

impl LabTestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LabTestStatus::Requested => "REQUESTED",
            LabTestStatus::Assigned => "ASSIGNED",
            LabTestStatus::InProgress => "IN_PROGRESS",
            LabTestStatus::Completed => "COMPLETED",
            LabTestStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "REQUESTED" => Some(LabTestStatus::Requested),
            "ASSIGNED" => Some(LabTestStatus::Assigned),
            "IN_PROGRESS" => Some(LabTestStatus::InProgress),
            "COMPLETED" => Some(LabTestStatus::Completed),
            "CANCELLED" => Some(LabTestStatus::Cancelled),
            _ => None,
        }
    }

    /// Status updates allowed through `update_lab_test_status`.
    ///
    /// A non-terminal status may be "updated" to itself so callers can amend
    /// result or notes without moving the test along.
    pub fn can_transition_to(&self, next: LabTestStatus) -> bool {
        use LabTestStatus::*;
        match self {
            Requested => matches!(next, Requested | Assigned | InProgress | Cancelled),
            Assigned => matches!(next, Assigned | InProgress | Completed | Cancelled),
            InProgress => matches!(next, InProgress | Completed | Cancelled),
            Completed | Cancelled => false,
        }
    }

    /// Whether `assign_lab_test` may (re)assign from this status.
    pub fn accepts_assignment(&self) -> bool {
        matches!(self, LabTestStatus::Requested | LabTestStatus::Assigned)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LabTestStatus::Completed | LabTestStatus::Cancelled)
    }
}

impl std::fmt::Display for LabTestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sampling/diagnostic work item attached to an appointment and its pet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabTest {
    pub id: String,
    pub appointment_id: String,
    pub pet_id: String,
    pub test_name: String,
    /// Free-form, e.g. BLOOD or URINE
    pub test_type: Option<String>,
    pub description: Option<String>,
    pub status: LabTestStatus,
    pub result: Option<String>,
    pub notes: Option<String>,
    pub requested_date: DateTime<Utc>,
    pub sample_collected_date: Option<DateTime<Utc>>,
    pub completed_date: Option<DateTime<Utc>>,
    /// User ids
    pub requested_by: String,
    pub assigned_to: Option<String>,
}

impl LabTest {
    pub fn new(
        appointment_id: String,
        pet_id: String,
        test_name: String,
        test_type: Option<String>,
        description: Option<String>,
        requested_by: String,
        assigned_to: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            appointment_id,
            pet_id,
            test_name,
            test_type,
            description,
            status: LabTestStatus::Requested,
            result: None,
            notes: None,
            requested_date: super::now(),
            sample_collected_date: None,
            completed_date: None,
            requested_by,
            assigned_to,
        }
    }

    /// Move to `next`, stamping the sample/completion dates on entry.
    pub fn apply_status(&mut self, next: LabTestStatus, now: DateTime<Utc>) {
        if next != self.status {
            match next {
                LabTestStatus::InProgress => self.sample_collected_date = Some(now),
                LabTestStatus::Completed => self.completed_date = Some(now),
                _ => {}
            }
        }
        self.status = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_status_stamps_dates() {
        let mut test = LabTest::new(
            "appt-1".into(),
            "pet-1".into(),
            "CBC".into(),
            Some("BLOOD".into()),
            None,
            "user-vet".into(),
            None,
        );
        assert_eq!(test.status, LabTestStatus::Requested);

        let t1 = Utc::now();
        test.apply_status(LabTestStatus::InProgress, t1);
        assert_eq!(test.sample_collected_date, Some(t1));
        assert!(test.completed_date.is_none());

        // Same-status update does not re-stamp
        test.apply_status(LabTestStatus::InProgress, t1 + chrono::Duration::minutes(5));
        assert_eq!(test.sample_collected_date, Some(t1));

        let t2 = t1 + chrono::Duration::hours(1);
        test.apply_status(LabTestStatus::Completed, t2);
        assert_eq!(test.completed_date, Some(t2));
    }

    #[test]
    fn test_terminal_statuses_reject_everything() {
        for next in [
            LabTestStatus::Requested,
            LabTestStatus::Assigned,
            LabTestStatus::InProgress,
            LabTestStatus::Completed,
            LabTestStatus::Cancelled,
        ] {
            assert!(!LabTestStatus::Completed.can_transition_to(next));
            assert!(!LabTestStatus::Cancelled.can_transition_to(next));
        }
        assert!(!LabTestStatus::Requested.can_transition_to(LabTestStatus::Completed));
        assert!(LabTestStatus::Assigned.can_transition_to(LabTestStatus::Completed));
        assert!(!LabTestStatus::InProgress.accepts_assignment());
    }
}
