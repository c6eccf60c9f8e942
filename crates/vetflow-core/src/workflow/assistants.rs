//! Delegation of appointments to assistants.
//!
//! An assignment is recorded twice: as an ASSIGN_ASSISTANT ledger row (the
//! audit trail and work queue) and as an appointment <-> assistant link (the
//! structural relation). A link exists exactly while a non-cancelled
//! assignment row exists for the same pair.

use tracing::{debug, info, warn};

use super::{
    append_action, found, non_blank, require_appointment, require_assistant_by_login,
    require_vet_by_login, ActorKind, ConflictPolicy, Entity, WorkflowError, WorkflowResult,
};
use crate::config::ClinicConfig;
use crate::db::Database;
use crate::models::{
    ActionKind, ActionStatus, Appointment, AppointmentAction, AssignedAppointment, Assistant,
    AssistantAssignment,
};

pub struct AssistantResolver<'a> {
    db: &'a Database,
    policy: ConflictPolicy,
}

impl<'a> AssistantResolver<'a> {
    pub fn new(db: &'a Database, config: &ClinicConfig) -> Self {
        Self {
            db,
            policy: ConflictPolicy::from_config(config),
        }
    }

    /// Delegate an appointment to an assistant on behalf of its vet.
    pub fn assign_assistant(
        &self,
        appointment_id: &str,
        assistant_id: &str,
        notes: Option<&str>,
        vet_login: &str,
    ) -> WorkflowResult<AppointmentAction> {
        debug!(
            "Request to assign assistant {} to appointment {} by {}",
            assistant_id, appointment_id, vet_login
        );
        let notes = non_blank(notes);

        let action = self.db.immediate(|| -> WorkflowResult<_> {
            let appointment = require_appointment(self.db, appointment_id)?;
            let vet = require_vet_by_login(self.db, vet_login)?;
            if appointment.status.is_terminal() {
                return Err(WorkflowError::AppointmentClosed(appointment.id));
            }
            if appointment.vet_id.as_deref() != Some(vet.id.as_str()) {
                return Err(WorkflowError::NotAuthorized(format!(
                    "{} is not the vet of appointment {}",
                    vet_login, appointment.id
                )));
            }

            let assistant = found(
                self.db.get_assistant(assistant_id)?,
                Entity::Assistant,
                assistant_id,
            )?;
            let assistant_user = found(
                self.db.get_user(&assistant.user_id)?,
                Entity::User,
                &assistant.user_id,
            )?;

            ensure_assistant_available(
                self.db,
                &self.policy,
                &assistant,
                &assistant_user.id,
                &appointment,
            )?;

            let action = append_action(
                self.db,
                AppointmentAction::new(
                    appointment.id.clone(),
                    ActionKind::AssignAssistant,
                    ActionStatus::Pending,
                    "Assistant assigned for sample collection".to_string(),
                    notes.clone(),
                    vet.user_id,
                    Some(assistant_user.id),
                ),
            )?;

            let link = AssistantAssignment::new(appointment.id.clone(), assistant.id.clone());
            if !self.db.insert_assignment_if_absent(&link)? {
                debug!(
                    "Assistant {} already linked to appointment {}",
                    assistant.id, appointment.id
                );
            }
            Ok(action)
        })?;

        info!(
            "Assigned action {} on appointment {}",
            action.id, action.appointment_id
        );
        Ok(action)
    }

    /// Assignment rows behind an assistant's links, optionally by sub-status.
    pub fn assigned_to_assistant(
        &self,
        assistant_login: &str,
        status: Option<ActionStatus>,
    ) -> WorkflowResult<Vec<AppointmentAction>> {
        let assistant = require_assistant_by_login(self.db, assistant_login)?;
        Ok(self.db.list_linked_assignment_actions(&assistant.id, status)?)
    }

    /// An assistant's linked appointments, earliest first.
    pub fn assigned_appointments(
        &self,
        assistant_login: &str,
    ) -> WorkflowResult<Vec<AssignedAppointment>> {
        let assistant = require_assistant_by_login(self.db, assistant_login)?;
        Ok(self.db.list_assignments_for_assistant(&assistant.id)?)
    }

    /// An appointment as seen by an assistant linked to it.
    pub fn assigned_appointment_detail(
        &self,
        appointment_id: &str,
        assistant_login: &str,
    ) -> WorkflowResult<Appointment> {
        let assistant = require_assistant_by_login(self.db, assistant_login)?;
        let appointment = require_appointment(self.db, appointment_id)?;
        if self
            .db
            .get_assignment(&appointment.id, &assistant.id)?
            .is_none()
        {
            return Err(WorkflowError::NotAuthorized(format!(
                "{} is not assigned to appointment {}",
                assistant_login, appointment.id
            )));
        }
        Ok(appointment)
    }
}

/// Fail with an assistant `Conflict` if `appointment` collides with another
/// live assignment of the same assistant on that clinic day.
pub(crate) fn ensure_assistant_available(
    db: &Database,
    policy: &ConflictPolicy,
    assistant: &Assistant,
    assistant_user_id: &str,
    appointment: &Appointment,
) -> WorkflowResult<()> {
    let (from, until) = policy.day_bounds_of(appointment.time_start);
    let existing =
        db.list_active_assignments_between(assistant_user_id, &from, &until, Some(&appointment.id))?;
    match policy.first_conflict(existing.iter().map(|(_, start)| *start), appointment.time_start) {
        Some(conflicting_start) => {
            warn!(
                "Assistant {} not available at {}: conflicts with {}",
                assistant.id, appointment.time_start, conflicting_start
            );
            Err(WorkflowError::Conflict {
                actor: ActorKind::Assistant,
                actor_id: assistant.id.clone(),
                conflicting_start,
            })
        }
        None => Ok(()),
    }
}
