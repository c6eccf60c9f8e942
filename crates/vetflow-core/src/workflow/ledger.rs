//! Action ledger: the append-only audit trail of vet-initiated actions,
//! which doubles as the assistants' work queue.

use tracing::{debug, info, warn};

use super::{
    ensure_assistant_available, found, non_blank, require_appointment, require_user,
    ConflictPolicy, Entity, WorkflowError, WorkflowResult,
};
use crate::config::ClinicConfig;
use crate::db::{ActionQuery, Database};
use crate::models::{ActionKind, ActionStatus, AppointmentAction, AssistantAssignment};

/// Input for [`Ledger::create_action`].
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub appointment_id: String,
    pub kind: ActionKind,
    pub status: ActionStatus,
    pub description: String,
    pub notes: Option<String>,
    pub creator_login: String,
    pub assignee_login: Option<String>,
}

/// Outcome of a full chain check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerReport {
    pub checked: usize,
    /// Id of the first row whose hash or back-link does not match
    pub first_broken: Option<String>,
}

impl LedgerReport {
    pub fn is_intact(&self) -> bool {
        self.first_broken.is_none()
    }
}

pub struct Ledger<'a> {
    db: &'a Database,
    policy: ConflictPolicy,
}

impl<'a> Ledger<'a> {
    pub fn new(db: &'a Database, config: &ClinicConfig) -> Self {
        Self {
            db,
            policy: ConflictPolicy::from_config(config),
        }
    }

    /// Append a ledger row on behalf of `creator_login`.
    pub fn create_action(&self, request: &ActionRequest) -> WorkflowResult<AppointmentAction> {
        debug!(
            "Request to create {} action for appointment {}",
            request.kind.as_str(),
            request.appointment_id
        );

        let action = self.db.immediate(|| -> WorkflowResult<_> {
            let appointment = require_appointment(self.db, &request.appointment_id)?;
            let creator = require_user(self.db, &request.creator_login, Entity::Creator)?;
            let assignee = match &request.assignee_login {
                Some(login) => Some(require_user(self.db, login, Entity::Assignee)?),
                None => None,
            };

            // An open assignment row must be mirrored by its link
            let link_target = if request.kind == ActionKind::AssignAssistant
                && request.status != ActionStatus::Cancelled
            {
                let user = assignee.as_ref().ok_or_else(|| {
                    WorkflowError::InvalidInput("ASSIGN_ASSISTANT needs an assignee".into())
                })?;
                let assistant = self.db.get_assistant_by_user(&user.id)?.ok_or_else(|| {
                    WorkflowError::InvalidInput(format!("{} is not an assistant", user.login))
                })?;
                ensure_assistant_available(self.db, &self.policy, &assistant, &user.id, &appointment)?;
                Some(assistant.id)
            } else {
                None
            };

            let action = append_action(
                self.db,
                AppointmentAction::new(
                    request.appointment_id.clone(),
                    request.kind,
                    request.status,
                    request.description.clone(),
                    non_blank(request.notes.as_deref()),
                    creator.id,
                    assignee.map(|u| u.id),
                ),
            )?;

            if let Some(assistant_id) = link_target {
                self.db.insert_assignment_if_absent(&AssistantAssignment::new(
                    request.appointment_id.clone(),
                    assistant_id,
                ))?;
            }
            Ok(action)
        })?;

        info!("Created {} action {}", action.kind.as_str(), action.id);
        Ok(action)
    }

    /// Move a PENDING row to COMPLETED or CANCELLED.
    ///
    /// Only the creator or the assignee may do so. Cancelling the last live
    /// assignment of an assistant to an appointment also drops their link.
    pub fn complete_action(
        &self,
        action_id: &str,
        status: ActionStatus,
        completer_login: &str,
    ) -> WorkflowResult<AppointmentAction> {
        debug!("Request to set action {} to {}", action_id, status);

        let action = self.db.immediate(|| -> WorkflowResult<_> {
            let mut action = found(self.db.get_action(action_id)?, Entity::Action, action_id)?;
            let completer = require_user(self.db, completer_login, Entity::User)?;

            if completer.id != action.created_by
                && action.assigned_to.as_deref() != Some(completer.id.as_str())
            {
                return Err(WorkflowError::NotAuthorized(format!(
                    "{} is neither creator nor assignee of action {}",
                    completer.login, action.id
                )));
            }

            if !action.status.can_transition_to(status) {
                warn!(
                    "Rejected action {} transition {} -> {}",
                    action.id, action.status, status
                );
                return Err(WorkflowError::illegal(action.status, status));
            }

            action.status = status;
            if status == ActionStatus::Completed {
                action.completed_time = Some(crate::models::now());
            }
            self.db.update_action_status(&action)?;

            if status == ActionStatus::Cancelled && action.kind == ActionKind::AssignAssistant {
                if let Some(user_id) = &action.assigned_to {
                    self.release_link_if_unused(&action.appointment_id, user_id)?;
                }
            }
            Ok(action)
        })?;

        info!("Action {} is now {}", action.id, action.status);
        Ok(action)
    }

    fn release_link_if_unused(&self, appointment_id: &str, user_id: &str) -> WorkflowResult<()> {
        if self.db.count_live_assignment_actions(appointment_id, user_id)? > 0 {
            return Ok(());
        }
        if let Some(assistant) = self.db.get_assistant_by_user(user_id)? {
            if self.db.delete_assignment(appointment_id, &assistant.id)? {
                debug!(
                    "Removed assistant link {} <-> {}",
                    appointment_id, assistant.id
                );
            }
        }
        Ok(())
    }

    pub fn get_action(&self, action_id: &str) -> WorkflowResult<AppointmentAction> {
        found(self.db.get_action(action_id)?, Entity::Action, action_id)
    }

    pub fn actions_for_appointment(&self, appointment_id: &str) -> WorkflowResult<Vec<AppointmentAction>> {
        Ok(self.db.list_actions(&ActionQuery {
            appointment_id: Some(appointment_id.to_string()),
            ..Default::default()
        })?)
    }

    /// Rows assigned to a login. Unknown logins have nothing assigned.
    pub fn actions_assigned_to(
        &self,
        assignee_login: &str,
        status: Option<ActionStatus>,
    ) -> WorkflowResult<Vec<AppointmentAction>> {
        match self.db.get_user_by_login(assignee_login)? {
            Some(user) => self.actions_assigned_to_user(&user.id, status),
            None => Ok(Vec::new()),
        }
    }

    pub fn actions_assigned_to_user(
        &self,
        user_id: &str,
        status: Option<ActionStatus>,
    ) -> WorkflowResult<Vec<AppointmentAction>> {
        Ok(self.db.list_actions(&ActionQuery {
            assigned_to: Some(user_id.to_string()),
            status,
            ..Default::default()
        })?)
    }

    /// Rows created by a login. Unknown logins created nothing.
    pub fn actions_created_by(&self, creator_login: &str) -> WorkflowResult<Vec<AppointmentAction>> {
        match self.db.get_user_by_login(creator_login)? {
            Some(user) => Ok(self.db.list_actions(&ActionQuery {
                created_by: Some(user.id),
                ..Default::default()
            })?),
            None => Ok(Vec::new()),
        }
    }

    pub fn actions_of_kind(
        &self,
        kind: ActionKind,
        appointment_id: Option<&str>,
    ) -> WorkflowResult<Vec<AppointmentAction>> {
        Ok(self.db.list_actions(&ActionQuery {
            kind: Some(kind),
            appointment_id: appointment_id.map(str::to_string),
            ..Default::default()
        })?)
    }

    /// Recompute every hash in append order.
    pub fn verify_ledger(&self) -> WorkflowResult<LedgerReport> {
        let rows = self.db.list_ledger()?;
        let mut prev = String::new();

        for (checked, row) in rows.iter().enumerate() {
            if row.prev_hash != prev || row.compute_hash(&prev)? != row.entry_hash {
                warn!("Ledger chain broken at action {}", row.id);
                return Ok(LedgerReport {
                    checked,
                    first_broken: Some(row.id.clone()),
                });
            }
            prev = row.entry_hash.clone();
        }

        Ok(LedgerReport {
            checked: rows.len(),
            first_broken: None,
        })
    }
}

/// Chain and persist a new row. Runs inside the caller's transaction.
pub(crate) fn append_action(
    db: &Database,
    mut action: AppointmentAction,
) -> WorkflowResult<AppointmentAction> {
    let prev = db.last_entry_hash()?;
    action.seal(&prev)?;
    db.insert_action(&action)?;
    Ok(action)
}
