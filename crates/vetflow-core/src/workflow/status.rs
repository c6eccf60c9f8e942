//! Vet decisions and the main appointment status machine.

use chrono::{DateTime, SubsecRound, Utc};
use tracing::{debug, info, warn};

use super::{
    append_action, ensure_vet_available, non_blank, notify_owner, require_appointment,
    require_vet_by_login, ConflictPolicy, WorkflowError, WorkflowResult,
};
use crate::config::ClinicConfig;
use crate::db::Database;
use crate::models::{
    ActionKind, ActionStatus, Appointment, AppointmentAction, AppointmentStatus, LocationKind, Vet,
};

const CLINIC_TIME_FORMAT: &str = "%d/%m/%Y %H:%M";

pub struct StatusMachine<'a> {
    db: &'a Database,
    config: &'a ClinicConfig,
    policy: ConflictPolicy,
}

impl<'a> StatusMachine<'a> {
    pub fn new(db: &'a Database, config: &'a ClinicConfig) -> Self {
        Self {
            db,
            config,
            policy: ConflictPolicy::from_config(config),
        }
    }

    /// Approve a pending appointment and bind the deciding vet to it.
    pub fn approve(
        &self,
        appointment_id: &str,
        vet_login: &str,
        notes: Option<&str>,
    ) -> WorkflowResult<Appointment> {
        self.decide(appointment_id, vet_login, notes, AppointmentStatus::Approved)
    }

    /// Reject a pending appointment and bind the deciding vet to it.
    pub fn reject(
        &self,
        appointment_id: &str,
        vet_login: &str,
        notes: Option<&str>,
    ) -> WorkflowResult<Appointment> {
        self.decide(appointment_id, vet_login, notes, AppointmentStatus::Rejected)
    }

    fn decide(
        &self,
        appointment_id: &str,
        vet_login: &str,
        notes: Option<&str>,
        decision: AppointmentStatus,
    ) -> WorkflowResult<Appointment> {
        debug!(
            "Request to set appointment {} to {} by {}",
            appointment_id, decision, vet_login
        );
        let (kind, label) = match decision {
            AppointmentStatus::Approved => (ActionKind::Approve, "Appointment approved"),
            _ => (ActionKind::Reject, "Appointment rejected"),
        };
        let notes = non_blank(notes);

        let appointment = self.db.immediate(|| -> WorkflowResult<_> {
            let mut appointment = require_appointment(self.db, appointment_id)?;
            let vet = require_vet_by_login(self.db, vet_login)?;
            ensure_decision_owner(&appointment, &vet)?;
            ensure_transition(&appointment, decision)?;

            appointment.vet_id = Some(vet.id.clone());
            appointment.vet_bound = true;
            appointment.status = decision;
            appointment.touch();
            self.db.update_appointment(&appointment)?;

            append_action(
                self.db,
                AppointmentAction::new(
                    appointment.id.clone(),
                    kind,
                    ActionStatus::Completed,
                    describe(label, notes.as_deref()),
                    notes.clone(),
                    vet.user_id,
                    None,
                ),
            )?;
            Ok(appointment)
        })?;

        info!("Appointment {} is now {}", appointment.id, appointment.status);
        Ok(appointment)
    }

    /// Move an appointment to a new start, keeping its length.
    ///
    /// The vet's calendar is re-checked, ignoring the appointment itself. The
    /// owner is notified after commit.
    pub fn reschedule(
        &self,
        appointment_id: &str,
        new_start: DateTime<Utc>,
        vet_login: &str,
        notes: Option<&str>,
    ) -> WorkflowResult<Appointment> {
        debug!(
            "Request to reschedule appointment {} to {} by {}",
            appointment_id, new_start, vet_login
        );
        let notes = non_blank(notes);
        let new_start = new_start.trunc_subsecs(6);

        let (appointment, sender_id) = self.db.immediate(|| -> WorkflowResult<_> {
            let mut appointment = require_appointment(self.db, appointment_id)?;
            let vet = require_vet_by_login(self.db, vet_login)?;
            ensure_decision_owner(&appointment, &vet)?;
            ensure_transition(&appointment, AppointmentStatus::Rescheduled)?;

            let duration = appointment
                .duration()
                .unwrap_or_else(|| self.config.default_duration(appointment.kind));
            let calendar_vet = appointment.vet_id.clone().unwrap_or_else(|| vet.id.clone());
            ensure_vet_available(
                self.db,
                &self.policy,
                &calendar_vet,
                new_start,
                Some(&appointment.id),
            )?;

            appointment.time_start = new_start;
            appointment.time_end = Some(new_start + duration);
            appointment.status = AppointmentStatus::Rescheduled;
            if let Some(text) = &notes {
                appointment.append_note("Rescheduled", text);
            }
            appointment.touch();
            self.db.update_appointment(&appointment)?;

            append_action(
                self.db,
                AppointmentAction::new(
                    appointment.id.clone(),
                    ActionKind::Reschedule,
                    ActionStatus::Completed,
                    describe("Appointment rescheduled", notes.as_deref()),
                    notes.clone(),
                    vet.user_id.clone(),
                    None,
                ),
            )?;
            Ok((appointment, vet.user_id))
        })?;

        info!(
            "Appointment {} rescheduled to {}",
            appointment.id, appointment.time_start
        );

        let text = self.reschedule_notice(&appointment, notes.as_deref());
        if let Err(e) = notify_owner(self.db, &appointment.id, &sender_id, &text) {
            warn!(
                "Failed to send reschedule notification for appointment {}: {}",
                appointment.id, e
            );
        }
        Ok(appointment)
    }

    fn reschedule_notice(&self, appointment: &Appointment, notes: Option<&str>) -> String {
        let offset = self.config.clinic_offset();
        let mut text = format!(
            "Your appointment has been rescheduled.\nNew time: {}",
            appointment
                .time_start
                .with_timezone(&offset)
                .format(CLINIC_TIME_FORMAT)
        );
        if let Some(end) = appointment.time_end {
            text.push_str(&format!(
                " - {}",
                end.with_timezone(&offset).format(CLINIC_TIME_FORMAT)
            ));
        }
        if let Some(notes) = notes {
            text.push_str(&format!("\nNotes: {}", notes));
        }
        text
    }

    /// Generic status setter. APPROVED and REJECTED go through the decision
    /// path so they bind the vet and leave a ledger row.
    pub fn update_status(
        &self,
        appointment_id: &str,
        status: AppointmentStatus,
        vet_login: &str,
    ) -> WorkflowResult<Appointment> {
        if status.is_decision() {
            return self.decide(appointment_id, vet_login, None, status);
        }
        debug!(
            "Request to set appointment {} to {} by {}",
            appointment_id, status, vet_login
        );

        let appointment = self.db.immediate(|| -> WorkflowResult<_> {
            let mut appointment = require_appointment(self.db, appointment_id)?;
            let vet = require_vet_by_login(self.db, vet_login)?;
            ensure_decision_owner(&appointment, &vet)?;
            ensure_transition(&appointment, status)?;

            appointment.status = status;
            appointment.touch();
            self.db.update_appointment(&appointment)?;
            Ok(appointment)
        })?;

        info!("Appointment {} is now {}", appointment.id, appointment.status);
        Ok(appointment)
    }

    /// Switch an appointment to a home visit and queue the follow-up.
    pub fn request_home_visit(
        &self,
        appointment_id: &str,
        vet_login: &str,
        notes: Option<&str>,
    ) -> WorkflowResult<AppointmentAction> {
        debug!(
            "Request for home visit on appointment {} by {}",
            appointment_id, vet_login
        );
        let notes = non_blank(notes);

        let action = self.db.immediate(|| -> WorkflowResult<_> {
            let mut appointment = require_appointment(self.db, appointment_id)?;
            let vet = require_vet_by_login(self.db, vet_login)?;
            if appointment.status.is_terminal() {
                return Err(WorkflowError::AppointmentClosed(appointment.id));
            }
            ensure_decision_owner(&appointment, &vet)?;

            appointment.location = LocationKind::AtHome;
            appointment.touch();
            self.db.update_appointment(&appointment)?;

            append_action(
                self.db,
                AppointmentAction::new(
                    appointment.id.clone(),
                    ActionKind::RequestHomeVisit,
                    ActionStatus::Pending,
                    describe("Home visit requested", notes.as_deref()),
                    notes.clone(),
                    vet.user_id,
                    None,
                ),
            )
        })?;

        info!("Home visit requested for appointment {}", appointment_id);

        let mut text = String::from("The vet has requested a home visit for this appointment.");
        if let Some(notes) = &notes {
            text.push_str(&format!("\nNotes: {}", notes));
        }
        if let Err(e) = notify_owner(self.db, appointment_id, &action.created_by, &text) {
            warn!(
                "Failed to send home visit notification for appointment {}: {}",
                appointment_id, e
            );
        }
        Ok(action)
    }

    /// An appointment as seen by its own vet.
    pub fn appointment_for_vet(
        &self,
        appointment_id: &str,
        vet_login: &str,
    ) -> WorkflowResult<Appointment> {
        let appointment = require_appointment(self.db, appointment_id)?;
        let vet = require_vet_by_login(self.db, vet_login)?;
        if appointment.vet_id.as_deref() != Some(vet.id.as_str()) {
            return Err(WorkflowError::NotAuthorized(format!(
                "Appointment {} does not belong to {}",
                appointment.id, vet_login
            )));
        }
        Ok(appointment)
    }
}

/// Once a vet has decided on an appointment, only that vet may act on it.
fn ensure_decision_owner(appointment: &Appointment, vet: &Vet) -> WorkflowResult<()> {
    if appointment.vet_bound && !appointment.is_bound_to(&vet.id) {
        warn!(
            "Vet {} tried to act on appointment {} bound to another vet",
            vet.id, appointment.id
        );
        return Err(WorkflowError::NotAuthorized(format!(
            "Appointment {} is bound to another vet",
            appointment.id
        )));
    }
    Ok(())
}

fn ensure_transition(appointment: &Appointment, next: AppointmentStatus) -> WorkflowResult<()> {
    if appointment.status.can_transition_to(next) {
        return Ok(());
    }
    warn!(
        "Rejected appointment {} transition {} -> {}",
        appointment.id, appointment.status, next
    );
    Err(WorkflowError::illegal(appointment.status, next))
}

fn describe(label: &str, notes: Option<&str>) -> String {
    match notes {
        Some(notes) => format!("{}: {}", label, notes),
        None => label.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ActionQuery;
    use crate::models::{AppointmentKind, MessageOrder, Owner, Pet, Role, User};
    use crate::workflow::{AppointmentRequest, Scheduler};
    use chrono::{Duration, TimeZone};

    struct Fixture {
        db: Database,
        config: ClinicConfig,
        vet: Vet,
        pet: Pet,
    }

    fn setup() -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let vet_user = User::new("vet", vec![Role::Vet]);
        let other_vet_user = User::new("other.vet", vec![Role::Vet]);
        let owner_user = User::new("owner", vec![Role::Owner]);
        for user in [&vet_user, &other_vet_user, &owner_user] {
            db.insert_user(user).unwrap();
        }
        let vet = Vet::new(vet_user.id.clone(), "Dr. Vet".into());
        db.insert_vet(&vet).unwrap();
        db.insert_vet(&Vet::new(other_vet_user.id.clone(), "Dr. Other".into()))
            .unwrap();
        let owner = Owner::new(owner_user.id.clone(), "Owner".into());
        db.insert_owner(&owner).unwrap();
        let pet = Pet::new("Rex".into(), "canine".into(), Some(owner.id.clone()));
        db.insert_pet(&pet).unwrap();
        Fixture {
            db,
            config: ClinicConfig::default(),
            vet,
            pet,
        }
    }

    fn book(f: &Fixture, hour: u32) -> Appointment {
        Scheduler::new(&f.db, &f.config)
            .create_appointment(
                &AppointmentRequest {
                    pet_id: f.pet.id.clone(),
                    vet_id: f.vet.id.clone(),
                    kind: AppointmentKind::Normal,
                    location: LocationKind::AtClinic,
                    time_start: Utc.with_ymd_and_hms(2025, 6, 1, hour, 0, 0).unwrap(),
                    time_end: None,
                    notes: None,
                },
                "owner",
            )
            .unwrap()
    }

    #[test]
    fn test_reject_binds_vet_and_logs_notes() {
        let f = setup();
        let machine = StatusMachine::new(&f.db, &f.config);
        let appt = book(&f, 9);

        let rejected = machine.reject(&appt.id, "vet", Some("fully booked")).unwrap();
        assert_eq!(rejected.status, AppointmentStatus::Rejected);
        assert!(rejected.is_bound_to(&f.vet.id));

        let actions = f
            .db
            .list_actions(&ActionQuery {
                appointment_id: Some(appt.id.clone()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, ActionKind::Reject);
        assert_eq!(actions[0].status, ActionStatus::Completed);
        assert!(actions[0].description.contains("fully booked"));
    }

    #[test]
    fn test_bound_vet_owns_later_decisions() {
        let f = setup();
        let machine = StatusMachine::new(&f.db, &f.config);
        let appt = book(&f, 9);
        machine.approve(&appt.id, "vet", None).unwrap();

        let err = machine
            .update_status(&appt.id, AppointmentStatus::Confirmed, "other.vet")
            .unwrap_err();
        assert!(matches!(err, WorkflowError::NotAuthorized(_)));

        let confirmed = machine
            .update_status(&appt.id, AppointmentStatus::Confirmed, "vet")
            .unwrap();
        assert_eq!(confirmed.status, AppointmentStatus::Confirmed);
    }

    #[test]
    fn test_terminal_statuses_are_final() {
        let f = setup();
        let machine = StatusMachine::new(&f.db, &f.config);
        let appt = book(&f, 9);
        machine.reject(&appt.id, "vet", None).unwrap();

        let err = machine.approve(&appt.id, "vet", None).unwrap_err();
        assert!(matches!(err, WorkflowError::IllegalTransition { .. }));
        let err = machine.request_home_visit(&appt.id, "vet", None).unwrap_err();
        assert!(matches!(err, WorkflowError::AppointmentClosed(_)));
    }

    #[test]
    fn test_reschedule_keeps_duration_and_notes() {
        let f = setup();
        let machine = StatusMachine::new(&f.db, &f.config);
        let appt = book(&f, 9);
        machine.approve(&appt.id, "vet", None).unwrap();

        let new_start = Utc.with_ymd_and_hms(2025, 6, 2, 15, 0, 0).unwrap();
        let moved = machine
            .reschedule(&appt.id, new_start, "vet", Some("surgery ran late"))
            .unwrap();
        assert_eq!(moved.status, AppointmentStatus::Rescheduled);
        assert_eq!(moved.time_start, new_start);
        assert_eq!(moved.duration(), Some(Duration::hours(1)));
        assert_eq!(moved.notes.as_deref(), Some("[Rescheduled] surgery ran late"));

        // Rescheduled is re-entrant; moving within its own hour is fine
        let again = machine
            .reschedule(&appt.id, new_start + Duration::minutes(30), "vet", None)
            .unwrap();
        assert_eq!(again.duration(), Some(Duration::hours(1)));

        let messages = f.db.list_messages(&appt.id, MessageOrder::Ascending).unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].message.contains("02/06/2025 15:00"));
    }

    #[test]
    fn test_reschedule_into_conflict_rolls_back() {
        let f = setup();
        let machine = StatusMachine::new(&f.db, &f.config);
        let first = book(&f, 9);
        let second = book(&f, 11);

        let err = machine
            .reschedule(
                &second.id,
                Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).unwrap(),
                "vet",
                Some("earlier please"),
            )
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Conflict { .. }));

        let unchanged = f.db.get_appointment(&second.id).unwrap().unwrap();
        assert_eq!(unchanged, second);
        assert!(f.db.list_ledger().unwrap().is_empty());
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_home_visit_queues_action_and_notifies() {
        let f = setup();
        let machine = StatusMachine::new(&f.db, &f.config);
        let appt = book(&f, 9);

        let action = machine
            .request_home_visit(&appt.id, "vet", Some("bring the carrier"))
            .unwrap();
        assert_eq!(action.kind, ActionKind::RequestHomeVisit);
        assert_eq!(action.status, ActionStatus::Pending);

        let stored = f.db.get_appointment(&appt.id).unwrap().unwrap();
        assert_eq!(stored.location, LocationKind::AtHome);
        assert_eq!(
            f.db.list_messages(&appt.id, MessageOrder::Ascending).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_notice_reaches_owner_from_unbound_vet() {
        let f = setup();
        let machine = StatusMachine::new(&f.db, &f.config);
        let appt = book(&f, 9);

        let new_start = Utc.with_ymd_and_hms(2025, 6, 1, 14, 0, 0).unwrap();
        machine.reschedule(&appt.id, new_start, "other.vet", None).unwrap();
        machine.request_home_visit(&appt.id, "other.vet", None).unwrap();

        let other_vet = f.db.get_user_by_login("other.vet").unwrap().unwrap();
        let thread = f.db.list_messages(&appt.id, MessageOrder::Ascending).unwrap();
        assert_eq!(thread.len(), 2);
        assert!(thread.iter().all(|m| m.sender_id == other_vet.id));
    }

    #[test]
    fn test_notice_ignores_message_length_limit() {
        let f = setup();
        let config = ClinicConfig {
            max_message_len: 10,
            ..ClinicConfig::default()
        };
        let machine = StatusMachine::new(&f.db, &config);
        let appt = book(&f, 9);
        let notes = "n".repeat(960);

        let new_start = Utc.with_ymd_and_hms(2025, 6, 3, 9, 0, 0).unwrap();
        let moved = machine
            .reschedule(&appt.id, new_start, "vet", Some(&notes))
            .unwrap();
        assert_eq!(moved.time_start, new_start);
        machine.request_home_visit(&appt.id, "vet", Some(&notes)).unwrap();

        let thread = f.db.list_messages(&appt.id, MessageOrder::Ascending).unwrap();
        assert_eq!(thread.len(), 2);
        assert!(thread[0].message.ends_with(&format!("Notes: {}", notes)));
        assert_eq!(f.db.list_ledger().unwrap().len(), 2);
    }

    #[test]
    fn test_appointment_for_vet() {
        let f = setup();
        let machine = StatusMachine::new(&f.db, &f.config);
        let appt = book(&f, 9);
        assert_eq!(machine.appointment_for_vet(&appt.id, "vet").unwrap().id, appt.id);
        assert!(matches!(
            machine.appointment_for_vet(&appt.id, "other.vet").unwrap_err(),
            WorkflowError::NotAuthorized(_)
        ));
    }

    #[test]
    fn test_update_status_routes_decisions() {
        let f = setup();
        let machine = StatusMachine::new(&f.db, &f.config);
        let appt = book(&f, 9);

        let approved = machine
            .update_status(&appt.id, AppointmentStatus::Approved, "vet")
            .unwrap();
        assert!(approved.is_bound_to(&f.vet.id));

        let confirmed = machine
            .update_status(&appt.id, AppointmentStatus::Confirmed, "vet")
            .unwrap();
        assert_eq!(confirmed.status, AppointmentStatus::Confirmed);

        let actions = f
            .db
            .list_actions(&ActionQuery {
                appointment_id: Some(appt.id.clone()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, ActionKind::Approve);

        let err = machine
            .update_status(&appt.id, AppointmentStatus::Pending, "vet")
            .unwrap_err();
        assert!(matches!(err, WorkflowError::IllegalTransition { .. }));
        let err = machine
            .update_status(&appt.id, AppointmentStatus::InProgress, "other.vet")
            .unwrap_err();
        assert!(matches!(err, WorkflowError::NotAuthorized(_)));
    }
}
