//! Appointment conversation threads.

use tracing::{debug, info};

use super::{require_appointment, require_user, WorkflowError, WorkflowResult};
use crate::config::ClinicConfig;
use crate::db::Database;
use crate::models::{Appointment, AppointmentMessage, MessageOrder, User};

pub struct MessageThread<'a> {
    db: &'a Database,
    config: &'a ClinicConfig,
}

impl<'a> MessageThread<'a> {
    pub fn new(db: &'a Database, config: &'a ClinicConfig) -> Self {
        Self { db, config }
    }

    /// Post a message as the appointment's owner or vet.
    pub fn send_message(
        &self,
        appointment_id: &str,
        text: &str,
        sender_login: &str,
    ) -> WorkflowResult<AppointmentMessage> {
        debug!("Request to send message on appointment {}", appointment_id);

        let text = text.trim();
        if text.is_empty() {
            return Err(WorkflowError::InvalidInput("Message text is empty".into()));
        }
        let length = text.chars().count();
        if length > self.config.max_message_len {
            return Err(WorkflowError::InvalidInput(format!(
                "Message is {} characters, limit is {}",
                length, self.config.max_message_len
            )));
        }

        let message = self.db.immediate(|| -> WorkflowResult<_> {
            let appointment = require_appointment(self.db, appointment_id)?;
            let sender = require_user(self.db, sender_login, super::Entity::User)?;
            self.ensure_participant(&appointment, &sender)?;

            let message =
                AppointmentMessage::new(appointment.id.clone(), sender.id, text.to_string());
            self.db.insert_message(&message)?;
            Ok(message)
        })?;

        info!("Message {} posted on appointment {}", message.id, appointment_id);
        Ok(message)
    }

    /// The thread of an appointment in the requested order.
    pub fn list_messages(
        &self,
        appointment_id: &str,
        order: MessageOrder,
    ) -> WorkflowResult<Vec<AppointmentMessage>> {
        require_appointment(self.db, appointment_id)?;
        Ok(self.db.list_messages(appointment_id, order)?)
    }

    fn ensure_participant(&self, appointment: &Appointment, sender: &User) -> WorkflowResult<()> {
        let is_owner = self
            .db
            .get_owner(&appointment.owner_id)?
            .is_some_and(|owner| owner.user_id == sender.id);
        let is_vet = match &appointment.vet_id {
            Some(vet_id) => self
                .db
                .get_vet(vet_id)?
                .is_some_and(|vet| vet.user_id == sender.id),
            None => false,
        };

        if is_owner || is_vet {
            Ok(())
        } else {
            Err(WorkflowError::NotAuthorized(format!(
                "{} is not part of appointment {}",
                sender.login, appointment.id
            )))
        }
    }
}

/// Owner notification sent after a committed transition.
///
/// Posted as the acting vet without the participant check or the length
/// limit that apply to typed messages. Callers log and discard the error,
/// since the triggering operation has already committed.
pub(crate) fn notify_owner(
    db: &Database,
    appointment_id: &str,
    sender_id: &str,
    text: &str,
) -> WorkflowResult<AppointmentMessage> {
    let appointment = require_appointment(db, appointment_id)?;
    let message = AppointmentMessage::new(appointment.id, sender_id.to_string(), text.to_string());
    db.insert_message(&message)?;
    debug!("Notice {} posted on appointment {}", message.id, appointment_id);
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppointmentKind, LocationKind, Owner, Pet, Role, Vet};
    use chrono::{Duration, TimeZone, Utc};

    fn setup() -> (Database, Appointment) {
        let db = Database::open_in_memory().unwrap();
        let vet_user = User::new("vet", vec![Role::Vet]);
        let owner_user = User::new("owner", vec![Role::Owner]);
        let stranger = User::new("stranger", vec![Role::Owner]);
        for user in [&vet_user, &owner_user, &stranger] {
            db.insert_user(user).unwrap();
        }
        let vet = Vet::new(vet_user.id.clone(), "Dr. Vet".into());
        let owner = Owner::new(owner_user.id.clone(), "Owner".into());
        db.insert_vet(&vet).unwrap();
        db.insert_owner(&owner).unwrap();
        let pet = Pet::new("Rex".into(), "canine".into(), Some(owner.id.clone()));
        db.insert_pet(&pet).unwrap();

        let start = Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();
        let appointment = Appointment::new(
            start,
            start + Duration::hours(1),
            AppointmentKind::Normal,
            LocationKind::AtClinic,
            pet.id,
            owner.id,
            vet.id,
        );
        db.insert_appointment(&appointment).unwrap();
        (db, appointment)
    }

    #[test]
    fn test_participants_can_post() {
        let (db, appointment) = setup();
        let config = ClinicConfig::default();
        let thread = MessageThread::new(&db, &config);

        thread.send_message(&appointment.id, "Is 9:00 ok?", "owner").unwrap();
        thread.send_message(&appointment.id, "Yes", "vet").unwrap();

        let messages = thread
            .list_messages(&appointment.id, MessageOrder::Ascending)
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].message, "Is 9:00 ok?");
    }

    #[test]
    fn test_rejects_outsiders_and_bad_text() {
        let (db, appointment) = setup();
        let config = ClinicConfig {
            max_message_len: 5,
            ..ClinicConfig::default()
        };
        let thread = MessageThread::new(&db, &config);

        assert!(matches!(
            thread.send_message(&appointment.id, "hello", "stranger").unwrap_err(),
            WorkflowError::NotAuthorized(_)
        ));
        assert!(matches!(
            thread.send_message(&appointment.id, "   ", "owner").unwrap_err(),
            WorkflowError::InvalidInput(_)
        ));
        assert!(matches!(
            thread.send_message(&appointment.id, "too long", "owner").unwrap_err(),
            WorkflowError::InvalidInput(_)
        ));
        assert!(thread
            .list_messages(&appointment.id, MessageOrder::Descending)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_notify_failure_writes_nothing() {
        let (db, _) = setup();
        assert!(notify_owner(&db, "missing", "vet-user", "hello").is_err());
        assert_eq!(
            db.conn()
                .query_row("SELECT COUNT(*) FROM appointment_messages", [], |r| r
                    .get::<_, i64>(0))
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_notice_skips_typed_message_limits() {
        let (db, appointment) = setup();
        let vet = db.get_user_by_login("vet").unwrap().unwrap();

        let notice = notify_owner(&db, &appointment.id, &vet.id, &"x".repeat(2_000)).unwrap();
        assert_eq!(notice.sender_id, vet.id);
        assert_eq!(
            db.list_messages(&appointment.id, MessageOrder::Ascending)
                .unwrap()
                .len(),
            1
        );
    }
}
