//! Appointment <-> assistant link operations.

use rusqlite::{params, OptionalExtension};

use super::{fmt_ts, parse_ts, Database, DbResult};
use crate::models::{Appointment, AssignedAppointment, AssistantAssignment};

impl Database {
    /// Create the link unless it already exists. Returns whether a row was added.
    pub fn insert_assignment_if_absent(&self, link: &AssistantAssignment) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            INSERT OR IGNORE INTO appointment_assistants (
                id, appointment_id, assistant_id, created_at
            ) VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                link.id,
                link.appointment_id,
                link.assistant_id,
                fmt_ts(&link.created_at),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Remove the link for a pair. Returns whether a row was removed.
    pub fn delete_assignment(&self, appointment_id: &str, assistant_id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "DELETE FROM appointment_assistants WHERE appointment_id = ?1 AND assistant_id = ?2",
            params![appointment_id, assistant_id],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get the link for a pair.
    pub fn get_assignment(
        &self,
        appointment_id: &str,
        assistant_id: &str,
    ) -> DbResult<Option<AssistantAssignment>> {
        let row = self
            .conn
            .query_row(
                r#"
                SELECT id, appointment_id, assistant_id, created_at
                FROM appointment_assistants
                WHERE appointment_id = ?1 AND assistant_id = ?2
                "#,
                params![appointment_id, assistant_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(id, appointment_id, assistant_id, created_at)| {
            Ok(AssistantAssignment {
                id,
                appointment_id,
                assistant_id,
                created_at: parse_ts(&created_at)?,
            })
        })
        .transpose()
    }

    /// All links of an assistant, each joined with its appointment.
    pub fn list_assignments_for_assistant(
        &self,
        assistant_id: &str,
    ) -> DbResult<Vec<AssignedAppointment>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT l.appointment_id, l.created_at, l.id
            FROM appointment_assistants l
            JOIN appointments a ON a.id = l.appointment_id
            WHERE l.assistant_id = ?
            ORDER BY a.time_start
            "#,
        )?;
        let links = stmt
            .query_map([assistant_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut assigned = Vec::with_capacity(links.len());
        for (appointment_id, created_at, id) in links {
            let appointment: Appointment = match self.get_appointment(&appointment_id)? {
                Some(appointment) => appointment,
                None => continue,
            };
            assigned.push(AssignedAppointment {
                assignment: AssistantAssignment {
                    id,
                    appointment_id,
                    assistant_id: assistant_id.to_string(),
                    created_at: parse_ts(&created_at)?,
                },
                appointment,
            });
        }
        Ok(assigned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppointmentKind, Assistant, LocationKind, Owner, Pet, Role, User, Vet};
    use chrono::{Duration, TimeZone, Utc};

    fn setup() -> (Database, Appointment, Assistant) {
        let db = Database::open_in_memory().unwrap();
        let user = User::new("vet", vec![Role::Vet, Role::Owner]);
        let helper = User::new("helper", vec![Role::Assistant]);
        db.insert_user(&user).unwrap();
        db.insert_user(&helper).unwrap();
        let vet = Vet::new(user.id.clone(), "Dr. Vet".into());
        let owner = Owner::new(user.id.clone(), "Vet".into());
        let assistant = Assistant::new(helper.id.clone(), "Helper".into());
        db.insert_vet(&vet).unwrap();
        db.insert_owner(&owner).unwrap();
        db.insert_assistant(&assistant).unwrap();
        let pet = Pet::new("Tom".into(), "feline".into(), Some(owner.id.clone()));
        db.insert_pet(&pet).unwrap();

        let start = Utc.with_ymd_and_hms(2025, 6, 1, 14, 0, 0).unwrap();
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
        (db, appointment, assistant)
    }

    #[test]
    fn test_link_is_idempotent() {
        let (db, appointment, assistant) = setup();

        let first = AssistantAssignment::new(appointment.id.clone(), assistant.id.clone());
        let second = AssistantAssignment::new(appointment.id.clone(), assistant.id.clone());
        assert!(db.insert_assignment_if_absent(&first).unwrap());
        assert!(!db.insert_assignment_if_absent(&second).unwrap());

        let stored = db.get_assignment(&appointment.id, &assistant.id).unwrap().unwrap();
        assert_eq!(stored.id, first.id);

        let listed = db.list_assignments_for_assistant(&assistant.id).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].appointment, appointment);
    }

    #[test]
    fn test_delete_link() {
        let (db, appointment, assistant) = setup();
        db.insert_assignment_if_absent(&AssistantAssignment::new(
            appointment.id.clone(),
            assistant.id.clone(),
        ))
        .unwrap();

        assert!(db.delete_assignment(&appointment.id, &assistant.id).unwrap());
        assert!(!db.delete_assignment(&appointment.id, &assistant.id).unwrap());
        assert!(db.get_assignment(&appointment.id, &assistant.id).unwrap().is_none());
    }
}
