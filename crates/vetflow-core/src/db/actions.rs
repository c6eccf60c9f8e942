//! Action ledger database operations.

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, OptionalExtension, Row};

use super::{fmt_opt_ts, fmt_ts, parse_opt_ts, parse_ts, Database, DbError, DbResult};
use crate::models::{ActionKind, ActionStatus, AppointmentAction};

const ACTION_COLUMNS: &str = r#"
    x.id, x.appointment_id, x.kind, x.status, x.description, x.notes,
    x.scheduled_time, x.completed_time, x.created_by, x.assigned_to,
    x.prev_hash, x.entry_hash
"#;

/// Filter for ledger listings. Unset fields do not constrain.
#[derive(Debug, Clone, Default)]
pub struct ActionQuery {
    pub appointment_id: Option<String>,
    pub kind: Option<ActionKind>,
    pub status: Option<ActionStatus>,
    /// User id of the creator
    pub created_by: Option<String>,
    /// User id of the assignee
    pub assigned_to: Option<String>,
}

impl Database {
    /// Append a sealed row to the ledger.
    pub fn insert_action(&self, action: &AppointmentAction) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO appointment_actions (
                id, appointment_id, kind, status, description, notes,
                scheduled_time, completed_time, created_by, assigned_to,
                prev_hash, entry_hash
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                action.id,
                action.appointment_id,
                action.kind.as_str(),
                action.status.as_str(),
                action.description,
                action.notes,
                fmt_ts(&action.scheduled_time),
                fmt_opt_ts(&action.completed_time),
                action.created_by,
                action.assigned_to,
                action.prev_hash,
                action.entry_hash,
            ],
        )?;
        Ok(())
    }

    /// Persist a sub-status change. Only status and completion time are mutable.
    pub fn update_action_status(&self, action: &AppointmentAction) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE appointment_actions SET status = ?2, completed_time = ?3 WHERE id = ?1",
            params![
                action.id,
                action.status.as_str(),
                fmt_opt_ts(&action.completed_time),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a ledger row by ID.
    pub fn get_action(&self, action_id: &str) -> DbResult<Option<AppointmentAction>> {
        let sql = format!("SELECT {} FROM appointment_actions x WHERE x.id = ?", ACTION_COLUMNS);
        self.conn
            .query_row(&sql, [action_id], ActionRow::from_row)
            .optional()?
            .map(AppointmentAction::try_from)
            .transpose()
    }

    /// List ledger rows matching `query`, in append order.
    pub fn list_actions(&self, query: &ActionQuery) -> DbResult<Vec<AppointmentAction>> {
        let mut clauses = Vec::new();
        let mut values = Vec::new();

        if let Some(appointment_id) = &query.appointment_id {
            clauses.push("x.appointment_id = ?");
            values.push(appointment_id.clone());
        }
        if let Some(kind) = query.kind {
            clauses.push("x.kind = ?");
            values.push(kind.as_str().to_string());
        }
        if let Some(status) = query.status {
            clauses.push("x.status = ?");
            values.push(status.as_str().to_string());
        }
        if let Some(created_by) = &query.created_by {
            clauses.push("x.created_by = ?");
            values.push(created_by.clone());
        }
        if let Some(assigned_to) = &query.assigned_to {
            clauses.push("x.assigned_to = ?");
            values.push(assigned_to.clone());
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT {} FROM appointment_actions x {} ORDER BY x.rowid",
            ACTION_COLUMNS, where_clause
        );
        self.collect_actions(&sql, params_from_iter(values.iter()))
    }

    /// The whole ledger in append order, for chain verification.
    pub fn list_ledger(&self) -> DbResult<Vec<AppointmentAction>> {
        self.list_actions(&ActionQuery::default())
    }

    /// Hash of the most recently appended row, or empty for an empty ledger.
    pub fn last_entry_hash(&self) -> DbResult<String> {
        Ok(self
            .conn
            .query_row(
                "SELECT entry_hash FROM appointment_actions ORDER BY rowid DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or_default())
    }

    /// Live ASSIGN_ASSISTANT rows for `user_id` whose appointment starts in
    /// `[from, until)`, each paired with that appointment's start.
    ///
    /// Cancelled actions and cancelled/rejected appointments are skipped, as
    /// are rows belonging to `exclude_appointment`.
    pub fn list_active_assignments_between(
        &self,
        user_id: &str,
        from: &DateTime<Utc>,
        until: &DateTime<Utc>,
        exclude_appointment: Option<&str>,
    ) -> DbResult<Vec<(AppointmentAction, DateTime<Utc>)>> {
        let sql = format!(
            r#"
            SELECT {}, a.time_start
            FROM appointment_actions x
            JOIN appointments a ON a.id = x.appointment_id
            WHERE x.assigned_to = ?1
              AND x.kind = 'ASSIGN_ASSISTANT'
              AND x.status != 'CANCELLED'
              AND a.status NOT IN ('CANCELLED', 'REJECTED')
              AND a.time_start >= ?2 AND a.time_start < ?3
              AND x.appointment_id IS NOT ?4
            ORDER BY a.time_start
            "#,
            ACTION_COLUMNS
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![user_id, fmt_ts(from), fmt_ts(until), exclude_appointment],
            |row| Ok((ActionRow::from_row(row)?, row.get::<_, String>(12)?)),
        )?;

        let mut found = Vec::new();
        for row in rows {
            let (action_row, start) = row?;
            found.push((action_row.try_into()?, parse_ts(&start)?));
        }
        Ok(found)
    }

    /// ASSIGN_ASSISTANT rows behind an assistant's links, by appointment start.
    pub fn list_linked_assignment_actions(
        &self,
        assistant_id: &str,
        status: Option<ActionStatus>,
    ) -> DbResult<Vec<AppointmentAction>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM appointment_assistants l
            JOIN assistants s ON s.id = l.assistant_id
            JOIN appointments a ON a.id = l.appointment_id
            JOIN appointment_actions x
              ON x.appointment_id = l.appointment_id AND x.assigned_to = s.user_id
            WHERE l.assistant_id = ?1
              AND x.kind = 'ASSIGN_ASSISTANT'
              AND (?2 IS NULL OR x.status = ?2)
            ORDER BY a.time_start, x.rowid
            "#,
            ACTION_COLUMNS
        );
        self.collect_actions(&sql, params![assistant_id, status.map(|s| s.as_str())])
    }

    /// Number of non-cancelled ASSIGN_ASSISTANT rows for one appointment/user pair.
    pub fn count_live_assignment_actions(
        &self,
        appointment_id: &str,
        user_id: &str,
    ) -> DbResult<i64> {
        Ok(self.conn.query_row(
            r#"
            SELECT COUNT(*) FROM appointment_actions
            WHERE appointment_id = ?1 AND assigned_to = ?2
              AND kind = 'ASSIGN_ASSISTANT' AND status != 'CANCELLED'
            "#,
            params![appointment_id, user_id],
            |row| row.get(0),
        )?)
    }

    fn collect_actions<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> DbResult<Vec<AppointmentAction>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, ActionRow::from_row)?;

        let mut actions = Vec::new();
        for row in rows {
            actions.push(row?.try_into()?);
        }
        Ok(actions)
    }
}

/// Intermediate row struct for database mapping.
struct ActionRow {
    id: String,
    appointment_id: String,
    kind: String,
    status: String,
    description: String,
    notes: Option<String>,
    scheduled_time: String,
    completed_time: Option<String>,
    created_by: String,
    assigned_to: Option<String>,
    prev_hash: String,
    entry_hash: String,
}

impl ActionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            appointment_id: row.get(1)?,
            kind: row.get(2)?,
            status: row.get(3)?,
            description: row.get(4)?,
            notes: row.get(5)?,
            scheduled_time: row.get(6)?,
            completed_time: row.get(7)?,
            created_by: row.get(8)?,
            assigned_to: row.get(9)?,
            prev_hash: row.get(10)?,
            entry_hash: row.get(11)?,
        })
    }
}

impl TryFrom<ActionRow> for AppointmentAction {
    type Error = DbError;

    fn try_from(row: ActionRow) -> Result<Self, Self::Error> {
        let kind = ActionKind::parse(&row.kind)
            .ok_or_else(|| DbError::Constraint(format!("Invalid action kind: {}", row.kind)))?;
        let status = ActionStatus::parse(&row.status)
            .ok_or_else(|| DbError::Constraint(format!("Invalid action status: {}", row.status)))?;

        Ok(AppointmentAction {
            id: row.id,
            appointment_id: row.appointment_id,
            kind,
            status,
            description: row.description,
            notes: row.notes,
            scheduled_time: parse_ts(&row.scheduled_time)?,
            completed_time: parse_opt_ts(row.completed_time)?,
            created_by: row.created_by,
            assigned_to: row.assigned_to,
            prev_hash: row.prev_hash,
            entry_hash: row.entry_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Appointment, AppointmentKind, AppointmentStatus, Assistant, AssistantAssignment,
        LocationKind, Owner, Pet, Role, User, Vet,
    };
    use chrono::{Duration, TimeZone};

    struct Fixture {
        db: Database,
        vet_user: User,
        assistant_user: User,
        appointment: Appointment,
    }

    fn setup() -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let vet_user = User::new("vet", vec![Role::Vet, Role::Owner]);
        let assistant_user = User::new("helper", vec![Role::Assistant]);
        db.insert_user(&vet_user).unwrap();
        db.insert_user(&assistant_user).unwrap();
        let vet = Vet::new(vet_user.id.clone(), "Dr. Vet".into());
        let owner = Owner::new(vet_user.id.clone(), "Vet".into());
        db.insert_vet(&vet).unwrap();
        db.insert_owner(&owner).unwrap();
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

        Fixture {
            db,
            vet_user,
            assistant_user,
            appointment,
        }
    }

    fn append(f: &Fixture, kind: ActionKind, status: ActionStatus) -> AppointmentAction {
        let mut action = AppointmentAction::new(
            f.appointment.id.clone(),
            kind,
            status,
            "work item".into(),
            None,
            f.vet_user.id.clone(),
            Some(f.assistant_user.id.clone()),
        );
        action.seal(&f.db.last_entry_hash().unwrap()).unwrap();
        f.db.insert_action(&action).unwrap();
        action
    }

    #[test]
    fn test_insert_get_and_chain_head() {
        let f = setup();
        assert_eq!(f.db.last_entry_hash().unwrap(), "");

        let first = append(&f, ActionKind::AssignAssistant, ActionStatus::Pending);
        let second = append(&f, ActionKind::Approve, ActionStatus::Completed);

        assert_eq!(second.prev_hash, first.entry_hash);
        assert_eq!(f.db.last_entry_hash().unwrap(), second.entry_hash);
        assert_eq!(f.db.get_action(&first.id).unwrap(), Some(first));
    }

    #[test]
    fn test_only_status_is_mutable() {
        let f = setup();
        let mut action = append(&f, ActionKind::AssignAssistant, ActionStatus::Pending);
        action.status = ActionStatus::Completed;
        action.completed_time = Some(Utc::now());
        assert!(f.db.update_action_status(&action).unwrap());

        let result = f.db.conn().execute(
            "UPDATE appointment_actions SET kind = 'REJECT' WHERE id = ?",
            [&action.id],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_query_by_assignee_and_status() {
        let f = setup();
        append(&f, ActionKind::AssignAssistant, ActionStatus::Pending);
        append(&f, ActionKind::Approve, ActionStatus::Completed);

        let pending = f
            .db
            .list_actions(&ActionQuery {
                assigned_to: Some(f.assistant_user.id.clone()),
                status: Some(ActionStatus::Pending),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, ActionKind::AssignAssistant);

        let by_creator = f
            .db
            .list_actions(&ActionQuery {
                created_by: Some(f.vet_user.id.clone()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_creator.len(), 2);
    }

    #[test]
    fn test_linked_assignments_follow_the_link() {
        let f = setup();
        let assistant = Assistant::new(f.assistant_user.id.clone(), "Helper".into());
        f.db.insert_assistant(&assistant).unwrap();
        append(&f, ActionKind::AssignAssistant, ActionStatus::Pending);
        assert!(f
            .db
            .list_linked_assignment_actions(&assistant.id, None)
            .unwrap()
            .is_empty());

        f.db.insert_assignment_if_absent(&AssistantAssignment::new(
            f.appointment.id.clone(),
            assistant.id.clone(),
        ))
        .unwrap();
        append(&f, ActionKind::AssignAssistant, ActionStatus::Completed);
        append(&f, ActionKind::Approve, ActionStatus::Completed);

        let all = f.db.list_linked_assignment_actions(&assistant.id, None).unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|a| a.kind == ActionKind::AssignAssistant));
        let pending = f
            .db
            .list_linked_assignment_actions(&assistant.id, Some(ActionStatus::Pending))
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].status, ActionStatus::Pending);
    }

    #[test]
    fn test_active_assignments_skip_cancelled_appointments() {
        let f = setup();
        append(&f, ActionKind::AssignAssistant, ActionStatus::Pending);

        let from = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let until = from + Duration::days(1);
        let found = f
            .db
            .list_active_assignments_between(&f.assistant_user.id, &from, &until, None)
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].1, f.appointment.time_start);

        let excluded = f
            .db
            .list_active_assignments_between(
                &f.assistant_user.id,
                &from,
                &until,
                Some(&f.appointment.id),
            )
            .unwrap();
        assert!(excluded.is_empty());

        let mut appointment = f.appointment.clone();
        appointment.status = AppointmentStatus::Cancelled;
        f.db.update_appointment(&appointment).unwrap();
        assert!(f
            .db
            .list_active_assignments_between(&f.assistant_user.id, &from, &until, None)
            .unwrap()
            .is_empty());
        assert_eq!(
            f.db
                .count_live_assignment_actions(&f.appointment.id, &f.assistant_user.id)
                .unwrap(),
            1
        );
    }
}
