//! Appointment database operations.

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, OptionalExtension, Row};

use super::{fmt_opt_ts, fmt_ts, parse_opt_ts, parse_ts, Database, DbError, DbResult};
use crate::models::{Appointment, AppointmentKind, AppointmentStatus, LocationKind};

const APPOINTMENT_COLUMNS: &str = r#"
    a.id, a.time_start, a.time_end, a.kind, a.location, a.status, a.notes,
    a.pet_id, a.owner_id, a.vet_id, a.vet_bound, a.created_at, a.updated_at
"#;

/// Statuses that no longer hold a slot in anyone's calendar.
const INACTIVE_STATUSES: &str = "('CANCELLED', 'REJECTED')";

/// Filter for appointment listings. Unset fields do not constrain.
#[derive(Debug, Clone, Default)]
pub struct AppointmentQuery {
    /// Inclusive lower bound on `time_start`
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `time_start`
    pub until: Option<DateTime<Utc>>,
    pub kind: Option<AppointmentKind>,
    pub vet_id: Option<String>,
    pub owner_id: Option<String>,
    pub pet_id: Option<String>,
}

impl Database {
    /// Insert a new appointment.
    pub fn insert_appointment(&self, appt: &Appointment) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO appointments (
                id, time_start, time_end, kind, location, status, notes,
                pet_id, owner_id, vet_id, vet_bound, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                appt.id,
                fmt_ts(&appt.time_start),
                fmt_opt_ts(&appt.time_end),
                appt.kind.as_str(),
                appt.location.as_str(),
                appt.status.as_str(),
                appt.notes,
                appt.pet_id,
                appt.owner_id,
                appt.vet_id,
                appt.vet_bound,
                fmt_ts(&appt.created_at),
                fmt_ts(&appt.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Update the mutable fields of an appointment.
    pub fn update_appointment(&self, appt: &Appointment) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE appointments SET
                time_start = ?2,
                time_end = ?3,
                location = ?4,
                status = ?5,
                notes = ?6,
                vet_id = ?7,
                vet_bound = ?8,
                updated_at = ?9
            WHERE id = ?1
            "#,
            params![
                appt.id,
                fmt_ts(&appt.time_start),
                fmt_opt_ts(&appt.time_end),
                appt.location.as_str(),
                appt.status.as_str(),
                appt.notes,
                appt.vet_id,
                appt.vet_bound,
                fmt_ts(&appt.updated_at),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get an appointment by ID.
    pub fn get_appointment(&self, appointment_id: &str) -> DbResult<Option<Appointment>> {
        let sql = format!("SELECT {} FROM appointments a WHERE a.id = ?", APPOINTMENT_COLUMNS);
        self.conn
            .query_row(&sql, [appointment_id], AppointmentRow::from_row)
            .optional()?
            .map(Appointment::try_from)
            .transpose()
    }

    /// List appointments matching `query`, earliest start first.
    pub fn list_appointments(&self, query: &AppointmentQuery) -> DbResult<Vec<Appointment>> {
        let mut clauses = Vec::new();
        let mut values = Vec::new();

        if let Some(from) = &query.from {
            clauses.push("a.time_start >= ?");
            values.push(fmt_ts(from));
        }
        if let Some(until) = &query.until {
            clauses.push("a.time_start < ?");
            values.push(fmt_ts(until));
        }
        if let Some(kind) = query.kind {
            clauses.push("a.kind = ?");
            values.push(kind.as_str().to_string());
        }
        if let Some(vet_id) = &query.vet_id {
            clauses.push("a.vet_id = ?");
            values.push(vet_id.clone());
        }
        if let Some(owner_id) = &query.owner_id {
            clauses.push("a.owner_id = ?");
            values.push(owner_id.clone());
        }
        if let Some(pet_id) = &query.pet_id {
            clauses.push("a.pet_id = ?");
            values.push(pet_id.clone());
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT {} FROM appointments a {} ORDER BY a.time_start, a.created_at",
            APPOINTMENT_COLUMNS, where_clause
        );

        self.collect_appointments(&sql, params_from_iter(values.iter()))
    }

    /// A vet's active appointments starting in `[from, until)`, optionally
    /// leaving one appointment out (used when that appointment is being moved).
    pub fn list_active_for_vet_between(
        &self,
        vet_id: &str,
        from: &DateTime<Utc>,
        until: &DateTime<Utc>,
        exclude_id: Option<&str>,
    ) -> DbResult<Vec<Appointment>> {
        let sql = format!(
            r#"
            SELECT {} FROM appointments a
            WHERE a.vet_id = ?1
              AND a.time_start >= ?2 AND a.time_start < ?3
              AND a.status NOT IN {}
              AND a.id IS NOT ?4
            ORDER BY a.time_start
            "#,
            APPOINTMENT_COLUMNS, INACTIVE_STATUSES
        );
        self.collect_appointments(
            &sql,
            params![vet_id, fmt_ts(from), fmt_ts(until), exclude_id],
        )
    }

    /// A vet's active appointments whose interval overlaps `[start, end)`.
    ///
    /// Rows without an end time are open-ended and overlap anything after them.
    pub fn list_overlapping_for_vet(
        &self,
        vet_id: &str,
        start: &DateTime<Utc>,
        end: &DateTime<Utc>,
    ) -> DbResult<Vec<Appointment>> {
        let sql = format!(
            r#"
            SELECT {} FROM appointments a
            WHERE a.vet_id = ?1
              AND a.status NOT IN {}
              AND a.time_start < ?3
              AND (a.time_end IS NULL OR a.time_end > ?2)
            ORDER BY a.time_start
            "#,
            APPOINTMENT_COLUMNS, INACTIVE_STATUSES
        );
        self.collect_appointments(&sql, params![vet_id, fmt_ts(start), fmt_ts(end)])
    }

    fn collect_appointments<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> DbResult<Vec<Appointment>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, AppointmentRow::from_row)?;

        let mut appointments = Vec::new();
        for row in rows {
            appointments.push(row?.try_into()?);
        }
        Ok(appointments)
    }
}

/// Intermediate row struct for database mapping.
struct AppointmentRow {
    id: String,
    time_start: String,
    time_end: Option<String>,
    kind: String,
    location: String,
    status: String,
    notes: Option<String>,
    pet_id: String,
    owner_id: String,
    vet_id: Option<String>,
    vet_bound: bool,
    created_at: String,
    updated_at: String,
}

impl AppointmentRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            time_start: row.get(1)?,
            time_end: row.get(2)?,
            kind: row.get(3)?,
            location: row.get(4)?,
            status: row.get(5)?,
            notes: row.get(6)?,
            pet_id: row.get(7)?,
            owner_id: row.get(8)?,
            vet_id: row.get(9)?,
            vet_bound: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }
}

impl TryFrom<AppointmentRow> for Appointment {
    type Error = DbError;

    fn try_from(row: AppointmentRow) -> Result<Self, Self::Error> {
        let kind = AppointmentKind::parse(&row.kind)
            .ok_or_else(|| DbError::Constraint(format!("Invalid appointment kind: {}", row.kind)))?;
        let location = LocationKind::parse(&row.location)
            .ok_or_else(|| DbError::Constraint(format!("Invalid location: {}", row.location)))?;
        let status = AppointmentStatus::parse(&row.status).ok_or_else(|| {
            DbError::Constraint(format!("Invalid appointment status: {}", row.status))
        })?;

        Ok(Appointment {
            id: row.id,
            time_start: parse_ts(&row.time_start)?,
            time_end: parse_opt_ts(row.time_end)?,
            kind,
            location,
            status,
            notes: row.notes,
            pet_id: row.pet_id,
            owner_id: row.owner_id,
            vet_id: row.vet_id,
            vet_bound: row.vet_bound,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}
