//! Appointment message thread operations.

use rusqlite::params;

use super::{fmt_ts, parse_ts, Database, DbResult};
use crate::models::{AppointmentMessage, MessageOrder};

impl Database {
    /// Append a message to an appointment thread.
    pub fn insert_message(&self, message: &AppointmentMessage) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO appointment_messages (id, appointment_id, sender_id, message, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                message.id,
                message.appointment_id,
                message.sender_id,
                message.message,
                fmt_ts(&message.timestamp),
            ],
        )?;
        Ok(())
    }

    /// The thread of an appointment. Equal timestamps keep insertion order.
    pub fn list_messages(
        &self,
        appointment_id: &str,
        order: MessageOrder,
    ) -> DbResult<Vec<AppointmentMessage>> {
        let sql = match order {
            MessageOrder::Ascending => {
                r#"
                SELECT id, appointment_id, sender_id, message, timestamp
                FROM appointment_messages
                WHERE appointment_id = ?
                ORDER BY timestamp ASC, seq ASC
                "#
            }
            MessageOrder::Descending => {
                r#"
                SELECT id, appointment_id, sender_id, message, timestamp
                FROM appointment_messages
                WHERE appointment_id = ?
                ORDER BY timestamp DESC, seq DESC
                "#
            }
        };

        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([appointment_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut messages = Vec::new();
        for row in rows {
            let (id, appointment_id, sender_id, message, timestamp) = row?;
            messages.push(AppointmentMessage {
                id,
                appointment_id,
                sender_id,
                message,
                timestamp: parse_ts(&timestamp)?,
            });
        }
        Ok(messages)
    }
}
