use crate::Database;
use crate::models::{AlarmRow, SelfieRow, UserRow};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, username: &str, password_hash: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password) VALUES (?1, ?2, ?3)",
                (id, username, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    // -- Alarms --

    pub fn insert_alarm(&self, row: &AlarmRow) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO alarms (id, owner_id, scheduled_time, repeat, active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    row.id,
                    row.owner_id,
                    row.scheduled_time,
                    row.repeat,
                    row.active,
                    row.created_at,
                    row.updated_at
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_alarm(&self, id: &str) -> Result<Option<AlarmRow>> {
        self.with_conn(|conn| query_alarm(conn, id))
    }

    pub fn list_alarms(&self, owner_id: &str, only_active: bool) -> Result<Vec<AlarmRow>> {
        let sql = if only_active {
            "SELECT id, owner_id, scheduled_time, repeat, active, created_at, updated_at
             FROM alarms WHERE owner_id = ?1 AND active = 1
             ORDER BY scheduled_time ASC"
        } else {
            "SELECT id, owner_id, scheduled_time, repeat, active, created_at, updated_at
             FROM alarms WHERE owner_id = ?1
             ORDER BY scheduled_time ASC"
        };

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt
                .query_map([owner_id], alarm_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Partial update in one transaction: the current row is read, the
    /// provided fields applied, and the result written back before the
    /// lock is released. A dismissal committed by a concurrent submission
    /// therefore cannot be reverted by a patch that never mentioned
    /// `active`. Returns the updated row, or None when the alarm is
    /// missing or owned by someone else.
    pub fn apply_alarm_patch(
        &self,
        id: &str,
        owner_id: &str,
        scheduled_time: Option<&str>,
        repeat: Option<&str>,
        active: Option<bool>,
        updated_at: &str,
    ) -> Result<Option<AlarmRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(mut row) = query_alarm(&tx, id)? else {
                return Ok(None);
            };
            if row.owner_id != owner_id {
                return Ok(None);
            }

            if let Some(t) = scheduled_time {
                row.scheduled_time = t.to_string();
            }
            if let Some(r) = repeat {
                row.repeat = r.to_string();
            }
            if let Some(a) = active {
                row.active = a;
            }
            row.updated_at = updated_at.to_string();

            tx.execute(
                "UPDATE alarms SET scheduled_time = ?2, repeat = ?3, active = ?4, updated_at = ?5
                 WHERE id = ?1",
                rusqlite::params![
                    row.id,
                    row.scheduled_time,
                    row.repeat,
                    row.active,
                    row.updated_at
                ],
            )?;

            tx.commit()?;
            Ok(Some(row))
        })
    }

    /// Deletes the alarm row only. Selfie attempts are retained on purpose:
    /// they are the audit trail of dismissals, not alarm sub-records.
    pub fn delete_alarm(&self, id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute("DELETE FROM alarms WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    // -- Selfie attempts --

    /// Dismissal bookkeeping as one transaction: re-check that the alarm is
    /// still active, record the attempt, and flip the alarm off when the
    /// attempt was approved. Returns false — with nothing written — when a
    /// concurrent submission already deactivated (or deleted) the alarm.
    pub fn record_attempt(&self, attempt: &SelfieRow, now: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let active: Option<bool> = tx
                .query_row(
                    "SELECT active FROM alarms WHERE id = ?1",
                    [&attempt.alarm_id],
                    |row| row.get(0),
                )
                .optional()?;
            if active != Some(true) {
                // Dropping the transaction rolls it back.
                return Ok(false);
            }

            tx.execute(
                "INSERT INTO selfies (id, alarm_id, image_ref, brightness, approved, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    attempt.id,
                    attempt.alarm_id,
                    attempt.image_ref,
                    attempt.brightness,
                    attempt.approved,
                    attempt.created_at
                ],
            )?;

            if attempt.approved {
                tx.execute(
                    "UPDATE alarms SET active = 0, updated_at = ?2 WHERE id = ?1 AND active = 1",
                    rusqlite::params![attempt.alarm_id, now],
                )?;
            }

            tx.commit()?;
            Ok(true)
        })
    }

    pub fn list_selfies(&self, alarm_id: &str) -> Result<Vec<SelfieRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, alarm_id, image_ref, brightness, approved, created_at
                 FROM selfies WHERE alarm_id = ?1
                 ORDER BY created_at DESC, rowid DESC",
            )?;
            let rows = stmt
                .query_map([alarm_id], |row| {
                    Ok(SelfieRow {
                        id: row.get(0)?,
                        alarm_id: row.get(1)?,
                        image_ref: row.get(2)?,
                        brightness: row.get(3)?,
                        approved: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt =
        conn.prepare("SELECT id, username, password, created_at FROM users WHERE username = ?1")?;

    let row = stmt
        .query_row([username], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_alarm(conn: &Connection, id: &str) -> Result<Option<AlarmRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, owner_id, scheduled_time, repeat, active, created_at, updated_at
         FROM alarms WHERE id = ?1",
    )?;

    let row = stmt.query_row([id], alarm_from_row).optional()?;
    Ok(row)
}

fn alarm_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AlarmRow> {
    Ok(AlarmRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        scheduled_time: row.get(2)?,
        repeat: row.get(3)?,
        active: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}
