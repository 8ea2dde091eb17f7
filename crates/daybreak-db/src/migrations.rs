use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS alarms (
            id              TEXT PRIMARY KEY,
            owner_id        TEXT NOT NULL REFERENCES users(id),
            scheduled_time  TEXT NOT NULL,
            repeat          TEXT NOT NULL CHECK (repeat IN ('once', 'daily', 'weekly')),
            active          INTEGER NOT NULL DEFAULT 1,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_alarms_owner
            ON alarms(owner_id, scheduled_time);

        -- No foreign key on alarm_id: attempts are an append-only audit
        -- trail and must survive deletion of their alarm.
        CREATE TABLE IF NOT EXISTS selfies (
            id          TEXT PRIMARY KEY,
            alarm_id    TEXT NOT NULL,
            image_ref   TEXT NOT NULL,
            brightness  INTEGER NOT NULL,
            approved    INTEGER NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_selfies_alarm
            ON selfies(alarm_id, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
