//! Connection setup for the count store.
//!
//! # Invariants
//! - Returned connections enforce foreign keys and wait on busy locks.
//! - Returned connections are at `latest_version()`.

use super::migrations::{apply_migrations, latest_version};
use super::{DbError, DbResult};
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

// Overrides may open their own connection to the same file.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens (or creates) a count store file and migrates it.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    prepare("file", || Connection::open(path))
}

/// Opens a private in-memory count store, migrated.
pub fn open_db_in_memory() -> DbResult<Connection> {
    prepare("memory", Connection::open_in_memory)
}

fn prepare(
    backing: &'static str,
    connect: impl FnOnce() -> rusqlite::Result<Connection>,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    let outcome = connect()
        .map_err(DbError::from)
        .and_then(|mut conn| -> DbResult<(Connection, usize)> {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            conn.busy_timeout(BUSY_TIMEOUT)?;
            let steps = apply_migrations(&mut conn)?;
            Ok((conn, steps))
        });

    let elapsed_ms = started_at.elapsed().as_millis();
    match outcome {
        Ok((conn, steps)) => {
            info!(
                "event=db_open module=db status=ok backing={backing} schema={} steps_applied={steps} duration_ms={elapsed_ms}",
                latest_version()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error backing={backing} duration_ms={elapsed_ms} error={err}"
            );
            Err(err)
        }
    }
}
