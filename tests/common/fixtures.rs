//! Test fixture helpers for the vlog database
//!
//! Expiry is enforced at read time, so tests never need to wait for real
//! time to pass. Instead these helpers rewrite `expires_at` directly in
//! the SQLite file, shifting a vlog backwards or forwards around the
//! boundary the server checks against.

use anyhow::Result;
use rusqlite::{params, Connection};
use std::path::Path;

/// Shifts a vlog's `expires_at` back by `secs` seconds.
///
/// Shifting by more than the remaining lifetime pushes the vlog past its
/// expiry; shifting by less leaves it active but closer to the boundary.
pub fn rewind_vlog_expiry(db_path: &Path, vlog_id: u64, secs: i64) -> Result<()> {
    let conn = Connection::open(db_path)?;
    let updated = conn.execute(
        "UPDATE vlog SET expires_at = expires_at - ?1 WHERE id = ?2",
        params![secs, vlog_id],
    )?;
    anyhow::ensure!(updated == 1, "no vlog with id {}", vlog_id);
    Ok(())
}

/// Forces a vlog past its expiry boundary, as if posted over 72h ago.
pub fn expire_vlog(db_path: &Path, vlog_id: u64) -> Result<()> {
    let conn = Connection::open(db_path)?;
    let updated = conn.execute(
        "UPDATE vlog SET expires_at = cast(strftime('%s','now') as int) - 60 WHERE id = ?1",
        params![vlog_id],
    )?;
    anyhow::ensure!(updated == 1, "no vlog with id {}", vlog_id);
    Ok(())
}

/// Reads a vlog's stored `likes_count` straight from the database.
pub fn stored_likes_count(db_path: &Path, vlog_id: u64) -> Result<i64> {
    let conn = Connection::open(db_path)?;
    let count = conn.query_row(
        "SELECT likes_count FROM vlog WHERE id = ?1",
        params![vlog_id],
        |row| row.get(0),
    )?;
    Ok(count)
}
