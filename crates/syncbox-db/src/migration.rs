use rusqlite::Connection;

use crate::schema;

#[cfg(test)]
const CURRENT_VERSION: i64 = 2;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> anyhow::Result<()> {
    // Ensure schema_version table exists.
    conn.execute_batch(schema::CREATE_SCHEMA_VERSION)?;

    let current = get_version(conn)?;

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn get_version(conn: &Connection) -> anyhow::Result<i64> {
    let version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);
    Ok(version)
}

fn set_version(conn: &Connection, version: i64) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO schema_version (version, applied_at) VALUES (?1, datetime('now'))",
        [version],
    )?;
    Ok(())
}

/// Migration v1: create the five record tables.
fn migrate_v1(conn: &Connection) -> anyhow::Result<()> {
    tracing::info!("applying migration v1: initial schema");
    for stmt in &schema::ALL_TABLES[1..] {
        conn.execute_batch(stmt)?;
    }
    set_version(conn, 1)?;
    Ok(())
}

/// Migration v2: index files by (project, status) for the pending-file scan.
fn migrate_v2(conn: &Connection) -> anyhow::Result<()> {
    tracing::info!("applying migration v2: files status index");
    conn.execute_batch(schema::CREATE_FILES_STATUS_INDEX)?;
    set_version(conn, 2)?;
    Ok(())
}
