pub mod migration;
pub mod ops;
pub mod schema;
pub mod store;

use rusqlite::Connection;
use std::path::Path;

pub use store::ContentStore;

/// Open (or create) the content store database at `path` and bring its
/// schema up to date.
pub fn open_db(path: &Path) -> anyhow::Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    configure(&conn)?;
    migration::run_migrations(&conn)?;
    tracing::debug!("opened content store at {}", path.display());
    Ok(conn)
}

/// Open a fresh in-memory database with the full schema.
pub fn open_memory_db() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    migration::run_migrations(&conn)?;
    Ok(conn)
}

fn configure(conn: &Connection) -> anyhow::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    Ok(())
}
