use chrono::{Duration, Utc};
use clap::Args;
use syncbox_db::ops;

use super::Globals;

#[derive(Args)]
pub struct GcArgs {
    /// Keep completed batches newer than this many hours (defaults to the
    /// configured retention)
    #[arg(long)]
    hours: Option<u32>,
}

pub fn run(args: GcArgs, globals: &Globals) -> anyhow::Result<()> {
    let config = globals.load_config()?;
    let store = globals.open_store()?;
    // Without --project every project is swept.
    let project = match globals.project {
        Some(_) => Some(globals.project(&store)?),
        None => None,
    };

    let hours = args.hours.unwrap_or(config.retention.batch_retention_hours);
    let cutoff = Utc::now() - Duration::hours(i64::from(hours));
    let removed = store.with(|conn| {
        ops::cleanup_batches(conn, project.as_ref().map(|p| &p.id), cutoff)
    })?;
    tracing::info!(removed, hours, "cleaned up completed batches");

    if globals.json {
        println!("{}", serde_json::json!({ "removed_batches": removed, "retention_hours": hours }));
    } else {
        println!(
            "Removed {} completed batches older than {} hours",
            removed, hours
        );
    }
    Ok(())
}
