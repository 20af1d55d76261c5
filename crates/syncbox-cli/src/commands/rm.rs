use clap::Args;
use syncbox_core::models::file_meta::{FileKey, FileStatus};
use syncbox_db::ops;

use super::Globals;

#[derive(Args)]
pub struct RmArgs {
    /// Project-relative path of the file
    path: String,
}

pub fn run(args: RmArgs, globals: &Globals) -> anyhow::Result<()> {
    let store = globals.open_store()?;
    let project = globals.project(&store)?;
    let key = FileKey::new(project.id.clone(), args.path.trim_matches('/'));

    store.with(|conn| {
        if let Some(meta) = ops::get_file(conn, &key)? {
            if meta.status == FileStatus::Uploading {
                anyhow::bail!("{} is being uploaded, stop the upload first", meta.path);
            }
        }
        ops::delete_file(conn, &key)
    })?;
    tracing::info!(project = %project.id, path = %key.path, "removed file");

    if globals.json {
        println!("{}", serde_json::json!({ "removed": key.path }));
    } else {
        println!("Removed {} from '{}'", key.path, project.name);
    }
    Ok(())
}
