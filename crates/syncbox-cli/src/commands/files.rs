use clap::Args;
use console::style;
use indicatif::HumanBytes;
use syncbox_core::models::file_meta::FileStatus;
use syncbox_db::ops;

use super::Globals;

#[derive(Args)]
pub struct FilesArgs {
    /// Only files in this status (pending, uploading, uploaded, committed, error)
    #[arg(long)]
    status: Option<FileStatus>,
}

pub fn run(args: FilesArgs, globals: &Globals) -> anyhow::Result<()> {
    let store = globals.open_store()?;
    let project = globals.project(&store)?;
    let files = store.with(|conn| ops::list_files(conn, &project.id, args.status))?;

    if globals.json {
        println!("{}", serde_json::to_string_pretty(&files)?);
        return Ok(());
    }

    for f in &files {
        let status = match f.status {
            FileStatus::Pending => style(f.status.as_str()).dim(),
            FileStatus::Uploading => style(f.status.as_str()).cyan(),
            FileStatus::Uploaded | FileStatus::Committed => style(f.status.as_str()).green(),
            FileStatus::Error => style(f.status.as_str()).red(),
        };
        let path = if f.is_directory {
            format!("{}/", f.path)
        } else {
            f.path.clone()
        };
        println!("{:<9} {:>10}  {}", status, HumanBytes(f.size).to_string(), path);
        if let Some(ref message) = f.error_message {
            println!("{:<9} {:>10}  {}", "", "", style(message).red());
        }
    }
    if files.is_empty() {
        println!("No files tracked in '{}'. Add some with: syncbox add <paths>", project.name);
    }
    Ok(())
}
