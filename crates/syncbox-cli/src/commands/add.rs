use clap::Args;
use console::style;
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use std::path::PathBuf;
use syncbox_walk::ingest::ingest;
use syncbox_walk::walker::spawn_walk;
use syncbox_walk::{Selection, WalkErrorKind};

use super::Globals;

#[derive(Args)]
pub struct AddArgs {
    /// Files or folders to track
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Put every file at the top level, ignoring folder structure
    #[arg(long)]
    flat: bool,
}

fn selection(args: AddArgs) -> Selection {
    if args.flat {
        return Selection::Files(args.paths);
    }
    match args.paths.as_slice() {
        [single] if single.is_dir() => Selection::Directory(single.clone()),
        _ => Selection::Entries(args.paths),
    }
}

pub fn run(args: AddArgs, globals: &Globals) -> anyhow::Result<()> {
    let config = globals.load_config()?;
    let store = globals.open_store()?;
    let project = globals.project(&store)?;

    let (progress, handle) = spawn_walk(selection(args), config.walk.clone());

    let pb = if globals.json {
        None
    } else {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} files walked {msg}")?
                .progress_chars("#>-"),
        );
        Some(pb)
    };
    for update in progress {
        if let Some(ref pb) = pb {
            pb.set_length(update.total_files);
            pb.set_position(update.files_processed);
            pb.set_message(update.current_path);
        }
    }
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    let walked = handle
        .join()
        .map_err(|_| anyhow::anyhow!("walk thread panicked"))??;
    let summary = ingest(&store, &project.id, &walked)?;

    if globals.json {
        println!(
            "{}",
            serde_json::json!({
                "project": project.name,
                "files": walked.file_count,
                "directories": walked.directory_count,
                "total_size": walked.total_size,
                "ignored": walked.ignored_count,
                "errors": walked.errors.len(),
                "added": summary.added,
                "changed": summary.changed,
                "unchanged": summary.unchanged,
                "in_flight": summary.in_flight,
            })
        );
        return Ok(());
    }

    println!(
        "Walked {} files ({}) into '{}', {} ignored",
        walked.file_count,
        HumanBytes(walked.total_size),
        project.name,
        walked.ignored_count
    );
    println!(
        "  {} added, {} changed, {} unchanged",
        summary.added, summary.changed, summary.unchanged
    );
    if summary.in_flight > 0 {
        println!(
            "  {} changed while uploading, add again after the upload finishes",
            summary.in_flight
        );
    }
    for e in &walked.errors {
        let label = match e.kind {
            WalkErrorKind::Oversized => style("too large").yellow(),
            WalkErrorKind::Unreadable => style("unreadable").red(),
        };
        println!("  {} {}: {}", label, e.path, e.message);
    }
    Ok(())
}
