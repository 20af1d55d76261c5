use std::sync::Arc;

use super::push::{report, uploader, BarObserver};
use super::Globals;

pub fn run(globals: &Globals) -> anyhow::Result<()> {
    let config = globals.load_config()?;
    let store = globals.open_store()?;
    let project = globals.project(&store)?;

    let observer = Arc::new(BarObserver::new(!globals.json)?);
    let uploader = uploader(&store, &config, Arc::clone(&observer))?;

    let reset = uploader.retry_failed(&project.id)?;
    if reset == 0 {
        observer.finish();
        if globals.json {
            println!("{}", serde_json::json!({ "project": project.name, "retried": 0 }));
        } else {
            println!("No failed files in '{}'.", project.name);
        }
        return Ok(());
    }

    if !globals.json {
        println!("Retrying {} files in '{}'...", reset, project.name);
    }
    let result = uploader.wait();
    observer.finish();
    report(&store, &project, &result?, 0, globals.json)
}
