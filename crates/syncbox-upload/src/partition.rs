use syncbox_core::models::file_meta::FileMeta;

/// Greedy left-to-right split of `files` into batches.
///
/// A batch is closed as soon as the next file would push it past `max_files`
/// or `max_size`. A file larger than `max_size` on its own still gets a batch
/// of one. Order is preserved.
pub fn partition(files: &[FileMeta], max_files: usize, max_size: u64) -> Vec<Vec<FileMeta>> {
    let mut batches = Vec::new();
    let mut current: Vec<FileMeta> = Vec::new();
    let mut current_size = 0u64;

    for file in files {
        let full = current.len() >= max_files || current_size + file.size > max_size;
        if !current.is_empty() && full {
            batches.push(std::mem::take(&mut current));
            current_size = 0;
        }
        current_size += file.size;
        current.push(file.clone());
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}
