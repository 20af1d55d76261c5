use chrono::{DateTime, Utc};
use serde::Serialize;

/// Counters for the current upload run. Reset by every `start_upload`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadStats {
    pub total_files: u64,
    pub uploaded_files: u64,
    pub failed_files: u64,
    pub total_size: u64,
    pub uploaded_size: u64,
    pub start_time: Option<DateTime<Utc>>,
}

impl UploadStats {
    pub fn started_now() -> Self {
        Self {
            start_time: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub fn processed_files(&self) -> u64 {
        self.uploaded_files + self.failed_files
    }

    pub fn record_uploaded(&mut self, size: u64) {
        self.uploaded_files += 1;
        self.uploaded_size += size;
    }

    pub fn record_failed(&mut self) {
        self.failed_files += 1;
    }

    /// Widen the totals to cover a pass that found `pending` more files.
    pub fn plan_pass(&mut self, pending_files: u64, pending_size: u64) {
        self.total_files = self.processed_files() + pending_files;
        self.total_size = self.uploaded_size + pending_size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_pass_counts_processed() {
        let mut stats = UploadStats::started_now();
        stats.plan_pass(3, 30);
        stats.record_uploaded(10);
        stats.record_failed();
        // One file left plus the failed one reset and picked up again.
        stats.plan_pass(2, 20);
        assert_eq!(stats.total_files, 4);
        assert_eq!(stats.total_size, 30);
        assert_eq!(stats.processed_files(), 2);
    }
}
