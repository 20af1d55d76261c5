use crate::models::file_meta::FileStatus;

/// Central error type for the sync engine.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("project not found: {id}")]
    ProjectNotFound { id: String },

    #[error("project already exists: {name}")]
    ProjectAlreadyExists { name: String },

    #[error("file not found: {path}")]
    FileNotFound { path: String },

    #[error("batch not found: {id}")]
    BatchNotFound { id: String },

    #[error("invalid status transition for {path}: {from} -> {to}")]
    InvalidTransition {
        path: String,
        from: FileStatus,
        to: FileStatus,
    },

    #[error("scheduler stopped: {message}")]
    Scheduling { message: String },

    #[error("config error: {message}")]
    Config { message: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_record() {
        let err = SyncError::InvalidTransition {
            path: "a/b.txt".to_string(),
            from: FileStatus::Uploaded,
            to: FileStatus::Pending,
        };
        assert_eq!(
            err.to_string(),
            "invalid status transition for a/b.txt: uploaded -> pending"
        );

        let err: SyncError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, SyncError::Io(_)));
    }
}
