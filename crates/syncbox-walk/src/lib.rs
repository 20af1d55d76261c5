pub mod chunker;
pub mod hasher;
pub mod ignore;
pub mod ingest;
pub mod walker;

pub use walker::{walk, Selection, WalkError, WalkErrorKind, WalkProgress, WalkResult, WalkedFile};
