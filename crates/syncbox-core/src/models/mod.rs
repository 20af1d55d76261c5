pub mod batch;
pub mod chunk;
pub mod file_meta;
pub mod project;
pub mod queue;
