pub mod content;
pub mod events;
pub mod http;
pub mod memory;
pub mod partition;
pub mod stats;
pub mod transport;
pub mod uploader;
pub mod worker;

pub use events::{NoopObserver, UploadObserver};
pub use http::HttpTransport;
pub use memory::MemoryRemote;
pub use stats::UploadStats;
pub use transport::{CancelToken, TransferError, Transport};
pub use uploader::BatchUploader;
