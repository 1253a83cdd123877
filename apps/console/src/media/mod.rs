// Media handling for reconciled transcripts: download photos from the
// platform CDN and re-host them in object storage.

pub mod fetcher;
pub mod storage;

pub use fetcher::{HttpMediaFetcher, MediaError, MediaFetcher};
pub use storage::{object_name, ObjectStore, S3ObjectStore, UploadError};
