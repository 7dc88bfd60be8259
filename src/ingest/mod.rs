pub mod client;
pub mod fields;
pub mod sync;

use thiserror::Error;

/// Ingestion failures. Per-item problems never surface here: they are
/// logged, recorded on the sync run, and the pass moves on to siblings.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("another ingestion pass is already running")]
    AlreadyRunning,
    #[error("tracker returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("response decode failed: {0}")]
    Decode(String),
    #[error("all {attempts} attempts failed: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
    #[error(transparent)]
    Store(#[from] crate::db::StoreError),
}
