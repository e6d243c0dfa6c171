use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Creation parameters were rejected. Nothing was stored.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// Absent, expired and exhausted handles all land here, with no detail.
    #[error("secret not found")]
    NotFound,
    /// The backend failed to read or write. Any open transaction was rolled back.
    #[error("storage fault: {0:#}")]
    Storage(anyhow::Error),
}
