/// Errors returned by a shared store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("quota exceeded writing {key}: {size} bytes (quota {quota})")]
    QuotaExceeded {
        key: String,
        size: usize,
        quota: usize,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}
