#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("storage request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid storage response: {0}")]
    InvalidResponse(String),
    #[error("storage wallet holds {available} winston, upload needs {needed}")]
    InsufficientFunds { needed: u64, available: u64 },
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),
    #[error("upload failed: {0}")]
    UploadFailed(String),
}
