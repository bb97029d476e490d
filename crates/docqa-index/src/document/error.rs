#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("file too large: {0} bytes")]
    FileTooLarge(u64),

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("no text could be extracted from {0}")]
    EmptyDocument(String),
}

impl DocumentError {
    /// Errors the caller can fix by sending a different file.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFormat(_)
                | Self::FileTooLarge(_)
                | Self::EmptyDocument(_)
                | Self::Pdf(_)
        )
    }
}
