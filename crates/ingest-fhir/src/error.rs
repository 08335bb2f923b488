use thiserror::Error;

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("fhir store request failed: {0}")]
    Transport(String),

    #[error("fhir store returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("failed to serialize observation: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl WriterError {
    /// Transport failures and 5xx responses are retried; 4xx is a client-side
    /// rejection that retrying cannot fix.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::HttpStatus { status, .. } => *status >= 500,
            Self::Serialize(_) => false,
        }
    }
}
