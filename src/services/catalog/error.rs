use thiserror::Error;

/// Failure talking to the catalog, its web pages, or a search engine
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl FetchError {
    /// Worth retrying: timeouts, transport errors, 408/429 and 5xx
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout | FetchError::Http(_) => true,
            FetchError::Status(status) => {
                *status == 408 || *status == 429 || (500..600).contains(status)
            }
            FetchError::Parse(_) | FetchError::Unavailable(_) => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = err.status() {
            FetchError::Status(status.as_u16())
        } else if err.is_decode() {
            FetchError::Parse(err.to_string())
        } else {
            FetchError::Http(err.to_string())
        }
    }
}
