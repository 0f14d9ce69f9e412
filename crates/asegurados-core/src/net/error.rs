use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Network unavailable: {0}")]
    Unavailable(String),

    #[error("Unexpected status {status} from {url}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Offline worker has shut down")]
    WorkerGone,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl FetchError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(url: &str, status: u16, body: &str) -> Self {
        FetchError::Status {
            url: url.to_string(),
            status,
            body: Self::truncate_body(body),
        }
    }

    /// True when the request never produced a response at all.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            FetchError::Network(_) | FetchError::Unavailable(_) | FetchError::WorkerGone
        )
    }
}
