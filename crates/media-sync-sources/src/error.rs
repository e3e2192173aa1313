use thiserror::Error;

/// Failure talking to one of the external services or datasets
#[derive(Debug, Error)]
pub enum SourceError {
    /// `reached_server` is false only when the connection was never made
    #[error("{service} request failed: {message}")]
    Transport {
        service: String,
        message: String,
        reached_server: bool,
    },

    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: String,
        status: u16,
        body: String,
    },

    #[error("Failed to decode {service} response: {message}")]
    Decode { service: String, message: String },

    #[error("Invalid data: {0}")]
    Validation(String),

    #[error("Not authenticated with {0}")]
    NotAuthenticated(String),

    #[error("{service} unavailable after {attempts} attempts: {reason}")]
    Unavailable {
        service: String,
        attempts: u32,
        reason: String,
    },

    #[error("Dataset {name}: {message}")]
    Dataset { name: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    /// Classify a reqwest failure. Only connection-level problems are retryable.
    pub fn from_reqwest(service: &str, err: reqwest::Error) -> Self {
        if err.is_decode() {
            SourceError::Decode {
                service: service.to_string(),
                message: err.to_string(),
            }
        } else if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
            SourceError::Transport {
                service: service.to_string(),
                message: err.to_string(),
                reached_server: !err.is_connect(),
            }
        } else if let Some(status) = err.status() {
            SourceError::Status {
                service: service.to_string(),
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            SourceError::Validation(format!("{}: {}", service, err))
        }
    }

    pub fn decode(service: &str, err: impl std::fmt::Display) -> Self {
        SourceError::Decode {
            service: service.to_string(),
            message: err.to_string(),
        }
    }

    pub fn dataset(name: &str, err: impl std::fmt::Display) -> Self {
        SourceError::Dataset {
            name: name.to_string(),
            message: err.to_string(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Transport { .. })
    }

    /// A transient failure after the request may already have been handled,
    /// such as a timeout waiting for the response
    pub fn may_have_been_applied(&self) -> bool {
        matches!(self, SourceError::Transport { reached_server: true, .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SourceError::Status { status: 404, .. })
    }
}
