//! Error types for the provider client

use thiserror::Error;

/// Errors that can occur while talking to the zone provider
#[derive(Debug, Error)]
pub enum ClientError {
    /// The provider could not be reached at all (connection refused, unknown host)
    ///
    /// This is the only class of error that justifies starting the companion
    /// process and retrying.
    #[error("Provider unreachable: {0}")]
    Unreachable(String),

    /// Any other transport failure, including timeouts
    #[error("Network/HTTP error: {0}")]
    Network(String),

    /// The provider answered with a non-200 status
    #[error("Provider returned status {code}: {body}")]
    Status { code: u16, body: String },

    /// The response body could not be decoded
    #[error("Response parsing error: {0}")]
    Parse(String),

    /// Bringing the provider back up failed
    #[error("Provider recovery failed: {0}")]
    Recovery(String),

    /// The configured base URL cannot be used
    #[error("Invalid provider URL: {0}")]
    InvalidUrl(String),
}

impl ClientError {
    /// Connection refused or name resolution failure
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ClientError::Unreachable(_))
    }

    /// The request never produced an HTTP response
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Unreachable(_) | ClientError::Network(_))
    }

    /// HTTP-style status code reported by the provider, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ClientError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<ureq::Error> for ClientError {
    fn from(error: ureq::Error) -> Self {
        match error {
            ureq::Error::Status(code, response) => ClientError::Status {
                code,
                body: response.into_string().unwrap_or_default(),
            },
            ureq::Error::Transport(transport) => match transport.kind() {
                ureq::ErrorKind::Dns | ureq::ErrorKind::ConnectionFailed => {
                    ClientError::Unreachable(transport.to_string())
                }
                _ => ClientError::Network(transport.to_string()),
            },
        }
    }
}

impl From<url::ParseError> for ClientError {
    fn from(error: url::ParseError) -> Self {
        ClientError::InvalidUrl(error.to_string())
    }
}
