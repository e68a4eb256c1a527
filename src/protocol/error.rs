use thiserror::Error;

/// Errors surfaced by the driver.
///
/// `Transport` and `Status` with a code of 500 or above are retryable; the
/// connection layer handles them up to its backoff bound before they reach
/// the caller. Everything else propagates immediately.
#[derive(Error, Debug, Clone)]
pub enum DriverError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("server returned {code}: {message}")]
    Status {
        code: u16,
        error_num: Option<i64>,
        message: String,
    },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("message too large")]
    MessageTooLarge,

    #[error("connection closed")]
    Closed,

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type DriverResult<T> = Result<T, DriverError>;

impl DriverError {
    /// Status code carried by a server response, if this error has one.
    pub fn response_code(&self) -> Option<u16> {
        match self {
            DriverError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, DriverError::Transport(_))
    }

    /// True for failures the connection layer may retry: transport-level
    /// failures and server errors (status 500 and above).
    pub fn is_retryable(&self) -> bool {
        match self {
            DriverError::Transport(_) => true,
            DriverError::Status { code, .. } => *code >= 500,
            _ => false,
        }
    }
}
