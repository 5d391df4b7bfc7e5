use thiserror::Error;

#[derive(Debug, Error)]
pub enum RosPoolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// `!trap` reply to a request
    #[error("Device rejected request: {0}")]
    Trap(String),

    /// `!fatal` reply; the device closes the session after sending it
    #[error("Fatal device error: {0}")]
    Fatal(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, RosPoolError>;
