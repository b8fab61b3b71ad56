use thiserror::Error;

/// Errors produced by the tunnel's core components.
#[derive(Debug, Error)]
pub enum RtunError {
    #[error("config error: {0}")]
    Config(String),

    #[error("listen error: {0}")]
    Listen(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RtunResult<T> = Result<T, RtunError>;
