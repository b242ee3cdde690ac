use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("serial error: {0}")]
    Serial(String),
    #[error("device reply timeout")]
    Timeout,
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("device reported error code {0}")]
    Device(u8),
    #[error("device not open")]
    NotOpen,
    #[error("simulated fault: {0}")]
    Injected(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
