//! Mediator errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediatorError {
    #[error(transparent)]
    Core(#[from] cdm_core::CdmError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("conversion task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("conversion limiter closed: {0}")]
    Limiter(#[from] tokio::sync::AcquireError),

    #[error("golden-sample regression failed: {0} sample(s)")]
    Regression(usize),
}

pub type MediatorResult<T> = Result<T, MediatorError>;
