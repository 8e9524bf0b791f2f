use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskflowError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("illegal transition: {0}")]
    IllegalTransition(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

impl TaskflowError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::IllegalTransition(_) => 400,
            Self::InvalidInput(_) => 400,
            Self::Conflict(_) => 409,
            Self::Internal(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, TaskflowError>;
