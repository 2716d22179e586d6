use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("Stage ID not found: {0}")]
    StageNotFound(String),

    #[error("Stage ID already registered: {0}")]
    StageAlreadyExists(String),

    #[error("Invalid task location")]
    TaskLocation(#[from] igloo_common::Error),
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
