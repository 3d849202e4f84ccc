use thiserror::Error;

use partnerline_core::ApplicationError;

pub mod attribution;
pub mod memory;

pub use attribution::SqlAttributionRepository;
pub use memory::InMemoryAttributionRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("duplicate record: {0}")]
    Duplicate(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        ApplicationError::Persistence(value.to_string())
    }
}
