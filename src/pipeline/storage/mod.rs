pub mod types;
pub mod audit;
pub mod vectordb;

pub use types::*;
pub use audit::*;
pub use vectordb::*;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Vector index error: {0}")]
    VectorIndex(String),

    #[error("Payload serialization failed: {0}")]
    Serialization(String),

    #[error("Index is unavailable: {0}")]
    Unavailable(String),
}
