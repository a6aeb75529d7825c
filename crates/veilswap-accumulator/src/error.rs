//! error types for the accumulator

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("unknown pool: {0}")]
    UnknownPool(String),

    #[error("leaf index {index} out of range, next index is {next_index}")]
    IndexOutOfRange { index: u64, next_index: u64 },

    #[error("tree is full after {0} leaves")]
    TreeFull(u64),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("hash error: {0}")]
    Hash(#[from] veilswap_core::CoreError),
}

impl From<sled::Error> for TreeError {
    fn from(e: sled::Error) -> Self {
        TreeError::Storage(e.to_string())
    }
}

impl From<bincode::Error> for TreeError {
    fn from(e: bincode::Error) -> Self {
        TreeError::Codec(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TreeError>;
