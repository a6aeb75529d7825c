//! error types for veilswap core

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("hash failed: {0}")]
    Hash(String),

    #[error("invalid field element: {0}")]
    InvalidField(String),
}

impl From<light_poseidon::PoseidonError> for CoreError {
    fn from(e: light_poseidon::PoseidonError) -> Self {
        CoreError::Hash(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
