//! State store errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Account not found")]
    AccountNotFound,

    #[error("Storage backend error: {0}")]
    Backend(#[from] sled::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("Corrupt key in tree {0}")]
    CorruptKey(&'static str),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}
