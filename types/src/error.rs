//! Parse errors for the fundamental types.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypesError {
    #[error("invalid transaction id: {0}")]
    InvalidTxId(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid token uid: {0}")]
    InvalidTokenUid(String),
}
