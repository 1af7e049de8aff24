//! Error types for protocol operations

use crate::types::Edge;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProtocolError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Bitmap too short: {got} bytes (need {needed})")]
    BitmapTooShort { needed: usize, got: usize },

    #[error("Bitmap of the wrong length: {got} bits (expected {expected})")]
    BitmapWrongLength { expected: usize, got: usize },

    #[error("Invalid bitmap character: {0:?}")]
    InvalidBitChar(char),

    #[error("No bit index for edge {0}")]
    MissingBitIndex(Edge),

    #[error("Bit index {index} out of range (bitmap length {len})")]
    BitIndexOutOfRange { index: usize, len: usize },
}
