//! Error types for value parsing

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypesError {
    #[error("Invalid address: {input}")]
    InvalidAddress { input: String },

    #[error("Invalid amount: {input}")]
    InvalidAmount { input: String },
}
