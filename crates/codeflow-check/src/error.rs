//! Errors raised while preparing a validation run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckError {
    /// The test definitions could not be read.
    #[error("invalid test definitions: {message}")]
    InvalidTests { message: String },

    /// A language name or file extension was not recognized.
    #[error("unsupported language: {name}")]
    UnsupportedLanguage { name: String },
}
