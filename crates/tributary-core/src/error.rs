//! Error types for Tributary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad or contradictory user input. Halts synthesis of the component.
    #[error("validation failed at {field}: {message}")]
    Validation { field: String, message: String },

    /// The requested capability is not available on the target platform.
    #[error("unsupported output: {0}")]
    UnsupportedOutput(String),

    /// The signing capability failed to issue a certificate.
    #[error("certificate generation failed: {0}")]
    CertificateGeneration(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("apply failed: {0}")]
    ApplyFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
