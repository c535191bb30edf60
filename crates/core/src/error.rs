//! Unified error type.
//!
//! Every component crate converts its local error into this one at its
//! public boundary. `facegate-tools` maps [`ErrorKind`] directly onto the
//! `kind` field of the tool surface's `{status:"error", kind, message}`
//! response shape (§6, §7).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// The classification surfaced at the tool boundary. See §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Unauthenticated,
    Unavailable,
    NotFound,
    AlreadyExists,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::Internal => "internal",
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("no face detected in image")]
    NoFaceDetected,

    #[error("multiple faces detected and could not be disambiguated")]
    MultipleFaces,

    #[error("failed to decode image: {0}")]
    DecodeError(String),

    #[error("biometric model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) | Error::NoFaceDetected | Error::MultipleFaces => {
                ErrorKind::Validation
            }
            Error::DecodeError(_) => ErrorKind::Validation,
            Error::Unauthenticated(_) => ErrorKind::Unauthenticated,
            Error::Unavailable(_) | Error::ModelUnavailable(_) => ErrorKind::Unavailable,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Message safe to return to a caller across the tool surface. Internal
    /// errors never leak their detail (§7): the detail goes to
    /// `tracing`/the audit log instead.
    pub fn public_message(&self) -> String {
        match self {
            Error::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_error_hides_detail() {
        let err = Error::Internal(anyhow::anyhow!("disk full at /var/lib/facegate/vectors"));
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.public_message(), "internal error");
    }

    #[test]
    fn face_errors_map_to_validation() {
        assert_eq!(Error::NoFaceDetected.kind(), ErrorKind::Validation);
        assert_eq!(Error::MultipleFaces.kind(), ErrorKind::Validation);
    }
}
