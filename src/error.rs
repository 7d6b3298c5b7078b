//! Possible errors that may occur during Webauthn ceremony verification.

use std::fmt;

/// A wrapper for `Result<T, WebauthnError>`
pub type WebauthnResult<T> = core::result::Result<T, WebauthnError>;

/// Possible errors that may occur during Webauthn Operation processing.
#[derive(Debug, thiserror::Error)]
pub enum WebauthnError {
    /// The caller supplied configuration that violates a precondition. This is raised
    /// before any verification begins.
    #[error("{0}")]
    Validation(String),

    /// The client or authenticator supplied malformed wire data.
    #[error("{0}")]
    Parse(String),

    /// An attestation statement failed a format specific check.
    #[error("{format}:{message}")]
    FormatVerify {
        /// The attestation format identifier, ie `packed`.
        format: String,
        /// What went wrong.
        message: String,
    },

    /// A step of the attestation or assertion ceremony failed.
    #[error("{message}")]
    CeremonyVerify {
        /// What went wrong.
        message: String,
        /// The value observed in the response, where one applies.
        actual: Option<String>,
        /// The value the expectation demanded, where one applies.
        expect: Option<String>,
    },

    /// A certificate in the chain is listed in a certificate revocation list.
    #[error("certificate with serial {serial} is revoked")]
    CertificateRevoked {
        /// The hex encoded serial number of the revoked certificate.
        serial: String,
    },

    /// The metadata service was unable to answer a lookup.
    #[error("metadata service error: {0}")]
    MetadataService(String),

    /// The certificate revocation list source was unable to answer a lookup.
    #[error("certificate revocation list source error: {0}")]
    CrlSource(String),

    /// An OpenSSL Error occurred.
    #[error("OpenSSL Error: {0}")]
    OpenSSLError(#[from] openssl::error::ErrorStack),
}

/// The discriminant of a [WebauthnError], for callers that only need to know
/// which class of failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// See [WebauthnError::Validation]
    Validation,
    /// See [WebauthnError::Parse]
    Parse,
    /// See [WebauthnError::FormatVerify]
    FormatVerify,
    /// See [WebauthnError::CeremonyVerify]
    CeremonyVerify,
    /// See [WebauthnError::CertificateRevoked]
    CertificateRevoked,
    /// A collaborator (crypto provider, metadata service, crl source) failed.
    Collaborator,
}

impl WebauthnError {
    /// The class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            WebauthnError::Validation(_) => ErrorKind::Validation,
            WebauthnError::Parse(_) => ErrorKind::Parse,
            WebauthnError::FormatVerify { .. } => ErrorKind::FormatVerify,
            WebauthnError::CeremonyVerify { .. } => ErrorKind::CeremonyVerify,
            WebauthnError::CertificateRevoked { .. } => ErrorKind::CertificateRevoked,
            WebauthnError::MetadataService(_)
            | WebauthnError::CrlSource(_)
            | WebauthnError::OpenSSLError(_) => ErrorKind::Collaborator,
        }
    }

    pub(crate) fn format(format: &str, message: impl Into<String>) -> Self {
        WebauthnError::FormatVerify {
            format: format.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn ceremony(message: impl Into<String>) -> Self {
        WebauthnError::CeremonyVerify {
            message: message.into(),
            actual: None,
            expect: None,
        }
    }

    pub(crate) fn mismatch(
        message: impl Into<String>,
        actual: impl fmt::Display,
        expect: impl fmt::Display,
    ) -> Self {
        WebauthnError::CeremonyVerify {
            message: message.into(),
            actual: Some(actual.to_string()),
            expect: Some(expect.to_string()),
        }
    }
}

/// The error returned by a ceremony. It wraps the failing step's error and the
/// partially populated result, so that callers can log what was decoded before
/// the failure.
#[derive(Debug)]
pub struct CeremonyError<R> {
    /// The failure that aborted the ceremony.
    pub error: WebauthnError,
    /// Everything that had been decoded and verified up to the failure.
    pub result: Box<R>,
}

impl<R> CeremonyError<R> {
    /// The class of the wrapped failure.
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

impl<R> fmt::Display for CeremonyError<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl<R: fmt::Debug> std::error::Error for CeremonyError<R> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// A failed attestation (registration) ceremony.
pub type AttestationError = CeremonyError<crate::interface::AttestationResult>;

/// A failed assertion (authentication) ceremony.
pub type AssertionError = CeremonyError<crate::interface::AssertionResult>;
