//! Error types for the harvester.
//!
//! Uses the dual-error pattern: `HarvesterError` for library consumers and
//! the CLI, and specific error types for each stage. Remote workflow
//! failures are [`MappedError`]s from the taxonomy.

use thiserror::Error;

use crate::service::TransportError;
use crate::taxonomy::{client_codes, ErrorCategory, MappedError};

/// Failure to load a credential.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The certificate is not valid DER X.509.
    #[error("Certificate could not be decoded: {0}")]
    Certificate(String),

    /// The private key could not be decrypted with the passphrase.
    #[error("Private key could not be decrypted (wrong passphrase or unsupported format): {0}")]
    PrivateKey(String),

    /// The certificate does not carry an RSA public key.
    #[error("Certificate public key is not an RSA key: {0}")]
    PublicKey(String),

    /// Certificate and private key do not belong together.
    #[error("Certificate and private key do not form a pair")]
    KeyMismatch,

    /// No usable tax identifier in the certificate subject.
    #[error("Certificate subject carries no valid RFC{}", .0.as_ref().map(|v| format!(" (found '{v}')")).unwrap_or_default())]
    MissingRfc(Option<String>),

    /// Signing failed.
    #[error("Signing failed: {0}")]
    Signing(String),
}

impl From<CredentialError> for MappedError {
    fn from(err: CredentialError) -> Self {
        MappedError::client(
            "CREDENTIAL",
            ErrorCategory::CredentialError,
            err.to_string(),
            "Check the certificate, the private key and the passphrase.",
        )
    }
}

/// Failure to normalize one CFDI document.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The blob is not well-formed XML.
    #[error("XML parsing failed: {0}")]
    Xml(#[from] roxmltree::Error),

    /// The blob is not UTF-8.
    #[error("Document is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    /// The root element is not a CFDI voucher of a known version.
    #[error("Unknown CFDI root element <{element}> in namespace '{namespace}'")]
    UnknownNamespace { element: String, namespace: String },

    /// A mandatory attribute is absent.
    #[error("Missing required attribute {attribute} on <{element}>")]
    MissingAttribute { element: String, attribute: String },

    /// A numeric attribute is present but not a decimal number.
    #[error("Invalid number in {attribute}: '{value}'")]
    InvalidNumber { attribute: String, value: String },

    /// A date attribute is present but not a recognized date.
    #[error("Invalid date in {attribute}: '{value}'")]
    InvalidDate { attribute: String, value: String },

    /// A coded attribute holds a value outside its catalogue.
    #[error("Invalid code in {attribute}: '{value}'")]
    InvalidCode { attribute: String, value: String },
}

impl From<&DocumentError> for MappedError {
    fn from(err: &DocumentError) -> Self {
        MappedError::client(
            client_codes::MALFORMED_DOCUMENT,
            ErrorCategory::MalformedDocument,
            err.to_string(),
            "The document was skipped; inspect the raw XML.",
        )
    }
}

/// Failure of a single package download attempt.
#[derive(Debug, Error)]
pub enum PackageError {
    /// The service answered without a payload.
    #[error("Package {0} returned an empty payload")]
    EmptyPayload(String),

    /// The payload is not valid base64.
    #[error("Package payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The decoded payload is not a readable archive.
    #[error("Package archive could not be read: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Reading an archive entry failed.
    #[error("Package entry could not be read: {0}")]
    Io(#[from] std::io::Error),

    /// The service answered with a failure code.
    #[error("Remote rejected package download: {0}")]
    Remote(MappedError),

    /// The call produced no response.
    #[error("{0}")]
    Transport(#[from] TransportError),
}

impl PackageError {
    /// Resolve the attempt failure against the taxonomy.
    pub fn to_mapped(&self) -> MappedError {
        match self {
            Self::Remote(mapped) => mapped.clone(),
            Self::Transport(err) => MappedError::from(err),
            Self::EmptyPayload(_) => MappedError::client(
                client_codes::EMPTY_PAYLOAD,
                ErrorCategory::PackageCorrupt,
                self.to_string(),
                "The package was skipped; request the window again later.",
            ),
            Self::Base64(_) | Self::Archive(_) | Self::Io(_) => MappedError::client(
                client_codes::INVALID_PACKAGE,
                ErrorCategory::PackageCorrupt,
                self.to_string(),
                "The package was skipped; request the window again later.",
            ),
        }
    }
}

/// Main error type for the harvester library and CLI.
#[derive(Debug, Error)]
pub enum HarvesterError {
    /// Invalid RFC format.
    #[error("Invalid RFC format: '{0}'. Expected 12 or 13 characters (e.g., EKU9003173C9)")]
    InvalidRfc(String),

    /// Invalid date format.
    #[error("Invalid date format: '{0}'. Expected YYYY-MM-DD (e.g., 2025-01-01)")]
    InvalidDate(String),

    /// Date range with start after end.
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    /// Credential could not be loaded.
    #[error("Invalid credential: {0}")]
    Credential(#[from] CredentialError),

    /// Remote workflow failed.
    #[error("Synchronization failed: {0}")]
    Sync(#[from] MappedError),

    /// Code found in neither the remote taxonomy nor the usage catalogue.
    #[error("Unknown code: '{0}'")]
    UnknownCode(String),

    /// Missing environment variable.
    #[error("Environment variable {0} is not set")]
    MissingEnv(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error.
    #[error("YAML serialization failed: {0}")]
    YamlSerialization(#[from] serde_yaml_ng::Error),
}

/// Result type alias for harvester operations.
pub type Result<T> = std::result::Result<T, HarvesterError>;
