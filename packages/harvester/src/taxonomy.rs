//! Remote error-code taxonomy.
//!
//! Every response of the bulk-retrieval service carries a code from one
//! shared vocabulary. [`map_code`] turns such a code into a [`MappedError`]
//! with a category the caller can branch on, a human message and a
//! remediation hint. The raw code and message are always preserved.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of failure, independent of the vendor code that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Certificate, key or passphrase unusable.
    CredentialError,
    /// Signature or identity not accepted by the remote side.
    AuthenticationRejected,
    /// The request itself carried invalid data.
    InvalidRequest,
    /// Too many requests or documents for the parameter window.
    RateOrVolumeExceeded,
    /// Nothing matched the request. Not a failure for callers.
    NoDataInRange,
    /// An identical request is still in flight.
    DuplicateInFlight,
    /// The client stopped waiting.
    Timeout,
    /// One package could not be retrieved or unpacked.
    PackageCorrupt,
    /// One document could not be parsed.
    MalformedDocument,
    /// Remote internal error or unreachable service.
    ServiceFault,
    /// The host application aborted the synchronization.
    Cancelled,
    /// Success code of the shared vocabulary.
    Accepted,
    /// Code or response shape outside the known vocabulary.
    Unrecognized,
}

impl ErrorCategory {
    /// Fatal categories abort the whole synchronization.
    #[must_use]
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::CredentialError | Self::AuthenticationRejected)
    }

    /// Localized categories affect one package or one document only.
    #[must_use]
    pub fn is_localized(self) -> bool {
        matches!(self, Self::PackageCorrupt | Self::MalformedDocument)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CredentialError => "credential_error",
            Self::AuthenticationRejected => "authentication_rejected",
            Self::InvalidRequest => "invalid_request",
            Self::RateOrVolumeExceeded => "rate_or_volume_exceeded",
            Self::NoDataInRange => "no_data_in_range",
            Self::DuplicateInFlight => "duplicate_in_flight",
            Self::Timeout => "timeout",
            Self::PackageCorrupt => "package_corrupt",
            Self::MalformedDocument => "malformed_document",
            Self::ServiceFault => "service_fault",
            Self::Cancelled => "cancelled",
            Self::Accepted => "accepted",
            Self::Unrecognized => "unrecognized",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A remote (or client-derived) code resolved against the taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("[{code}] {category}: {message}")]
pub struct MappedError {
    pub code: String,
    pub category: ErrorCategory,
    pub message: String,
    pub remediation: String,
    /// Message as received from the remote side, if any.
    pub raw_message: Option<String>,
}

impl MappedError {
    /// Build an error with a client-side code that is not looked up.
    pub fn client(
        code: &str,
        category: ErrorCategory,
        message: impl Into<String>,
        remediation: &str,
    ) -> Self {
        Self {
            code: code.to_string(),
            category,
            message: message.into(),
            remediation: remediation.to_string(),
            raw_message: None,
        }
    }

    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.category.is_fatal()
    }
}

/// Codes produced by the client itself rather than the remote service.
pub mod client_codes {
    pub const TIMEOUT: &str = "CLIENT_TIMEOUT";
    pub const CANCELLED: &str = "CLIENT_CANCELLED";
    pub const UNRECOGNIZED_RESPONSE: &str = "UNRECOGNIZED_RESPONSE";
    pub const UNRECOGNIZED_STATE: &str = "UNRECOGNIZED_STATE";
    pub const TRANSPORT: &str = "TRANSPORT";
    pub const EMPTY_PAYLOAD: &str = "EMPTY_PAYLOAD";
    pub const INVALID_PACKAGE: &str = "INVALID_PACKAGE";
    pub const MALFORMED_DOCUMENT: &str = "MALFORMED_DOCUMENT";
}

/// One row of the static code table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeEntry {
    pub code: &'static str,
    pub category: ErrorCategory,
    pub message: &'static str,
    pub remediation: &'static str,
}

const fn entry(
    code: &'static str,
    category: ErrorCategory,
    message: &'static str,
    remediation: &'static str,
) -> CodeEntry {
    CodeEntry {
        code,
        category,
        message,
        remediation,
    }
}

/// Known codes of the bulk-retrieval service.
pub static CODE_TABLE: &[CodeEntry] = &[
    entry(
        "300",
        ErrorCategory::AuthenticationRejected,
        "Invalid user",
        "Check that the credential belongs to the requesting taxpayer.",
    ),
    entry(
        "301",
        ErrorCategory::InvalidRequest,
        "Malformed request (invalid data, e.g. receiver RFC)",
        "Check the RFCs and dates sent in the request.",
    ),
    entry(
        "302",
        ErrorCategory::AuthenticationRejected,
        "Malformed signature",
        "Reload the credential; the request signature could not be read.",
    ),
    entry(
        "303",
        ErrorCategory::AuthenticationRejected,
        "Signature does not match the requesting RFC",
        "Use the credential of the taxpayer being synchronized.",
    ),
    entry(
        "304",
        ErrorCategory::CredentialError,
        "Certificate revoked or expired",
        "Renew the e.firma certificate.",
    ),
    entry(
        "305",
        ErrorCategory::CredentialError,
        "Invalid certificate",
        "Provide a valid e.firma certificate (not a CSD).",
    ),
    entry(
        "404",
        ErrorCategory::ServiceFault,
        "Unhandled remote error",
        "Retry later; report the request id if it persists.",
    ),
    entry(
        "5000",
        ErrorCategory::Accepted,
        "Request received successfully",
        "No action needed.",
    ),
    entry(
        "5002",
        ErrorCategory::RateOrVolumeExceeded,
        "Lifetime request limit reached for these parameters",
        "Change the date range and submit again.",
    ),
    entry(
        "5003",
        ErrorCategory::RateOrVolumeExceeded,
        "Maximum number of documents per request exceeded",
        "Narrow the date range.",
    ),
    entry(
        "5004",
        ErrorCategory::NoDataInRange,
        "No documents found for the request",
        "Not an error; nothing to download for this window.",
    ),
    entry(
        "5005",
        ErrorCategory::DuplicateInFlight,
        "Duplicate request; an active request with these parameters exists",
        "Wait for the existing request to finish before retrying.",
    ),
    entry(
        "5006",
        ErrorCategory::ServiceFault,
        "Internal error while processing the request",
        "Retry later.",
    ),
    entry(
        "5007",
        ErrorCategory::PackageCorrupt,
        "Requested package does not exist",
        "Submit a new request for the window.",
    ),
    entry(
        "5008",
        ErrorCategory::RateOrVolumeExceeded,
        "Maximum downloads reached for this package",
        "Submit a new request for the window.",
    ),
    entry(
        "5011",
        ErrorCategory::RateOrVolumeExceeded,
        "Daily download limit per folio reached",
        "Retry tomorrow.",
    ),
];

/// Look up a known code.
pub fn lookup(code: &str) -> Option<&'static CodeEntry> {
    let code = code.trim();
    CODE_TABLE.iter().find(|e| e.code == code)
}

/// Map a remote code and its raw message to a [`MappedError`].
///
/// Unknown codes map to [`ErrorCategory::Unrecognized`] and keep both the
/// code and the raw message.
///
/// # Examples
/// ```
/// use cfdi_harvester::taxonomy::{map_code, ErrorCategory};
///
/// let err = map_code("5003", Some("Tope máximo"));
/// assert_eq!(err.category, ErrorCategory::RateOrVolumeExceeded);
/// assert_eq!(err.raw_message.as_deref(), Some("Tope máximo"));
///
/// let unknown = map_code("9999", None);
/// assert_eq!(unknown.category, ErrorCategory::Unrecognized);
/// assert_eq!(unknown.code, "9999");
/// ```
pub fn map_code(code: &str, raw_message: Option<&str>) -> MappedError {
    let raw_message = raw_message
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string);

    match lookup(code) {
        Some(known) => MappedError {
            code: known.code.to_string(),
            category: known.category,
            message: known.message.to_string(),
            remediation: known.remediation.to_string(),
            raw_message,
        },
        None => MappedError {
            code: code.trim().to_string(),
            category: ErrorCategory::Unrecognized,
            message: format!("Unknown remote code: {}", code.trim()),
            remediation: "Check the raw message and the service logs.".to_string(),
            raw_message,
        },
    }
}

/// Map a response that carried no usable result.
///
/// Falls back to the generic "unrecognized response" entry when the
/// response carried no code at all.
pub fn map_response(code: Option<&str>, raw_message: Option<&str>) -> MappedError {
    match code.map(str::trim).filter(|c| !c.is_empty()) {
        Some(code) => map_code(code, raw_message),
        None => MappedError {
            raw_message: raw_message.map(str::to_string),
            ..MappedError::client(
                client_codes::UNRECOGNIZED_RESPONSE,
                ErrorCategory::Unrecognized,
                "Response carried neither a result nor a status code",
                "Check the raw message and the service logs.",
            )
        },
    }
}
