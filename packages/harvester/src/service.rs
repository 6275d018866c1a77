//! Port to the bulk-retrieval service.
//!
//! The service exposes three logical operations. Transport and the
//! authentication envelope are the adapter's concern; the core hands it a
//! signed payload and reads back the loosely-typed responses defined here.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::credential::Credential;
use crate::error::CredentialError;
use crate::taxonomy::{client_codes, ErrorCategory, MappedError};
use crate::types::{DownloadRequest, PackageId, RequestHandle};

/// Payloads that can be signed by a [`Credential`].
pub trait Signable {
    /// Exact bytes covered by the signature.
    fn canonical_form(&self) -> String;
}

impl Signable for DownloadRequest {
    fn canonical_form(&self) -> String {
        DownloadRequest::canonical_form(self)
    }
}

/// Status query for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusQuery {
    pub requester_rfc: String,
    pub request_id: RequestHandle,
}

impl Signable for StatusQuery {
    fn canonical_form(&self) -> String {
        format!(
            "IdSolicitud={}|RfcSolicitante={}",
            self.request_id, self.requester_rfc
        )
    }
}

/// Download query for one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageQuery {
    pub requester_rfc: String,
    pub package_id: PackageId,
}

impl Signable for PackageQuery {
    fn canonical_form(&self) -> String {
        format!(
            "IdPaquete={}|RfcSolicitante={}",
            self.package_id, self.requester_rfc
        )
    }
}

/// A payload with the certificate and signature that authenticate it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signed<T> {
    pub payload: T,
    /// Base64 DER certificate of the signer.
    pub certificate: String,
    /// Base64 signature over [`Signable::canonical_form`].
    pub signature: String,
}

impl<T: Signable> Signed<T> {
    /// Sign `payload` with `credential`.
    pub fn sign(payload: T, credential: &Credential) -> Result<Self, CredentialError> {
        let signature = credential.sign(payload.canonical_form().as_bytes())?;
        Ok(Self {
            payload,
            certificate: credential.certificate_base64(),
            signature: STANDARD.encode(signature),
        })
    }
}

/// Request state as it appears on the wire: sometimes a number, sometimes
/// a name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireState {
    Number(i64),
    Text(String),
}

/// Answer to `SubmitRequest`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    /// `IdSolicitud`.
    pub request_id: Option<String>,
    /// `CodEstatus`.
    pub status_code: Option<String>,
    /// `Mensaje`.
    pub message: Option<String>,
}

/// Answer to `QueryStatus`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    /// `EstadoSolicitud`.
    pub state: Option<WireState>,
    /// `CodigoEstadoSolicitud`: the code explaining the state.
    pub state_code: Option<String>,
    /// `CodEstatus`: the code of the query itself.
    pub status_code: Option<String>,
    /// `IdsPaquetes`.
    pub package_ids: Vec<String>,
    /// `Paquetes`, used by some responses instead of `IdsPaquetes`.
    pub packages: Vec<String>,
    /// `Mensaje`.
    pub message: Option<String>,
}

/// Answer to `DownloadPackage`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadResponse {
    /// Base64 zip archive.
    pub payload: Option<String>,
    /// `CodEstatus`.
    pub status_code: Option<String>,
    /// `Mensaje`.
    pub message: Option<String>,
}

/// The call did not produce a response at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transport failure: {message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<&TransportError> for MappedError {
    fn from(err: &TransportError) -> Self {
        MappedError {
            raw_message: Some(err.message.clone()),
            ..MappedError::client(
                client_codes::TRANSPORT,
                ErrorCategory::ServiceFault,
                "The remote service could not be reached",
                "Check connectivity and retry later.",
            )
        }
    }
}

/// The three logical operations of the bulk-retrieval service.
///
/// Implementations must be usable from a single thread; the core never
/// shares one across threads itself.
pub trait BulkDownloadService {
    fn submit_request(
        &self,
        request: &Signed<DownloadRequest>,
    ) -> Result<SubmitResponse, TransportError>;

    fn query_status(&self, query: &Signed<StatusQuery>) -> Result<StatusResponse, TransportError>;

    fn download_package(
        &self,
        query: &Signed<PackageQuery>,
    ) -> Result<DownloadResponse, TransportError>;
}

impl<S: BulkDownloadService + ?Sized> BulkDownloadService for &S {
    fn submit_request(
        &self,
        request: &Signed<DownloadRequest>,
    ) -> Result<SubmitResponse, TransportError> {
        (**self).submit_request(request)
    }

    fn query_status(&self, query: &Signed<StatusQuery>) -> Result<StatusResponse, TransportError> {
        (**self).query_status(query)
    }

    fn download_package(
        &self,
        query: &Signed<PackageQuery>,
    ) -> Result<DownloadResponse, TransportError> {
        (**self).download_package(query)
    }
}
