//! Shared helpers for integration tests: a scripted remote service,
//! package builders and fixture loaders.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use cfdi_harvester::credential::Credential;
use cfdi_harvester::poll::{CancellationToken, Pacer};
use cfdi_harvester::service::{
    BulkDownloadService, DownloadResponse, PackageQuery, Signed, StatusQuery, StatusResponse,
    SubmitResponse, TransportError, WireState,
};
use cfdi_harvester::types::DownloadRequest;
use zeroize::Zeroizing;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

/// Load a fixture file as bytes.
pub fn load_fixture(name: &str) -> Vec<u8> {
    let path = fixtures_dir().join(name);
    fs::read(&path).unwrap_or_else(|e| panic!("Failed to load {}: {}", path.display(), e))
}

/// Load a CFDI document fixture.
pub fn cfdi(name: &str) -> Vec<u8> {
    load_fixture(&format!("cfdi/{name}"))
}

pub const PASSPHRASE: &str = "12345678a";

/// The test e.firma (RFC EKU9003173C9).
pub fn credential() -> Credential {
    Credential::load(
        &load_fixture("credentials/fiel.cer"),
        &load_fixture("credentials/fiel.key"),
        Zeroizing::new(PASSPHRASE.to_string()),
    )
    .expect("test credential loads")
}

/// Zip `entries` into an in-memory archive.
pub fn zip_archive<C: AsRef<[u8]>>(entries: &[(&str, C)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(content.as_ref()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Zip `entries` and base64-encode the archive, as the service delivers
/// packages.
pub fn package_payload<C: AsRef<[u8]>>(entries: &[(&str, C)]) -> String {
    STANDARD.encode(zip_archive(entries))
}

pub fn submit_ok(request_id: &str) -> SubmitResponse {
    SubmitResponse {
        request_id: Some(request_id.to_string()),
        status_code: Some("5000".to_string()),
        message: Some("Solicitud Aceptada".to_string()),
    }
}

pub fn submit_code(code: &str, message: &str) -> SubmitResponse {
    SubmitResponse {
        request_id: None,
        status_code: Some(code.to_string()),
        message: Some(message.to_string()),
    }
}

pub fn status(state: i64) -> StatusResponse {
    StatusResponse {
        state: Some(WireState::Number(state)),
        status_code: Some("5000".to_string()),
        ..StatusResponse::default()
    }
}

pub fn finished(packages: &[&str]) -> StatusResponse {
    StatusResponse {
        state_code: Some("5000".to_string()),
        package_ids: packages.iter().map(|p| p.to_string()).collect(),
        ..status(3)
    }
}

pub fn rejected(code: &str) -> StatusResponse {
    StatusResponse {
        state_code: Some(code.to_string()),
        message: Some("Solicitud rechazada".to_string()),
        ..status(5)
    }
}

pub fn download_ok(payload: String) -> DownloadResponse {
    DownloadResponse {
        payload: Some(payload),
        status_code: Some("5000".to_string()),
        message: None,
    }
}

pub fn download_code(code: &str) -> DownloadResponse {
    DownloadResponse {
        payload: None,
        status_code: Some(code.to_string()),
        message: Some("Error".to_string()),
    }
}

/// Calls observed by a [`ScriptedService`].
#[derive(Debug, Default)]
pub struct Calls {
    pub submitted: Vec<DownloadRequest>,
    pub status_queries: usize,
    pub downloads: Vec<String>,
}

/// Fake remote service answering from per-operation scripts.
///
/// Once the status script is exhausted every query reports "in progress".
/// Once a package script is exhausted the package answers with an empty
/// payload.
#[derive(Default)]
pub struct ScriptedService {
    submits: RefCell<VecDeque<Result<SubmitResponse, TransportError>>>,
    statuses: RefCell<VecDeque<Result<StatusResponse, TransportError>>>,
    packages: RefCell<HashMap<String, VecDeque<Result<DownloadResponse, TransportError>>>>,
    pub calls: RefCell<Calls>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_submit(self, response: SubmitResponse) -> Self {
        self.submits.borrow_mut().push_back(Ok(response));
        self
    }

    pub fn on_submit_error(self, error: TransportError) -> Self {
        self.submits.borrow_mut().push_back(Err(error));
        self
    }

    pub fn on_status(self, response: StatusResponse) -> Self {
        self.statuses.borrow_mut().push_back(Ok(response));
        self
    }

    pub fn on_download(self, package: &str, response: DownloadResponse) -> Self {
        self.packages
            .borrow_mut()
            .entry(package.to_string())
            .or_default()
            .push_back(Ok(response));
        self
    }

    pub fn status_queries(&self) -> usize {
        self.calls.borrow().status_queries
    }

    pub fn downloads_of(&self, package: &str) -> usize {
        self.calls
            .borrow()
            .downloads
            .iter()
            .filter(|p| p.as_str() == package)
            .count()
    }
}

impl BulkDownloadService for ScriptedService {
    fn submit_request(
        &self,
        request: &Signed<DownloadRequest>,
    ) -> Result<SubmitResponse, TransportError> {
        self.calls
            .borrow_mut()
            .submitted
            .push(request.payload.clone());
        self.submits
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::new("no scripted submit response")))
    }

    fn query_status(&self, _query: &Signed<StatusQuery>) -> Result<StatusResponse, TransportError> {
        self.calls.borrow_mut().status_queries += 1;
        self.statuses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Ok(status(2)))
    }

    fn download_package(
        &self,
        query: &Signed<PackageQuery>,
    ) -> Result<DownloadResponse, TransportError> {
        let id = query.payload.package_id.as_str().to_string();
        self.calls.borrow_mut().downloads.push(id.clone());
        self.packages
            .borrow_mut()
            .get_mut(&id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Ok(DownloadResponse {
                    status_code: Some("5000".to_string()),
                    ..DownloadResponse::default()
                })
            })
    }
}

/// Pacer that records requested waits instead of sleeping.
#[derive(Default)]
pub struct RecordingPacer {
    pub pauses: RefCell<Vec<Duration>>,
    /// Cancel this token on the n-th pause (1-based).
    pub cancel_on: Option<(usize, CancellationToken)>,
}

impl RecordingPacer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.pauses.borrow().len()
    }
}

impl Pacer for RecordingPacer {
    fn pause(&self, duration: Duration, cancel: &CancellationToken) -> bool {
        self.pauses.borrow_mut().push(duration);
        if let Some((n, token)) = &self.cancel_on {
            if self.count() == *n {
                token.cancel();
            }
        }
        !cancel.is_cancelled()
    }
}
