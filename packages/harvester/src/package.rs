//! Package retrieval: download, base64-decode and unzip one package.

use std::io::{Cursor, Read};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use zip::ZipArchive;

use crate::config::SyncConfig;
use crate::credential::Credential;
use crate::error::PackageError;
use crate::poll::{cancelled, CancellationToken, Pacer};
use crate::service::{BulkDownloadService, PackageQuery, Signed};
use crate::taxonomy::{map_code, ErrorCategory, MappedError};
use crate::types::{Package, PackageId};

/// Extract the raw XML documents of a zip archive.
///
/// Directories and entries not ending in `.xml` are ignored.
pub fn read_archive(bytes: &[u8]) -> Result<Vec<Vec<u8>>, PackageError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut documents = Vec::new();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() || !entry.name().to_lowercase().ends_with(".xml") {
            tracing::debug!(entry = entry.name(), "skipping non-document entry");
            continue;
        }
        let mut buffer = Vec::new();
        entry.read_to_end(&mut buffer)?;
        documents.push(buffer);
    }

    Ok(documents)
}

/// Decode a base64 package payload into its documents.
pub fn decode_payload(
    package_id: &PackageId,
    payload: Option<&str>,
) -> Result<Vec<Vec<u8>>, PackageError> {
    let payload: String = payload
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    if payload.is_empty() {
        return Err(PackageError::EmptyPayload(package_id.to_string()));
    }

    let bytes = STANDARD.decode(payload)?;
    if bytes.is_empty() {
        return Err(PackageError::EmptyPayload(package_id.to_string()));
    }
    read_archive(&bytes)
}

fn download_once<S: BulkDownloadService>(
    service: &S,
    credential: &Credential,
    package_id: &PackageId,
) -> Result<Package, PackageError> {
    let query = PackageQuery {
        requester_rfc: credential.rfc().to_string(),
        package_id: package_id.clone(),
    };
    let signed = Signed::sign(query, credential).map_err(|e| PackageError::Remote(e.into()))?;
    let response = service.download_package(&signed)?;

    if let Some(code) = response
        .status_code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
    {
        let mapped = map_code(code, response.message.as_deref());
        if mapped.category != ErrorCategory::Accepted {
            return Err(PackageError::Remote(mapped));
        }
    }

    let documents = decode_payload(package_id, response.payload.as_deref())?;
    Ok(Package {
        id: package_id.clone(),
        documents,
    })
}

/// Download one package, retrying this package only.
///
/// Up to `config.package_attempts` attempts are made,
/// `config.package_retry_delay` apart. Fatal categories stop retrying at once.
///
/// # Errors
/// The mapped error of the last attempt. The caller decides whether it
/// aborts the synchronization ([`MappedError::is_fatal`], cancellation) or
/// only skips this package.
#[tracing::instrument(skip_all, fields(package_id = %package_id))]
pub fn fetch<S, P>(
    service: &S,
    credential: &Credential,
    package_id: &PackageId,
    config: &SyncConfig,
    pacer: &P,
    cancel: &CancellationToken,
) -> Result<Package, MappedError>
where
    S: BulkDownloadService,
    P: Pacer,
{
    let attempts = config.package_attempts.max(1);
    let mut attempt = 1;

    loop {
        if cancel.is_cancelled() {
            return Err(cancelled());
        }

        let error = match download_once(service, credential, package_id) {
            Ok(package) => {
                tracing::debug!(attempt, documents = package.documents.len(), "package retrieved");
                return Ok(package);
            }
            Err(e) => e.to_mapped(),
        };

        if error.is_fatal() || attempt >= attempts {
            return Err(error);
        }

        tracing::warn!(attempt, max = attempts, error = %error, "package download failed, will retry");
        if !pacer.pause(config.package_retry_delay, cancel) {
            return Err(cancelled());
        }
        attempt += 1;
    }
}
