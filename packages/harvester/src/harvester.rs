//! Synchronization entry points that tie submitter, poller, retriever and
//! normalizer together.

use serde::Serialize;

use crate::cfdi::{normalize_package, NormalizedDocuments};
use crate::config::SyncConfig;
use crate::credential::Credential;
use crate::package::fetch;
use crate::poll::{poll_until_done, CancellationToken, Pacer, ThreadPacer};
use crate::service::BulkDownloadService;
use crate::submit::submit;
use crate::taxonomy::{ErrorCategory, MappedError};
use crate::types::{DateRange, Direction, InvoiceRecord, RequestHandle};

/// Records retrieved by one or more directional requests, plus what was
/// lost along the way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DownloadBatch {
    /// Direction and remote request id of every request behind this batch.
    /// The id is absent when the service reported no data at submission.
    pub requests: Vec<(Direction, Option<RequestHandle>)>,

    pub records: Vec<InvoiceRecord>,

    /// Packages that could not be retrieved after all attempts.
    pub skipped_packages: usize,

    /// Documents that could not be parsed.
    pub malformed_documents: usize,

    /// Documents without a stamp UUID.
    pub unstamped_documents: usize,
}

impl DownloadBatch {
    fn new(direction: Direction, request: Option<RequestHandle>) -> Self {
        Self {
            requests: vec![(direction, request)],
            ..Self::default()
        }
    }

    /// Number of packages and documents that did not produce a record.
    ///
    /// Zero means the batch is complete.
    #[must_use]
    pub fn shortfall(&self) -> usize {
        self.skipped_packages + self.malformed_documents + self.unstamped_documents
    }

    /// Concatenate another batch onto this one.
    pub fn merge(&mut self, other: DownloadBatch) {
        self.requests.extend(other.requests);
        self.records.extend(other.records);
        self.skipped_packages += other.skipped_packages;
        self.malformed_documents += other.malformed_documents;
        self.unstamped_documents += other.unstamped_documents;
    }

    fn absorb(&mut self, documents: NormalizedDocuments) {
        self.records.extend(documents.records);
        self.malformed_documents += documents.malformed;
        self.unstamped_documents += documents.unstamped;
    }
}

/// One synchronization session: a service, a credential and the pacing
/// used for polling and retries.
pub struct Harvester<'a, S, P = ThreadPacer> {
    service: S,
    credential: &'a Credential,
    config: SyncConfig,
    pacer: P,
    cancel: CancellationToken,
}

impl<'a, S: BulkDownloadService> Harvester<'a, S> {
    /// Create a session with the environment config and real-time waits.
    pub fn new(service: S, credential: &'a Credential) -> Self {
        Self {
            service,
            credential,
            config: SyncConfig::from_env(),
            pacer: ThreadPacer,
            cancel: CancellationToken::new(),
        }
    }
}

impl<'a, S: BulkDownloadService, P: Pacer> Harvester<'a, S, P> {
    #[must_use]
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the pacer used between status queries and package attempts.
    pub fn with_pacer<Q: Pacer>(self, pacer: Q) -> Harvester<'a, S, Q> {
        Harvester {
            service: self.service,
            credential: self.credential,
            config: self.config,
            pacer,
            cancel: self.cancel,
        }
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Documents where the credential holder is the receiver.
    pub fn download_received(&self, range: &DateRange) -> Result<DownloadBatch, MappedError> {
        self.download(range, Direction::Received)
    }

    /// Documents where the credential holder is the issuer.
    pub fn download_emitted(&self, range: &DateRange) -> Result<DownloadBatch, MappedError> {
        self.download(range, Direction::Emitted)
    }

    /// Received then emitted documents, concatenated. The first failure
    /// aborts.
    pub fn download_all(&self, range: &DateRange) -> Result<DownloadBatch, MappedError> {
        let mut batch = self.download_received(range)?;
        batch.merge(self.download_emitted(range)?);
        Ok(batch)
    }

    /// Run one directional workflow: submit, poll, fetch each package and
    /// normalize its documents.
    ///
    /// A range without matching documents yields an empty batch. Fatal
    /// failures and cancellation abort; a package that keeps failing is
    /// skipped and counted.
    #[tracing::instrument(skip_all, fields(
        direction = %direction,
        start = %range.start(),
        end = %range.end()
    ))]
    pub fn download(
        &self,
        range: &DateRange,
        direction: Direction,
    ) -> Result<DownloadBatch, MappedError> {
        tracing::info!("starting download");

        let handle = match submit(&self.service, self.credential, range, direction) {
            Ok(handle) => handle,
            Err(e) if e.category == ErrorCategory::NoDataInRange => {
                tracing::info!("no documents in range");
                return Ok(DownloadBatch::new(direction, None));
            }
            Err(e) => return Err(e),
        };

        let package_ids = match poll_until_done(
            &self.service,
            self.credential,
            &handle,
            &self.config,
            &self.pacer,
            &self.cancel,
        ) {
            Ok(ids) => ids,
            Err(e) if e.category == ErrorCategory::NoDataInRange => Vec::new(),
            Err(e) => return Err(e),
        };

        let mut batch = DownloadBatch::new(direction, Some(handle));

        for package_id in &package_ids {
            match fetch(
                &self.service,
                self.credential,
                package_id,
                &self.config,
                &self.pacer,
                &self.cancel,
            ) {
                Ok(package) => batch.absorb(normalize_package(&package.documents)),
                Err(e) if e.is_fatal() || e.category == ErrorCategory::Cancelled => {
                    tracing::error!(package_id = %package_id, error = %e, "aborting synchronization");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(
                        package_id = %package_id,
                        category = %e.category,
                        localized = e.category.is_localized(),
                        error = %e,
                        "skipping package"
                    );
                    batch.skipped_packages += 1;
                }
            }
        }

        tracing::info!(
            packages = package_ids.len(),
            records = batch.records.len(),
            shortfall = batch.shortfall(),
            "download finished"
        );
        Ok(batch)
    }
}

/// Download received documents with the environment config.
pub fn download_received<S: BulkDownloadService>(
    service: S,
    credential: &Credential,
    range: &DateRange,
) -> Result<DownloadBatch, MappedError> {
    Harvester::new(service, credential).download_received(range)
}

/// Download emitted documents with the environment config.
pub fn download_emitted<S: BulkDownloadService>(
    service: S,
    credential: &Credential,
    range: &DateRange,
) -> Result<DownloadBatch, MappedError> {
    Harvester::new(service, credential).download_emitted(range)
}

/// Download both directions with the environment config.
pub fn download_all<S: BulkDownloadService>(
    service: S,
    credential: &Credential,
    range: &DateRange,
) -> Result<DownloadBatch, MappedError> {
    Harvester::new(service, credential).download_all(range)
}
