//! CFDI Harvester - Retrieve electronic tax invoices from the SAT bulk
//! download service and normalize them into typed records.
//!
//! The crate covers the client side of the bulk-retrieval protocol
//! (credential handling, request submission, status polling, package
//! download) and a version-tolerant CFDI normalizer. The transport to the
//! remote service is supplied by the caller through
//! [`service::BulkDownloadService`].
//!
//! # Example
//!
//! ```
//! use cfdi_harvester::config;
//! use cfdi_harvester::taxonomy::{map_code, ErrorCategory};
//!
//! // Validate an RFC and a date
//! assert!(config::validate_rfc("EKU9003173C9").is_ok());
//! assert!(config::validate_date("2025-01-01").is_ok());
//!
//! // Resolve a remote code
//! assert_eq!(map_code("5004", None).category, ErrorCategory::NoDataInRange);
//! ```
//!
//! # Architecture
//!
//! - [`config`]: Constants, environment settings and validation
//! - [`taxonomy`]: Remote error codes mapped to categories
//! - [`error`]: Error types and Result alias
//! - [`types`]: Core data types (DownloadRequest, InvoiceRecord, etc.)
//! - [`credential`]: e.firma certificate and key loading, signing
//! - [`service`]: Port to the remote service and signed payloads
//! - [`xml`]: XML utilities and the one-or-many element tree
//! - [`cfdi`]: CFDI normalizer
//! - [`submit`]: Request submission
//! - [`poll`]: Status polling state machine, pacing and cancellation
//! - [`package`]: Package download and unpacking with retry
//! - [`harvester`]: Synchronization entry points
//! - [`cli`]: Command-line interface

pub mod cfdi;
pub mod cli;
pub mod config;
pub mod credential;
pub mod error;
pub mod harvester;
pub mod package;
pub mod poll;
pub mod service;
pub mod submit;
pub mod taxonomy;
pub mod types;
pub mod xml;

// Re-export main functions
pub use harvester::{download_all, download_emitted, download_received, DownloadBatch, Harvester};

// Re-export commonly used items
pub use config::{validate_date, validate_rfc, SyncConfig};
pub use credential::Credential;
pub use error::{HarvesterError, Result};
pub use poll::{CancellationToken, Pacer, ThreadPacer};
pub use taxonomy::{ErrorCategory, MappedError};
pub use types::{DateRange, Direction, InvoiceRecord};
