//! Core data types for the harvester.
//!
//! Request-side types describe one bulk-download request; [`InvoiceRecord`]
//! is the normalized result handed back to the caller.

use std::fmt;
use std::sync::LazyLock;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::DEFAULT_WINDOW_DAYS;
use crate::error::{HarvesterError, Result};

/// Which side of the documents the requesting RFC appears on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    /// The RFC is the receiver of the documents.
    Received,

    /// The RFC is the issuer of the documents.
    Emitted,
}

impl Direction {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "RECEIVED",
            Self::Emitted => "EMITTED",
        }
    }

    /// Name of the subject-filter field used by the remote request.
    #[must_use]
    pub fn subject_field(&self) -> &'static str {
        match self {
            Self::Received => "RfcReceptor",
            Self::Emitted => "RfcEmisor",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "UncheckedDateRange")]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

/// Deserialized bounds, checked by [`DateRange::new`].
#[derive(Deserialize)]
struct UncheckedDateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl TryFrom<UncheckedDateRange> for DateRange {
    type Error = HarvesterError;

    fn try_from(raw: UncheckedDateRange) -> Result<Self> {
        Self::new(raw.start, raw.end)
    }
}

impl DateRange {
    /// Create a range; `start` must not be after `end`.
    ///
    /// # Examples
    /// ```
    /// use chrono::NaiveDate;
    /// use cfdi_harvester::types::DateRange;
    ///
    /// let jan = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
    /// let feb = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
    /// assert!(DateRange::new(jan, feb).is_ok());
    /// assert!(DateRange::new(feb, jan).is_err());
    /// ```
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(HarvesterError::InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Default window ending `today`: from the last stored invoice date if
    /// any (that day included, to catch late arrivals), otherwise the last
    /// [`DEFAULT_WINDOW_DAYS`] days.
    #[must_use]
    pub fn default_since(last_known: Option<NaiveDate>, today: NaiveDate) -> Self {
        let start = last_known
            .filter(|d| *d <= today)
            .unwrap_or_else(|| today - Duration::days(DEFAULT_WINDOW_DAYS));
        Self { start, end: today }
    }

    #[must_use]
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// First instant of the range.
    #[must_use]
    pub fn start_instant(&self) -> NaiveDateTime {
        self.start.and_time(chrono::NaiveTime::MIN)
    }

    /// Last second of the range (end day included).
    #[must_use]
    pub fn end_instant(&self) -> NaiveDateTime {
        self.end
            .and_hms_opt(23, 59, 59)
            .unwrap_or_else(|| self.end.and_time(chrono::NaiveTime::MIN))
    }
}

/// Kind of documents requested. Only complete CFDI documents are supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DocumentKind {
    #[default]
    #[serde(rename = "CFDI")]
    Cfdi,
}

impl DocumentKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cfdi => "CFDI",
        }
    }
}

/// One directional bulk-download request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// RFC of the requesting taxpayer (the credential holder).
    pub requester_rfc: String,

    /// Inclusive issue-date window.
    pub range: DateRange,

    /// Whether the requester is receiver or issuer.
    pub direction: Direction,

    /// Kind of documents requested.
    pub kind: DocumentKind,

    /// Restrict to documents that are still active (not cancelled).
    pub active_only: bool,
}

impl DownloadRequest {
    /// Build the request for one direction.
    ///
    /// Received requests ask for active documents only; emitted requests
    /// carry no status filter.
    #[must_use]
    pub fn new(requester_rfc: impl Into<String>, range: DateRange, direction: Direction) -> Self {
        Self {
            requester_rfc: requester_rfc.into(),
            range,
            direction,
            kind: DocumentKind::Cfdi,
            active_only: direction == Direction::Received,
        }
    }

    /// The exact byte string signed by the credential.
    ///
    /// # Examples
    /// ```
    /// use chrono::NaiveDate;
    /// use cfdi_harvester::types::{DateRange, Direction, DownloadRequest};
    ///
    /// let day = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
    /// let range = DateRange::new(day, day).unwrap();
    /// let request = DownloadRequest::new("EKU9003173C9", range, Direction::Emitted);
    /// assert_eq!(
    ///     request.canonical_form(),
    ///     "FechaInicial=2025-01-31T00:00:00|FechaFinal=2025-01-31T23:59:59|\
    ///      RfcSolicitante=EKU9003173C9|RfcEmisor=EKU9003173C9|TipoSolicitud=CFDI"
    /// );
    /// ```
    #[must_use]
    pub fn canonical_form(&self) -> String {
        let mut form = format!(
            "FechaInicial={}|FechaFinal={}|RfcSolicitante={}|{}={}|TipoSolicitud={}",
            self.range.start_instant().format("%Y-%m-%dT%H:%M:%S"),
            self.range.end_instant().format("%Y-%m-%dT%H:%M:%S"),
            self.requester_rfc,
            self.direction.subject_field(),
            self.requester_rfc,
            self.kind.as_str(),
        );
        if self.active_only {
            form.push_str("|EstadoComprobante=Vigente");
        }
        form
    }
}

/// Request identifier pattern: alphanumerics and dashes.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static HANDLE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").expect("valid regex"));

/// Opaque identifier the remote service assigned to one request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestHandle(String);

impl RequestHandle {
    /// Accept a raw identifier, rejecting empty or garbled values.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        HANDLE_PATTERN
            .is_match(trimmed)
            .then(|| Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one downloadable package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageId(String);

impl PackageId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A retrieved package: its id and one raw XML buffer per document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub id: PackageId,
    pub documents: Vec<Vec<u8>>,
}

/// CFDI voucher type (c_TipoDeComprobante).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentType {
    /// Income (ingreso).
    #[serde(rename = "I")]
    Income,

    /// Expense / credit note (egreso).
    #[serde(rename = "E")]
    Expense,

    /// Transfer (traslado).
    #[serde(rename = "T")]
    Transfer,

    /// Payroll (nómina).
    #[serde(rename = "N")]
    Payroll,

    /// Payment receipt (pago).
    #[serde(rename = "P")]
    Payment,
}

impl DocumentType {
    #[must_use]
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::Income => "I",
            Self::Expense => "E",
            Self::Transfer => "T",
            Self::Payroll => "N",
            Self::Payment => "P",
        }
    }

    /// Parse a bare code or one of the spelled-out forms used by 3.2.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_lowercase().as_str() {
            "i" | "ingreso" => Some(Self::Income),
            "e" | "egreso" => Some(Self::Expense),
            "t" | "traslado" => Some(Self::Transfer),
            "n" | "nomina" | "nómina" => Some(Self::Payroll),
            "p" | "pago" => Some(Self::Payment),
            _ => None,
        }
    }
}

/// Issuer or receiver of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    /// Tax identifier.
    pub rfc: String,

    /// Registered name (optional in 3.3).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Tax regime code (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_regime: Option<String>,
}

/// Global-invoice block (CFDI 4.0 `InformacionGlobal`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalInformation {
    /// Periodicity code (c_Periodicidad).
    pub periodicity: String,

    /// Covered month(s) code (c_Meses).
    pub months: String,

    /// Fiscal year.
    pub fiscal_year: i32,
}

/// Document-level tax amounts by tax type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxBreakdown {
    /// Transferred VAT (002).
    pub transferred_vat: Decimal,

    /// Transferred IEPS (003).
    pub transferred_ieps: Decimal,

    /// Withheld income tax (001).
    pub withheld_isr: Decimal,

    /// Withheld VAT (002).
    pub withheld_vat: Decimal,
}

/// Normalized CFDI document.
///
/// A record always carries a valid stamp identifier; documents without one
/// never become records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    /// Digital-stamp identifier (TimbreFiscalDigital UUID).
    pub uuid: Uuid,

    /// Issue date (`Fecha`), local wall-clock time.
    pub issued_at: NaiveDateTime,

    /// Stamping date (`FechaTimbrado`) (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stamped_at: Option<NaiveDateTime>,

    /// Schema version ("3.2", "3.3", "4.0").
    pub version: String,

    /// Voucher type.
    pub document_type: DocumentType,

    /// Series (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,

    /// Folio (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folio: Option<String>,

    pub subtotal: Decimal,
    pub discount: Decimal,

    /// Net taxes: `total - (subtotal - discount)`.
    pub tax: Decimal,
    pub total: Decimal,

    /// Document-level tax amounts.
    pub taxes: TaxBreakdown,

    pub issuer: Party,
    pub receiver: Party,

    /// Payment form code (c_FormaPago) (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_form: Option<String>,

    /// Payment method code (c_MetodoPago) (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,

    /// CFDI usage code (c_UsoCFDI) (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cfdi_usage: Option<String>,

    /// Payment terms (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_terms: Option<String>,

    /// Description of the first line item (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Currency code (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    /// Exchange rate (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange_rate: Option<Decimal>,

    /// Exportation code, 4.0 only (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exportation: Option<String>,

    /// Global-invoice block, 4.0 only (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global: Option<GlobalInformation>,

    /// Original document, kept for audit and storage.
    pub raw_xml: String,
}

impl InvoiceRecord {
    /// Stamp identifier in the uppercase form used by the tax authority.
    #[must_use]
    pub fn uuid_string(&self) -> String {
        self.uuid.hyphenated().to_string().to_uppercase()
    }
}
