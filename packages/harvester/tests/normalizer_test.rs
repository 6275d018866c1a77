//! Normalizer tests against complete CFDI documents of every supported
//! version.

mod common;

use std::str::FromStr;

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;

use cfdi_harvester::cfdi::{normalize_package, parse};
use cfdi_harvester::error::DocumentError;
use cfdi_harvester::types::{DocumentType, GlobalInformation, InvoiceRecord};

use common::cfdi;

fn dec(value: &str) -> Decimal {
    Decimal::from_str(value).unwrap()
}

fn record(name: &str) -> InvoiceRecord {
    parse(&cfdi(name))
        .unwrap_or_else(|e| panic!("{name} failed to parse: {e}"))
        .unwrap_or_else(|| panic!("{name} has no stamp"))
}

#[test]
fn test_cfdi33_fields() {
    let record = record("cfdi33.xml");

    assert_eq!(record.uuid_string(), "A3F1C2D4-5B6E-4F70-8192-A3B4C5D6E7F8");
    assert_eq!(record.version, "3.3");
    assert_eq!(record.document_type, DocumentType::Income);
    assert_eq!(
        record.issued_at,
        NaiveDate::from_ymd_opt(2021, 6, 14)
            .unwrap()
            .and_hms_opt(12, 5, 33)
            .unwrap()
    );
    assert_eq!(record.series.as_deref(), Some("F"));
    assert_eq!(record.folio.as_deref(), Some("1024"));

    assert_eq!(record.subtotal, dec("2500"));
    assert_eq!(record.discount, dec("250"));
    assert_eq!(record.total, dec("2610"));
    assert_eq!(record.tax, dec("360"));
    assert_eq!(record.taxes.transferred_vat, dec("360"));

    assert_eq!(record.issuer.rfc, "EKU9003173C9");
    assert_eq!(record.issuer.tax_regime.as_deref(), Some("601"));
    assert_eq!(record.receiver.rfc, "URE180429TM6");
    assert_eq!(
        record.receiver.name.as_deref(),
        Some("UNIVERSIDAD ROBOTICA ESPAÑOLA")
    );

    assert_eq!(record.cfdi_usage.as_deref(), Some("G03"));
    assert_eq!(record.payment_method.as_deref(), Some("PUE"));
    assert_eq!(record.payment_form.as_deref(), Some("03"));
    assert_eq!(record.payment_terms.as_deref(), Some("CONTADO"));
    assert_eq!(record.currency.as_deref(), Some("MXN"));
    assert_eq!(
        record.description.as_deref(),
        Some("Desarrollo de software a la medida")
    );
    assert!(record.global.is_none());
    assert!(record.exportation.is_none());
}

#[test]
fn test_cfdi40_fields() {
    let record = record("cfdi40.xml");

    assert_eq!(record.uuid_string(), "6128396F-C09B-4EC6-8699-43C5F7E3B230");
    assert_eq!(record.version, "4.0");
    assert_eq!(record.currency.as_deref(), Some("USD"));
    assert_eq!(record.exchange_rate, Some(dec("17.25")));
    assert_eq!(record.exportation.as_deref(), Some("01"));
    assert_eq!(
        record.global,
        Some(GlobalInformation {
            periodicity: "04".to_string(),
            months: "01".to_string(),
            fiscal_year: 2025,
        })
    );

    // Net of the withheld income tax
    assert_eq!(record.tax, dec("600"));
    assert_eq!(record.taxes.transferred_vat, dec("1600"));
    assert_eq!(record.taxes.withheld_isr, dec("1000"));
    assert_eq!(record.taxes.withheld_vat, Decimal::ZERO);

    assert_eq!(record.receiver.tax_regime.as_deref(), Some("616"));
    assert_eq!(record.cfdi_usage.as_deref(), Some("S01"));
    assert_eq!(record.description.as_deref(), Some("Venta"));
    assert!(record.stamped_at.is_some());
}

#[test]
fn test_cfdi32_aliases() {
    let record = record("cfdi32.xml");

    assert_eq!(record.version, "3.2");
    assert_eq!(record.document_type, DocumentType::Income);
    assert_eq!(record.series.as_deref(), Some("B"));
    assert_eq!(record.folio.as_deref(), Some("311"));
    assert_eq!(record.total, dec("1160"));
    assert_eq!(record.tax, dec("160"));
    assert_eq!(record.taxes.transferred_vat, dec("160"));
    assert_eq!(record.issuer.tax_regime.as_deref(), Some("601"));
    assert_eq!(record.receiver.rfc, "URE180429TM6");
    // metodoDePago carries the instrument, formaDePago the method in words
    assert_eq!(record.payment_form.as_deref(), Some("01"));
    assert_eq!(record.payment_method.as_deref(), Some("PUE"));
    assert_eq!(
        record.description.as_deref(),
        Some("Asesoría contable noviembre")
    );
    assert!(record.cfdi_usage.is_none());
}

#[test]
fn test_same_content_across_versions_normalizes_identically() {
    let v33 = record("cfdi33.xml");
    let mut v40 = record("cfdi40_equivalent.xml");

    assert_eq!(v40.version, "4.0");
    v40.version = v33.version.clone();
    v40.raw_xml = v33.raw_xml.clone();
    assert_eq!(v33, v40);
}

#[test]
fn test_reparse_is_idempotent() {
    for name in ["cfdi32.xml", "cfdi33.xml", "cfdi40.xml"] {
        let first = record(name);
        let second = parse(first.raw_xml.as_bytes()).unwrap().unwrap();
        assert_eq!(first, second, "{name}");
    }
}

#[test]
fn test_document_without_uuid_is_excluded() {
    assert!(parse(&cfdi("no_uuid.xml")).unwrap().is_none());

    let stamped = vec![cfdi("cfdi33.xml"), cfdi("cfdi40.xml")];
    let mut with_unstamped = stamped.clone();
    with_unstamped.push(cfdi("no_uuid.xml"));

    let baseline = normalize_package(&stamped);
    let result = normalize_package(&with_unstamped);
    assert_eq!(result.records, baseline.records);
    assert_eq!(result.unstamped, 1);
    assert_eq!(result.skipped(), 1);
}

#[test]
fn test_malformed_total_is_reported() {
    let err = parse(&cfdi("malformed_total.xml")).unwrap_err();
    let DocumentError::InvalidNumber { attribute, value } = err else {
        panic!("expected InvalidNumber, got {err:?}");
    };
    assert_eq!(attribute, "Total");
    assert_eq!(value, "quinientos");
}

#[test]
fn test_malformed_document_does_not_stop_package() {
    let documents = vec![
        cfdi("cfdi33.xml"),
        cfdi("malformed_total.xml"),
        b"<not xml".to_vec(),
        cfdi("cfdi40.xml"),
    ];
    let result = normalize_package(&documents);

    assert_eq!(result.records.len(), 2);
    assert_eq!(result.malformed, 2);
    assert_eq!(result.unstamped, 0);
}

#[test]
fn test_uuid_is_unique_per_fixture() {
    let result = normalize_package(vec![
        cfdi("cfdi32.xml"),
        cfdi("cfdi33.xml"),
        cfdi("cfdi40.xml"),
    ]);
    let mut uuids: Vec<_> = result.records.iter().map(|r| r.uuid).collect();
    uuids.sort();
    uuids.dedup();
    assert_eq!(uuids.len(), 3);
}
