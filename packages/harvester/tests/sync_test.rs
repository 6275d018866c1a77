//! End-to-end synchronization tests against a scripted remote service.
//!
//! No real waits happen: every pause goes through a recording pacer.

mod common;

use std::time::Duration;

use chrono::NaiveDate;
use pretty_assertions::assert_eq;

use cfdi_harvester::service::{StatusResponse, TransportError, WireState};
use cfdi_harvester::taxonomy::{client_codes, ErrorCategory};
use cfdi_harvester::types::{DateRange, Direction, RequestHandle};
use cfdi_harvester::{CancellationToken, Credential, Harvester, SyncConfig};

use common::{
    cfdi, credential, download_code, download_ok, finished, package_payload, rejected,
    submit_code, submit_ok, RecordingPacer, ScriptedService,
};

const POLL_INTERVAL: Duration = Duration::from_secs(7);
const RETRY_DELAY: Duration = Duration::from_secs(3);

fn january() -> DateRange {
    DateRange::new(
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
    )
    .unwrap()
}

fn config() -> SyncConfig {
    SyncConfig::default()
        .with_poll_interval(POLL_INTERVAL)
        .with_max_poll_attempts(5)
        .with_package_attempts(2)
        .with_package_retry_delay(RETRY_DELAY)
}

fn harvester<'a>(
    service: &'a ScriptedService,
    credential: &'a Credential,
    pacer: &'a RecordingPacer,
) -> Harvester<'a, &'a ScriptedService, &'a RecordingPacer> {
    Harvester::new(service, credential)
        .with_config(config())
        .with_pacer(pacer)
}

fn handle(id: &str) -> Option<RequestHandle> {
    RequestHandle::parse(id)
}

#[test]
fn test_empty_range_at_submission_yields_empty_batch() {
    let service = ScriptedService::new().on_submit(submit_code("5004", "No se encontró información"));
    let credential = credential();
    let pacer = RecordingPacer::new();

    let batch = harvester(&service, &credential, &pacer)
        .download_received(&january())
        .unwrap();

    assert!(batch.records.is_empty());
    assert_eq!(batch.shortfall(), 0);
    assert_eq!(batch.requests, vec![(Direction::Received, None)]);
    assert_eq!(service.status_queries(), 0);
}

#[test]
fn test_empty_range_at_rejection_yields_empty_batch() {
    let service = ScriptedService::new()
        .on_submit(submit_ok("req-empty"))
        .on_status(rejected("5004"));
    let credential = credential();
    let pacer = RecordingPacer::new();

    let batch = harvester(&service, &credential, &pacer)
        .download_emitted(&january())
        .unwrap();

    assert!(batch.records.is_empty());
    assert_eq!(batch.requests, vec![(Direction::Emitted, handle("req-empty"))]);
    assert!(service.calls.borrow().downloads.is_empty());
}

#[test]
fn test_finished_without_packages_yields_empty_batch() {
    let service = ScriptedService::new()
        .on_submit(submit_ok("req-none"))
        .on_status(common::status(2))
        .on_status(finished(&[]));
    let credential = credential();
    let pacer = RecordingPacer::new();

    let batch = harvester(&service, &credential, &pacer)
        .download_received(&january())
        .unwrap();

    assert!(batch.records.is_empty());
    assert_eq!(batch.shortfall(), 0);
    assert_eq!(batch.requests, vec![(Direction::Received, handle("req-none"))]);
    assert_eq!(service.status_queries(), 2);
    assert!(service.calls.borrow().downloads.is_empty());
}

#[test]
fn test_rate_limit_rejection_is_reported() {
    let service = ScriptedService::new()
        .on_submit(submit_ok("req-big"))
        .on_status(rejected("5003"));
    let credential = credential();
    let pacer = RecordingPacer::new();

    let err = harvester(&service, &credential, &pacer)
        .download_received(&january())
        .unwrap_err();

    assert_eq!(err.category, ErrorCategory::RateOrVolumeExceeded);
    assert_eq!(err.code, "5003");
    assert_eq!(err.raw_message.as_deref(), Some("Solicitud rechazada"));
}

#[test]
fn test_submission_refusal_is_not_polled() {
    let service = ScriptedService::new().on_submit(submit_code("305", "Certificado Inválido"));
    let credential = credential();
    let pacer = RecordingPacer::new();

    let err = harvester(&service, &credential, &pacer)
        .download_received(&january())
        .unwrap_err();

    assert_eq!(err.category, ErrorCategory::CredentialError);
    assert!(err.is_fatal());
    assert_eq!(service.status_queries(), 0);
}

#[test]
fn test_submission_transport_failure_is_service_fault() {
    let service =
        ScriptedService::new().on_submit_error(TransportError::new("connection refused"));
    let credential = credential();
    let pacer = RecordingPacer::new();

    let err = harvester(&service, &credential, &pacer)
        .download_received(&january())
        .unwrap_err();

    assert_eq!(err.code, client_codes::TRANSPORT);
    assert_eq!(err.category, ErrorCategory::ServiceFault);
}

#[test]
fn test_poll_gives_up_after_max_attempts() {
    // Status script left empty: every query answers "in progress"
    let service = ScriptedService::new().on_submit(submit_ok("req-slow"));
    let credential = credential();
    let pacer = RecordingPacer::new();

    let err = harvester(&service, &credential, &pacer)
        .download_received(&january())
        .unwrap_err();

    assert_eq!(err.category, ErrorCategory::Timeout);
    assert_eq!(err.code, client_codes::TIMEOUT);
    assert_eq!(service.status_queries(), 5);
    assert_eq!(*pacer.pauses.borrow(), vec![POLL_INTERVAL; 4]);
}

#[test]
fn test_unknown_state_is_not_treated_as_pending() {
    let service = ScriptedService::new()
        .on_submit(submit_ok("req-odd"))
        .on_status(StatusResponse {
            state: Some(WireState::Text("Desconocido".to_string())),
            ..StatusResponse::default()
        });
    let credential = credential();
    let pacer = RecordingPacer::new();

    let err = harvester(&service, &credential, &pacer)
        .download_received(&january())
        .unwrap_err();

    assert_eq!(err.category, ErrorCategory::Unrecognized);
    assert_eq!(err.code, client_codes::UNRECOGNIZED_STATE);
    assert_eq!(service.status_queries(), 1);
    assert_eq!(pacer.count(), 0);
}

#[test]
fn test_full_workflow_with_pending_states() {
    let service = ScriptedService::new()
        .on_submit(submit_ok("req-ok"))
        .on_status(common::status(1))
        .on_status(common::status(2))
        .on_status(finished(&["PKG_01"]))
        .on_download(
            "PKG_01",
            download_ok(package_payload(&[
                ("a3f1c2d4.xml", cfdi("cfdi33.xml")),
                ("6128396f.xml", cfdi("cfdi40.xml")),
            ])),
        );
    let credential = credential();
    let pacer = RecordingPacer::new();

    let batch = harvester(&service, &credential, &pacer)
        .download_received(&january())
        .unwrap();

    assert_eq!(batch.records.len(), 2);
    assert_eq!(batch.shortfall(), 0);
    assert_eq!(batch.requests, vec![(Direction::Received, handle("req-ok"))]);
    assert_eq!(service.status_queries(), 3);
    assert_eq!(*pacer.pauses.borrow(), vec![POLL_INTERVAL; 2]);

    let calls = service.calls.borrow();
    assert_eq!(calls.submitted.len(), 1);
    assert_eq!(calls.submitted[0].requester_rfc, credential.rfc());
    assert_eq!(calls.submitted[0].direction, Direction::Received);
    assert!(calls.submitted[0].active_only);
}

#[test]
fn test_corrupt_package_is_skipped_and_counted() {
    let good = |name: &str| download_ok(package_payload(&[("doc.xml", cfdi(name))]));
    let service = ScriptedService::new()
        .on_submit(submit_ok("req-four"))
        .on_status(finished(&["P_01", "P_02", "P_03", "P_04"]))
        .on_download("P_01", good("cfdi33.xml"))
        .on_download("P_02", good("cfdi40.xml"))
        .on_download("P_03", download_ok("%%% not base64 %%%".to_string()))
        .on_download("P_04", good("cfdi32.xml"));
    let credential = credential();
    let pacer = RecordingPacer::new();

    let batch = harvester(&service, &credential, &pacer)
        .download_received(&january())
        .unwrap();

    assert_eq!(batch.skipped_packages, 1);
    assert_eq!(batch.records.len(), 3);
    assert_eq!(batch.shortfall(), 1);

    // Only the corrupt package is retried
    assert_eq!(service.downloads_of("P_03"), 2);
    for id in ["P_01", "P_02", "P_04"] {
        assert_eq!(service.downloads_of(id), 1, "{id}");
    }
    assert_eq!(*pacer.pauses.borrow(), vec![RETRY_DELAY]);
}

#[test]
fn test_package_recovers_on_retry() {
    let service = ScriptedService::new()
        .on_submit(submit_ok("req-flaky"))
        .on_status(finished(&["P_01"]))
        .on_download("P_01", download_code("5006"))
        .on_download(
            "P_01",
            download_ok(package_payload(&[("doc.xml", cfdi("cfdi40.xml"))])),
        );
    let credential = credential();
    let pacer = RecordingPacer::new();

    let batch = harvester(&service, &credential, &pacer)
        .download_received(&january())
        .unwrap();

    assert_eq!(batch.records.len(), 1);
    assert_eq!(batch.skipped_packages, 0);
    assert_eq!(service.downloads_of("P_01"), 2);
}

#[test]
fn test_fatal_download_error_aborts() {
    let service = ScriptedService::new()
        .on_submit(submit_ok("req-revoked"))
        .on_status(finished(&["P_01", "P_02"]))
        .on_download("P_01", download_code("304"));
    let credential = credential();
    let pacer = RecordingPacer::new();

    let err = harvester(&service, &credential, &pacer)
        .download_received(&january())
        .unwrap_err();

    assert_eq!(err.category, ErrorCategory::CredentialError);
    assert_eq!(service.downloads_of("P_01"), 1);
    assert_eq!(service.downloads_of("P_02"), 0);
    assert_eq!(pacer.count(), 0);
}

#[test]
fn test_bad_documents_are_counted_not_fatal() {
    let service = ScriptedService::new()
        .on_submit(submit_ok("req-mixed"))
        .on_status(finished(&["P_01"]))
        .on_download(
            "P_01",
            download_ok(package_payload(&[
                ("good.xml", cfdi("cfdi33.xml")),
                ("bad.xml", cfdi("malformed_total.xml")),
                ("draft.xml", cfdi("no_uuid.xml")),
                ("readme.txt", b"not a document".to_vec()),
            ])),
        );
    let credential = credential();
    let pacer = RecordingPacer::new();

    let batch = harvester(&service, &credential, &pacer)
        .download_received(&january())
        .unwrap();

    assert_eq!(batch.records.len(), 1);
    assert_eq!(batch.malformed_documents, 1);
    assert_eq!(batch.unstamped_documents, 1);
    assert_eq!(batch.skipped_packages, 0);
    assert_eq!(batch.shortfall(), 2);
}

#[test]
fn test_cancellation_during_poll_wait() {
    let token = CancellationToken::new();
    let service = ScriptedService::new().on_submit(submit_ok("req-cancel"));
    let credential = credential();
    let pacer = RecordingPacer {
        cancel_on: Some((2, token.clone())),
        ..RecordingPacer::default()
    };

    let err = harvester(&service, &credential, &pacer)
        .with_cancellation(token.clone())
        .download_received(&january())
        .unwrap_err();

    assert_eq!(err.category, ErrorCategory::Cancelled);
    assert_eq!(service.status_queries(), 2);
    assert!(token.is_cancelled());
}

#[test]
fn test_cancelled_before_start_makes_no_status_query() {
    let token = CancellationToken::new();
    token.cancel();
    let service = ScriptedService::new().on_submit(submit_ok("req-early"));
    let credential = credential();
    let pacer = RecordingPacer::new();

    let err = harvester(&service, &credential, &pacer)
        .with_cancellation(token)
        .download_received(&january())
        .unwrap_err();

    assert_eq!(err.category, ErrorCategory::Cancelled);
    assert_eq!(service.status_queries(), 0);
}

#[test]
fn test_download_all_concatenates_directions() {
    let service = ScriptedService::new()
        .on_submit(submit_ok("req-received"))
        .on_submit(submit_ok("req-emitted"))
        .on_status(finished(&["R_01"]))
        .on_status(finished(&["E_01"]))
        .on_download(
            "R_01",
            download_ok(package_payload(&[("r.xml", cfdi("cfdi33.xml"))])),
        )
        .on_download(
            "E_01",
            download_ok(package_payload(&[("e.xml", cfdi("cfdi40.xml"))])),
        );
    let credential = credential();
    let pacer = RecordingPacer::new();

    let batch = harvester(&service, &credential, &pacer)
        .download_all(&january())
        .unwrap();

    assert_eq!(
        batch.requests,
        vec![
            (Direction::Received, handle("req-received")),
            (Direction::Emitted, handle("req-emitted")),
        ]
    );
    let uuids: Vec<_> = batch.records.iter().map(|r| r.uuid_string()).collect();
    assert_eq!(
        uuids,
        vec![
            "A3F1C2D4-5B6E-4F70-8192-A3B4C5D6E7F8",
            "6128396F-C09B-4EC6-8699-43C5F7E3B230",
        ]
    );

    let calls = service.calls.borrow();
    let directions: Vec<_> = calls.submitted.iter().map(|r| r.direction).collect();
    assert_eq!(directions, vec![Direction::Received, Direction::Emitted]);
    assert!(!calls.submitted[1].active_only);
}

#[test]
fn test_download_all_stops_on_first_failure() {
    let service = ScriptedService::new().on_submit(submit_code("5005", "Solicitud duplicada"));
    let credential = credential();
    let pacer = RecordingPacer::new();

    let err = harvester(&service, &credential, &pacer)
        .download_all(&january())
        .unwrap_err();

    assert_eq!(err.category, ErrorCategory::DuplicateInFlight);
    assert_eq!(service.calls.borrow().submitted.len(), 1);
}
