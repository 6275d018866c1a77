//! Status polling state machine.
//!
//! A submitted request moves through `PENDING*` to `TERMINATED` or
//! `REJECTED`. The poller gives up after a fixed number of queries
//! (`TIMED_OUT`). Waiting goes through a [`Pacer`] and honours a
//! [`CancellationToken`], so tests run without real delays and a host can
//! abort mid-wait.

use std::fmt;
use std::time::Duration;

pub use tokio_util::sync::CancellationToken;

use crate::config::SyncConfig;
use crate::credential::Credential;
use crate::service::{BulkDownloadService, Signed, StatusQuery, StatusResponse, WireState};
use crate::taxonomy::{client_codes, map_code, map_response, ErrorCategory, MappedError};
use crate::types::{PackageId, RequestHandle};

/// The wait between two attempts.
pub trait Pacer {
    /// Wait for `duration`. Returns `false` when `cancel` fired instead.
    fn pause(&self, duration: Duration, cancel: &CancellationToken) -> bool;
}

/// Real-time pacer: blocks the calling thread until the duration elapses
/// or the token is cancelled.
///
/// Must not be called from inside an async runtime; hosts running on tokio
/// drive the synchronization through `spawn_blocking`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn pause(&self, duration: Duration, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }

        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::error!(error = %e, "timer runtime could not start, stopping");
                return false;
            }
        };

        runtime.block_on(async {
            tokio::select! {
                biased;
                () = cancel.cancelled() => false,
                () = tokio::time::sleep(duration) => true,
            }
        })
    }
}

impl<P: Pacer + ?Sized> Pacer for &P {
    fn pause(&self, duration: Duration, cancel: &CancellationToken) -> bool {
        (**self).pause(duration, cancel)
    }
}

/// Canonical request state.
///
/// The service reports it either as a number or as a name; both map here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Accepted,
    InProgress,
    Finished,
    Error,
    Rejected,
    Expired,
}

impl RequestState {
    /// Resolve a wire value. Unknown values yield `None`; they are never
    /// treated as pending.
    pub fn from_wire(state: &WireState) -> Option<Self> {
        match state {
            WireState::Number(n) => Self::from_number(*n),
            WireState::Text(text) => {
                let text = text.trim();
                match text.parse::<i64>() {
                    Ok(n) => Self::from_number(n),
                    Err(_) => Self::from_name(text),
                }
            }
        }
    }

    fn from_number(n: i64) -> Option<Self> {
        match n {
            1 => Some(Self::Accepted),
            2 => Some(Self::InProgress),
            3 => Some(Self::Finished),
            4 => Some(Self::Error),
            5 => Some(Self::Rejected),
            6 => Some(Self::Expired),
            _ => None,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "aceptada" | "accepted" => Some(Self::Accepted),
            "enproceso" | "en proceso" | "inprogress" | "in_progress" => Some(Self::InProgress),
            "terminada" | "finished" => Some(Self::Finished),
            "error" => Some(Self::Error),
            "rechazada" | "rejected" => Some(Self::Rejected),
            "vencida" | "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    #[must_use]
    pub fn number(self) -> u8 {
        match self {
            Self::Accepted => 1,
            Self::InProgress => 2,
            Self::Finished => 3,
            Self::Error => 4,
            Self::Rejected => 5,
            Self::Expired => 6,
        }
    }
}

/// Outcome of one status query, or the client-side timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    /// Finished; zero packages means zero matching documents.
    Terminated(Vec<PackageId>),
    Rejected(MappedError),
    TimedOut { attempts: u32 },
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("PENDING"),
            Self::Terminated(_) => f.write_str("TERMINATED"),
            Self::Rejected(_) => f.write_str("REJECTED"),
            Self::TimedOut { .. } => f.write_str("TIMED_OUT"),
        }
    }
}

impl RequestStatus {
    /// Interpret a status response.
    ///
    /// # Errors
    /// A missing or unknown state is an [`ErrorCategory::Unrecognized`]
    /// error rather than a status.
    pub fn from_response(response: &StatusResponse) -> Result<Self, MappedError> {
        let message = response.message.as_deref();

        // The query itself was refused
        if let Some(code) = non_blank(response.status_code.as_deref()) {
            let mapped = map_code(code, message);
            if mapped.category != ErrorCategory::Accepted {
                return Ok(Self::Rejected(mapped));
            }
        }

        let Some(wire) = response.state.as_ref() else {
            return Err(map_response(None, message));
        };
        let Some(state) = RequestState::from_wire(wire) else {
            return Err(MappedError {
                raw_message: Some(format!("{wire:?}")),
                ..MappedError::client(
                    client_codes::UNRECOGNIZED_STATE,
                    ErrorCategory::Unrecognized,
                    format!("Unknown request state {wire:?}"),
                    "Check the raw state value and the service logs.",
                )
            });
        };

        Ok(match state {
            RequestState::Accepted | RequestState::InProgress => Self::Pending,
            RequestState::Finished => Self::Terminated(package_ids(response)),
            RequestState::Error | RequestState::Rejected | RequestState::Expired => {
                let mapped = match non_blank(response.state_code.as_deref()) {
                    Some(code) => map_code(code, message),
                    None => synthetic_rejection(state, message),
                };
                if mapped.category == ErrorCategory::NoDataInRange {
                    Self::Terminated(Vec::new())
                } else {
                    Self::Rejected(mapped)
                }
            }
        })
    }

    /// Resolve a terminal status to its packages.
    ///
    /// # Errors
    /// `Rejected` yields its error, `TimedOut` a [`ErrorCategory::Timeout`]
    /// error. `Pending` is not terminal and is reported as unrecognized.
    pub fn into_packages(self) -> Result<Vec<PackageId>, MappedError> {
        match self {
            Self::Terminated(ids) => Ok(ids),
            Self::Rejected(err) => Err(err),
            Self::TimedOut { attempts } => Err(MappedError::client(
                client_codes::TIMEOUT,
                ErrorCategory::Timeout,
                format!("Request did not finish after {attempts} status queries"),
                "Retry the synchronization later; the request may still complete remotely.",
            )),
            Self::Pending => Err(MappedError::client(
                client_codes::UNRECOGNIZED_STATE,
                ErrorCategory::Unrecognized,
                "Polling stopped on a non-terminal state",
                "Report this as a bug.",
            )),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn package_ids(response: &StatusResponse) -> Vec<PackageId> {
    let source = if response.package_ids.is_empty() {
        &response.packages
    } else {
        &response.package_ids
    };
    source
        .iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .map(PackageId::new)
        .collect()
}

fn synthetic_rejection(state: RequestState, message: Option<&str>) -> MappedError {
    let category = match state {
        RequestState::Rejected => ErrorCategory::InvalidRequest,
        _ => ErrorCategory::ServiceFault,
    };
    MappedError {
        raw_message: message.map(str::to_string),
        ..MappedError::client(
            &format!("STATE_{}", state.number()),
            category,
            format!("Request ended in state {state:?} without a code"),
            "Submit a new request for the window.",
        )
    }
}

pub(crate) fn cancelled() -> MappedError {
    MappedError::client(
        client_codes::CANCELLED,
        ErrorCategory::Cancelled,
        "Synchronization cancelled by the host",
        "No action needed.",
    )
}

/// Query the status of a request once.
pub fn query_status<S: BulkDownloadService>(
    service: &S,
    credential: &Credential,
    handle: &RequestHandle,
) -> Result<RequestStatus, MappedError> {
    let query = StatusQuery {
        requester_rfc: credential.rfc().to_string(),
        request_id: handle.clone(),
    };
    let signed = Signed::sign(query, credential)?;
    let response = service
        .query_status(&signed)
        .map_err(|e| MappedError::from(&e))?;
    RequestStatus::from_response(&response)
}

/// Poll until the request terminates, is rejected, or the attempt budget
/// runs out.
///
/// At most `config.max_poll_attempts` queries are made; the pacer waits
/// `config.poll_interval` between two of them.
#[tracing::instrument(skip_all, fields(request_id = %handle))]
pub fn poll_until_done<S, P>(
    service: &S,
    credential: &Credential,
    handle: &RequestHandle,
    config: &SyncConfig,
    pacer: &P,
    cancel: &CancellationToken,
) -> Result<Vec<PackageId>, MappedError>
where
    S: BulkDownloadService,
    P: Pacer,
{
    let mut status = RequestStatus::TimedOut {
        attempts: config.max_poll_attempts,
    };

    for attempt in 1..=config.max_poll_attempts {
        if cancel.is_cancelled() {
            return Err(cancelled());
        }

        let current = query_status(service, credential, handle)?;
        tracing::debug!(attempt, status = %current, "status queried");

        if current != RequestStatus::Pending {
            status = current;
            break;
        }

        if attempt < config.max_poll_attempts && !pacer.pause(config.poll_interval, cancel) {
            return Err(cancelled());
        }
    }

    match &status {
        RequestStatus::Terminated(ids) => tracing::info!(packages = ids.len(), "request finished"),
        RequestStatus::Rejected(e) => tracing::warn!(code = %e.code, category = %e.category, "request rejected"),
        RequestStatus::TimedOut { attempts } => tracing::warn!(attempts, "gave up waiting for request"),
        RequestStatus::Pending => {}
    }
    status.into_packages()
}
