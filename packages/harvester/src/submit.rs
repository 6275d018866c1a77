//! Request submission.

use crate::credential::Credential;
use crate::service::{BulkDownloadService, Signed, SubmitResponse};
use crate::taxonomy::{map_code, map_response, ErrorCategory, MappedError};
use crate::types::{DateRange, Direction, DownloadRequest, RequestHandle};

/// Submit one directional download request.
///
/// The request is signed with `credential` and filtered on the credential's
/// own RFC. No retry happens here: every failure is returned immediately.
///
/// # Errors
/// A non-success status code wins over any identifier in the response. A
/// response without a usable identifier maps through the taxonomy, falling
/// back to the generic "unrecognized response" error.
#[tracing::instrument(skip_all, fields(direction = %direction, rfc = %credential.rfc()))]
pub fn submit<S: BulkDownloadService>(
    service: &S,
    credential: &Credential,
    range: &DateRange,
    direction: Direction,
) -> Result<RequestHandle, MappedError> {
    let request = DownloadRequest::new(credential.rfc(), *range, direction);
    let signed = Signed::sign(request, credential)?;

    let response = service
        .submit_request(&signed)
        .map_err(|e| MappedError::from(&e))?;

    let handle = interpret(&response)?;
    tracing::info!(request_id = %handle, "request accepted");
    Ok(handle)
}

fn interpret(response: &SubmitResponse) -> Result<RequestHandle, MappedError> {
    let code = response
        .status_code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());

    if let Some(code) = code {
        let mapped = map_code(code, response.message.as_deref());
        if mapped.category != ErrorCategory::Accepted {
            tracing::warn!(code = %mapped.code, category = %mapped.category, "request refused");
            return Err(mapped);
        }
    }

    response
        .request_id
        .as_deref()
        .and_then(RequestHandle::parse)
        .ok_or_else(|| {
            tracing::warn!(raw = ?response.request_id, "response carried no usable request id");
            map_response(None, response.message.as_deref())
        })
}
