//! Error response parsing for the Connect protocol.
//!
//! Connect servers signal errors as JSON bodies on non-200 unary responses
//! and inside the end-of-stream envelope on streaming responses:
//!
//! ```json
//! {
//!   "code": "not_found",
//!   "message": "resource not found",
//!   "details": [
//!     {"type": "google.rpc.RetryInfo", "value": "base64-encoded-bytes"}
//!   ]
//! }
//! ```

use base64::Engine;
use http::StatusCode;
use lariat_core::{Code, ErrorDetail, Status};
use serde::Deserialize;

use crate::ClientError;

/// Wire form of a Connect error.
#[derive(Deserialize)]
pub(crate) struct ErrorPayloadJson {
    pub(crate) code: String,
    #[serde(default)]
    pub(crate) message: Option<String>,
    #[serde(default)]
    pub(crate) details: Vec<ErrorDetailJson>,
}

/// Wire form of an error detail. Servers may add a "debug" field, which is
/// ignored.
#[derive(Deserialize)]
pub(crate) struct ErrorDetailJson {
    #[serde(rename = "type")]
    type_url: String,
    #[serde(default)]
    value: String,
}

/// Build a [`Status`] from a decoded error payload.
///
/// Unrecognized code strings map to `unknown`; details that fail base64
/// decoding are dropped.
pub(crate) fn status_from_payload(payload: ErrorPayloadJson) -> Status {
    let code = payload.code.parse().unwrap_or(Code::Unknown);
    let mut status = match payload.message {
        Some(message) => Status::new(code, message),
        None => Status::from_code(code),
    };
    for detail in payload.details {
        if let Some(detail) = parse_error_detail(&detail) {
            status = status.with_detail(detail);
        }
    }
    status
}

/// Parse a single error detail from JSON.
fn parse_error_detail(json: &ErrorDetailJson) -> Option<ErrorDetail> {
    // Connect uses standard base64 without padding; accept padded values in
    // case a server sends them.
    let value = base64::engine::general_purpose::STANDARD_NO_PAD
        .decode(&json.value)
        .or_else(|_| base64::engine::general_purpose::STANDARD.decode(&json.value))
        .ok()?;

    Some(ErrorDetail::new(&json.type_url, value))
}

/// Interpret a non-200 response as a [`ClientError`].
///
/// If the body parses as a Connect error payload the decoded status wins;
/// otherwise the error is synthesized from the HTTP status with the reason
/// phrase (empty body) or the body text as the message.
pub(crate) fn parse_error_body(status: StatusCode, body: &[u8]) -> ClientError {
    if !body.is_empty()
        && let Ok(payload) = serde_json::from_slice::<ErrorPayloadJson>(body)
    {
        return ClientError::Rpc(status_from_payload(payload));
    }

    let code = Code::from_http_status(status.as_u16()).unwrap_or(Code::Unknown);
    let message = if body.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    } else {
        String::from_utf8_lossy(body).into_owned()
    };
    ClientError::new(code, message)
}
