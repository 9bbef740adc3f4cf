//! Connect protocol error codes and types.
//!
//! This module provides the core error types used by the Connect protocol:
//! - [`Code`]: the closed set of protocol error codes
//! - [`Status`]: an immutable error value (code, message, details)
//! - [`ErrorDetail`]: self-describing error details
//! - [`EnvelopeError`]: envelope framing errors

/// Connect RPC error codes, matching the codes defined in the Connect protocol.
///
/// Each code has a fixed HTTP status it maps to when a server has no
/// Connect-formatted error body to send; see [`Code::http_status`] and
/// [`Code::from_http_status`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Code {
    Canceled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl Code {
    /// Get the wire string representation of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::Canceled => "canceled",
            Code::Unknown => "unknown",
            Code::InvalidArgument => "invalid_argument",
            Code::DeadlineExceeded => "deadline_exceeded",
            Code::NotFound => "not_found",
            Code::AlreadyExists => "already_exists",
            Code::PermissionDenied => "permission_denied",
            Code::ResourceExhausted => "resource_exhausted",
            Code::FailedPrecondition => "failed_precondition",
            Code::Aborted => "aborted",
            Code::OutOfRange => "out_of_range",
            Code::Unimplemented => "unimplemented",
            Code::Internal => "internal",
            Code::Unavailable => "unavailable",
            Code::DataLoss => "data_loss",
            Code::Unauthenticated => "unauthenticated",
        }
    }

    /// Get the HTTP status a server sends for this code when it has no
    /// Connect-formatted body.
    pub fn http_status(&self) -> u16 {
        match self {
            Code::Canceled => 499,
            Code::Unknown => 500,
            Code::InvalidArgument => 400,
            Code::DeadlineExceeded => 504,
            Code::NotFound => 404,
            Code::AlreadyExists => 409,
            Code::PermissionDenied => 403,
            Code::ResourceExhausted => 429,
            Code::FailedPrecondition => 400,
            Code::Aborted => 409,
            Code::OutOfRange => 400,
            Code::Unimplemented => 501,
            Code::Internal => 500,
            Code::Unavailable => 503,
            Code::DataLoss => 500,
            Code::Unauthenticated => 401,
        }
    }

    /// Map an HTTP status back to a code.
    ///
    /// Several codes share an HTTP status; the first code in declaration
    /// order wins (400 is `InvalidArgument`, 409 is `AlreadyExists`, 500 is
    /// `Unknown`). Used only when a non-200 response body does not carry a
    /// Connect-formatted error.
    pub fn from_http_status(status: u16) -> Option<Self> {
        match status {
            499 => Some(Code::Canceled),
            500 => Some(Code::Unknown),
            400 => Some(Code::InvalidArgument),
            504 => Some(Code::DeadlineExceeded),
            404 => Some(Code::NotFound),
            409 => Some(Code::AlreadyExists),
            403 => Some(Code::PermissionDenied),
            429 => Some(Code::ResourceExhausted),
            501 => Some(Code::Unimplemented),
            503 => Some(Code::Unavailable),
            401 => Some(Code::Unauthenticated),
            _ => None,
        }
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unrecognized code string.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized Connect error code: {0:?}")]
pub struct UnknownCode(pub String);

impl std::str::FromStr for Code {
    type Err = UnknownCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            // "cancelled" is the British spelling some servers send.
            "canceled" | "cancelled" => Ok(Code::Canceled),
            "unknown" => Ok(Code::Unknown),
            "invalid_argument" => Ok(Code::InvalidArgument),
            "deadline_exceeded" => Ok(Code::DeadlineExceeded),
            "not_found" => Ok(Code::NotFound),
            "already_exists" => Ok(Code::AlreadyExists),
            "permission_denied" => Ok(Code::PermissionDenied),
            "resource_exhausted" => Ok(Code::ResourceExhausted),
            "failed_precondition" => Ok(Code::FailedPrecondition),
            "aborted" => Ok(Code::Aborted),
            "out_of_range" => Ok(Code::OutOfRange),
            "unimplemented" => Ok(Code::Unimplemented),
            "internal" => Ok(Code::Internal),
            "unavailable" => Ok(Code::Unavailable),
            "data_loss" => Ok(Code::DataLoss),
            "unauthenticated" => Ok(Code::Unauthenticated),
            other => Err(UnknownCode(other.to_string())),
        }
    }
}

/// A self-describing error detail following the Connect protocol.
///
/// Error details are structured protobuf messages attached to errors,
/// allowing clients to receive strongly-typed error information. This maps
/// to `google.protobuf.Any` on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorDetail {
    /// Fully-qualified type name (e.g., "google.rpc.RetryInfo").
    type_url: String,
    /// Protobuf-encoded message bytes.
    value: Vec<u8>,
}

impl ErrorDetail {
    /// Create a new error detail with a type URL and protobuf-encoded bytes.
    pub fn new<S: Into<String>>(type_url: S, value: Vec<u8>) -> Self {
        Self {
            type_url: type_url.into(),
            value,
        }
    }

    /// Get the fully-qualified type name.
    ///
    /// Any "type.googleapis.com/" prefix is stripped (Connect uses short
    /// type names).
    pub fn type_url(&self) -> &str {
        self.type_url
            .strip_prefix("type.googleapis.com/")
            .unwrap_or(&self.type_url)
    }

    /// Get the protobuf-encoded value bytes.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Decode the detail payload into a concrete message type.
    ///
    /// The caller is responsible for matching [`type_url`](Self::type_url)
    /// against the expected type first.
    pub fn decode<M: prost::Message + Default>(&self) -> Result<M, prost::DecodeError> {
        M::decode(self.value.as_slice())
    }
}

/// A Connect protocol error value: code, optional message, and details.
///
/// `Status` is immutable once handed to a caller; the `with_*` constructors
/// below are consumed during decoding.
#[derive(Clone, Debug)]
pub struct Status {
    code: Code,
    message: Option<String>,
    details: Vec<ErrorDetail>,
}

impl Status {
    /// Create a new status with a code and message.
    pub fn new<S: Into<String>>(code: Code, message: S) -> Self {
        Self {
            code,
            message: Some(message.into()),
            details: Vec::new(),
        }
    }

    /// Create a new status with just a code.
    pub fn from_code(code: Code) -> Self {
        Self {
            code,
            message: None,
            details: Vec::new(),
        }
    }

    /// Get the error code.
    pub fn code(&self) -> Code {
        self.code
    }

    /// Get the error message, if any.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Get the error details.
    pub fn details(&self) -> &[ErrorDetail] {
        &self.details
    }

    /// Attach a pre-constructed detail.
    pub fn with_detail(mut self, detail: ErrorDetail) -> Self {
        self.details.push(detail);
        self
    }

    /// Create a canceled status.
    pub fn canceled<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Canceled, message)
    }

    /// Create a deadline exceeded status.
    pub fn deadline_exceeded<S: Into<String>>(message: S) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    /// Create an invalid argument status.
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    /// Create a failed precondition status.
    pub fn failed_precondition<S: Into<String>>(message: S) -> Self {
        Self::new(Code::FailedPrecondition, message)
    }

    /// Create an internal status.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Internal, message)
    }

    /// Create an unavailable status.
    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unavailable, message)
    }

    /// Create an unimplemented status.
    pub fn unimplemented<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unimplemented, message)
    }

    /// Create a not found status.
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(Code::NotFound, message)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "[{}] {}", self.code, msg),
            None => write!(f, "[{}]", self.code),
        }
    }
}

impl std::error::Error for Status {}

/// Envelope framing errors.
///
/// Raised while parsing or decompressing envelopes in the Connect
/// streaming protocol.
#[derive(Clone, Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// The stream ended inside a 5-byte envelope header.
    #[error("truncated envelope header: expected {expected} bytes, got {actual}")]
    TruncatedHeader { expected: usize, actual: usize },

    /// The stream ended inside an envelope body.
    #[error("truncated envelope body: expected {expected} bytes, got {actual}")]
    TruncatedBody { expected: usize, actual: usize },

    /// Reserved flag bits were set.
    #[error("invalid envelope flags: 0x{0:02x}")]
    InvalidFlags(u8),

    /// The compressed bit was set on a stream negotiated as identity.
    #[error("received compressed envelope on an identity-encoded stream")]
    CompressedWithoutCodec,

    /// Decompression failed.
    #[error("decompression failed: {0}")]
    Decompression(String),

    /// Compression failed.
    #[error("compression failed: {0}")]
    Compression(String),
}
