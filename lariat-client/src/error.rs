//! Client-side Connect protocol error types.
//!
//! This module provides [`ClientError`], the error type for Connect RPC
//! client operations.

use lariat_core::{Code, EnvelopeError, ErrorDetail, Status, UnknownEncoding};

/// Client-side Connect protocol error variants.
///
/// This enum represents the different types of errors that can occur
/// during client-side RPC communication.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ClientError {
    /// RPC status error, either signaled by the server or synthesized
    /// locally (timeout, cancellation).
    #[error("{0}")]
    Rpc(Status),

    /// Transport-level error (connection failed, unexpected EOF, etc.).
    #[error("transport error: {0}")]
    Transport(String),

    /// Message encoding error.
    #[error("encode error: {0}")]
    Encode(String),

    /// Message decoding error.
    #[error("decode error: {0}")]
    Decode(String),

    /// Protocol error (malformed envelopes, missing end-of-stream,
    /// unexpected content types).
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    /// Create a new status error with a code and message.
    pub fn new<S: Into<String>>(code: Code, message: S) -> Self {
        ClientError::Rpc(Status::new(code, message))
    }

    /// Create a new status error with just a code.
    pub fn from_code(code: Code) -> Self {
        ClientError::Rpc(Status::from_code(code))
    }

    /// Get the error code.
    ///
    /// For non-Rpc variants, returns the code the error kind maps to:
    /// - Transport: `Unavailable`
    /// - Encode/Decode: `Internal`
    /// - Protocol: `InvalidArgument`
    pub fn code(&self) -> Code {
        match self {
            ClientError::Rpc(status) => status.code(),
            ClientError::Transport(_) => Code::Unavailable,
            ClientError::Encode(_) | ClientError::Decode(_) => Code::Internal,
            ClientError::Protocol(_) => Code::InvalidArgument,
        }
    }

    /// Get the error message.
    pub fn message(&self) -> Option<&str> {
        match self {
            ClientError::Rpc(status) => status.message(),
            ClientError::Transport(msg)
            | ClientError::Encode(msg)
            | ClientError::Decode(msg)
            | ClientError::Protocol(msg) => Some(msg),
        }
    }

    /// Get the error details (only non-empty for the Rpc variant).
    pub fn details(&self) -> &[ErrorDetail] {
        match self {
            ClientError::Rpc(status) => status.details(),
            _ => &[],
        }
    }

    /// Get the inner Status if this is an Rpc error.
    pub fn status(&self) -> Option<&Status> {
        match self {
            ClientError::Rpc(status) => Some(status),
            _ => None,
        }
    }

    /// Convert into the inner Status if this is an Rpc error.
    pub fn into_status(self) -> Option<Status> {
        match self {
            ClientError::Rpc(status) => Some(status),
            _ => None,
        }
    }

    // Convenience constructors

    /// Create a canceled error.
    pub fn canceled<S: Into<String>>(message: S) -> Self {
        ClientError::Rpc(Status::canceled(message))
    }

    /// Create a deadline exceeded error.
    pub fn deadline_exceeded<S: Into<String>>(message: S) -> Self {
        ClientError::Rpc(Status::deadline_exceeded(message))
    }

    /// Create a failed precondition error.
    pub fn failed_precondition<S: Into<String>>(message: S) -> Self {
        ClientError::Rpc(Status::failed_precondition(message))
    }

    /// Create an internal error.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        ClientError::Rpc(Status::internal(message))
    }

    /// Create an invalid argument error.
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        ClientError::Rpc(Status::invalid_argument(message))
    }

    /// Create an unavailable error.
    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        ClientError::Rpc(Status::unavailable(message))
    }
}

impl From<Status> for ClientError {
    fn from(status: Status) -> Self {
        ClientError::Rpc(status)
    }
}

impl From<EnvelopeError> for ClientError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::TruncatedHeader { .. }
            | EnvelopeError::TruncatedBody { .. }
            | EnvelopeError::InvalidFlags(_)
            | EnvelopeError::CompressedWithoutCodec => ClientError::Protocol(err.to_string()),
            EnvelopeError::Decompression(msg) => {
                ClientError::Decode(format!("decompression failed: {}", msg))
            }
            EnvelopeError::Compression(msg) => {
                ClientError::Encode(format!("compression failed: {}", msg))
            }
        }
    }
}

impl From<UnknownEncoding> for ClientError {
    // An unknown codec name from the peer is an internal error per the
    // Connect protocol, not an invalid argument.
    fn from(err: UnknownEncoding) -> Self {
        ClientError::Rpc(Status::internal(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_new() {
        let err = ClientError::new(Code::NotFound, "resource not found");
        assert_eq!(err.code(), Code::NotFound);
        assert_eq!(err.message(), Some("resource not found"));
        assert!(err.details().is_empty());
    }

    #[test]
    fn test_client_error_from_code() {
        let err = ClientError::from_code(Code::Internal);
        assert_eq!(err.code(), Code::Internal);
        assert!(err.message().is_none());
    }

    #[test]
    fn test_client_error_variant_codes() {
        let transport = ClientError::Transport("connection refused".into());
        assert_eq!(transport.code(), Code::Unavailable);

        let encode = ClientError::Encode("serialization failed".into());
        assert_eq!(encode.code(), Code::Internal);

        let decode = ClientError::Decode("deserialization failed".into());
        assert_eq!(decode.code(), Code::Internal);

        let protocol = ClientError::Protocol("invalid envelope".into());
        assert_eq!(protocol.code(), Code::InvalidArgument);
    }

    #[test]
    fn test_client_error_from_envelope_error() {
        let err: ClientError = EnvelopeError::InvalidFlags(0xff).into();
        assert_eq!(err.code(), Code::InvalidArgument);

        let err: ClientError = EnvelopeError::CompressedWithoutCodec.into();
        assert_eq!(err.code(), Code::InvalidArgument);

        let err: ClientError = EnvelopeError::Decompression("bad gzip".into()).into();
        assert_eq!(err.code(), Code::Internal);
    }

    #[test]
    fn test_client_error_from_unknown_encoding() {
        let err: ClientError = UnknownEncoding("lz4".to_string()).into();
        assert_eq!(err.code(), Code::Internal);
    }

    #[test]
    fn test_client_error_status_accessors() {
        let err = ClientError::new(Code::NotFound, "missing");
        assert!(err.status().is_some());
        assert_eq!(err.status().unwrap().code(), Code::NotFound);

        let err = ClientError::Transport("network error".into());
        assert!(err.status().is_none());

        let err = ClientError::new(Code::Internal, "error");
        let status = err.into_status();
        assert_eq!(status.unwrap().code(), Code::Internal);
    }
}
