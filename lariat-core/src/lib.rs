//! Core Connect protocol types for lariat.
//!
//! This crate provides the protocol-level building blocks used by the
//! client crate (`lariat-client`):
//!
//! - [`error`]: error codes, status values, and error details
//! - [`codec`]: the per-message compression codec trait and implementations
//! - [`registry`]: the name-to-codec registry used for negotiation
//! - [`encoding`]: message encodings (protobuf / JSON) and content types
//! - [`envelope`]: streaming envelope framing

mod codec;
mod encoding;
mod envelope;
mod error;
mod registry;

pub use codec::*;
pub use encoding::*;
pub use envelope::*;
pub use error::*;
pub use registry::*;
