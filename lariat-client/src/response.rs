//! Response-side types and decoding for Connect RPC calls.
//!
//! - [`UnaryOutput`]: unary-shaped result with errors recorded, not raised
//! - [`StreamOutput`]: streaming response handle with trailer access
//! - [`Metadata`]: response header/trailer map
//! - [`EnvelopeDecoder`]: decodes Connect envelopes from a response body

mod decoder;
pub(crate) mod error_parser;
mod streaming;
mod types;

pub use decoder::EnvelopeDecoder;
pub use streaming::{StreamOutput, StreamState};
pub use types::{Metadata, UnaryOutput};
