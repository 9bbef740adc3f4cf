//! Request-side encoding for Connect RPC calls.
//!
//! - [`EnvelopeEncoder`]: frames a message stream into a streaming
//!   request body

mod encoder;

pub use encoder::EnvelopeEncoder;
