//! Amazon Bedrock protocol adapter for Anthropic models.
//!
//! - `payload` builds the request envelope
//! - `response` decodes complete responses
//! - `stream` and `eventstream` decode streamed responses
//! - `client` is the HTTP transport

pub mod client;
pub mod eventstream;
pub mod payload;
pub mod response;
pub mod stream;

pub use client::{BedrockClient, Transport};
pub use payload::RequestEnvelope;
pub use response::decode_response;
pub use stream::decode_stream;
