//! Stream event decoding.
//!
//! Turns the ordered events of a streamed invocation into text written to a
//! sink as soon as each fragment arrives.

use std::io::Write;

use futures::{Stream, StreamExt};
use serde::de::IgnoredAny;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// One event delivered by the streaming transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Raw JSON bytes of a model chunk.
    Chunk(Vec<u8>),
    /// An event whose tag this client does not know.
    UnknownVariant(String),
    /// A frame that is neither a known event nor a tagged unknown one.
    Unrecognized,
    /// The transport signaled the end of the stream.
    Terminator,
}

/// What was skipped while decoding a stream.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StreamSummary {
    /// Number of chunks that produced text.
    pub fragments: usize,
    /// Tags of unknown variants, in arrival order.
    pub unknown_variants: Vec<String>,
    /// Number of unrecognized events.
    pub unrecognized: usize,
}

#[derive(Debug, Deserialize)]
struct ChunkDocument {
    #[serde(default)]
    delta: Option<Delta>,
}

/// Only an object `delta` can carry text.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Delta {
    Object(Map<String, Value>),
    Other(IgnoredAny),
}

/// Extract the `delta.text` fragment of a chunk, if it carries one.
pub fn chunk_text(bytes: &[u8]) -> Result<Option<String>> {
    let chunk: ChunkDocument =
        serde_json::from_slice(bytes).map_err(|e| Error::MalformedChunk(e.to_string()))?;
    Ok(match chunk.delta {
        Some(Delta::Object(mut delta)) => match delta.remove("text") {
            Some(Value::String(text)) => Some(text),
            _ => None,
        },
        _ => None,
    })
}

/// Drive an event stream to completion, writing text fragments to `sink`.
///
/// A trailing newline is written once the stream ends. Text written before a
/// failure stays written.
pub async fn decode_stream<S, W>(mut events: S, sink: &mut W) -> Result<StreamSummary>
where
    S: Stream<Item = Result<StreamEvent>> + Unpin,
    W: Write,
{
    let mut summary = StreamSummary::default();

    while let Some(event) = events.next().await {
        match event? {
            StreamEvent::Chunk(bytes) => {
                if let Some(text) = chunk_text(&bytes)? {
                    emit(sink, text.as_bytes())?;
                    summary.fragments += 1;
                }
            }
            StreamEvent::UnknownVariant(tag) => {
                warn!("Skipping unknown stream event: {}", tag);
                summary.unknown_variants.push(tag);
            }
            StreamEvent::Unrecognized => {
                warn!("Skipping unrecognized stream event");
                summary.unrecognized += 1;
            }
            StreamEvent::Terminator => break,
        }
    }

    emit(sink, b"\n")?;
    debug!(
        fragments = summary.fragments,
        skipped = summary.unknown_variants.len() + summary.unrecognized,
        "Stream complete"
    );
    Ok(summary)
}

fn emit<W: Write>(sink: &mut W, bytes: &[u8]) -> Result<()> {
    sink.write_all(bytes)
        .and_then(|_| sink.flush())
        .map_err(Error::Output)
}
