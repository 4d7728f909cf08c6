//! Invocation dispatcher.
//!
//! Sends one envelope over either the synchronous or the streaming protocol
//! and writes the decoded text to the output sink exactly once.

use std::io::Write;

use tracing::{debug, info};

use crate::bedrock::{decode_response, decode_stream, RequestEnvelope, Transport};
use crate::error::{Error, Result};

/// Which invocation protocol to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Synchronous,
    Streaming,
}

impl Mode {
    pub fn from_flag(stream: bool) -> Self {
        if stream {
            Mode::Streaming
        } else {
            Mode::Synchronous
        }
    }
}

/// Dispatch a single request and render its output to `sink`.
pub async fn dispatch<T, W>(
    transport: &T,
    envelope: &RequestEnvelope,
    model_id: &str,
    mode: Mode,
    sink: &mut W,
) -> Result<()>
where
    T: Transport + ?Sized,
    W: Write,
{
    let body = serde_json::to_vec(envelope)
        .map_err(|e| Error::Invocation(format!("Failed to encode request: {}", e)))?;
    debug!(
        model = model_id,
        mode = ?mode,
        prompt_bytes = envelope.text().len(),
        "Dispatching request"
    );

    match mode {
        Mode::Synchronous => {
            let response = transport.invoke(model_id, body).await?;
            let text = decode_response(&response)?;
            writeln!(sink, "{}", text)
                .and_then(|_| sink.flush())
                .map_err(Error::Output)?;
        }
        Mode::Streaming => {
            let events = transport.invoke_stream(model_id, body).await?;
            let summary = decode_stream(events, sink).await?;
            if !summary.unknown_variants.is_empty() || summary.unrecognized > 0 {
                info!(
                    unknown = ?summary.unknown_variants,
                    unrecognized = summary.unrecognized,
                    "Skipped stream events"
                );
            }
        }
    }

    Ok(())
}
