//! Bedrock runtime transport.
//!
//! Sends serialized envelopes to the `invoke` and `invoke-with-response-stream`
//! operations using a Bedrock API key.

use std::time::Duration;

use async_stream::try_stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response, Url};
use serde::Deserialize;
use tracing::debug;

use super::eventstream::FrameDecoder;
use super::stream::StreamEvent;
use crate::config::BedrockSettings;
use crate::error::{Error, Result};

const EVENT_STREAM_CONTENT_TYPE: &str = "application/vnd.amazon.eventstream";

/// Ordered events of one streamed invocation.
pub type EventStream = BoxStream<'static, Result<StreamEvent>>;

/// The two invocation protocols of an inference endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request and return the complete response body.
    async fn invoke(&self, model_id: &str, body: Vec<u8>) -> Result<Vec<u8>>;

    /// Send one request and return its response as a stream of events.
    async fn invoke_stream(&self, model_id: &str, body: Vec<u8>) -> Result<EventStream>;
}

/// Transport for the Amazon Bedrock runtime API.
pub struct BedrockClient {
    endpoint: Url,
    api_key: String,
    client: Client,
}

impl BedrockClient {
    /// Create a client from configuration.
    pub fn new(settings: &BedrockSettings) -> Result<Self> {
        let api_key = settings.api_key().ok_or_else(|| {
            Error::Configuration(
                "Bedrock API key not found. Set AWS_BEARER_TOKEN_BEDROCK environment variable \
                 or add api_key to the [bedrock] section of the config file."
                    .to_string(),
            )
        })?;

        let endpoint = settings.endpoint();
        let endpoint = Url::parse(&endpoint).map_err(|e| {
            Error::Configuration(format!("Invalid Bedrock endpoint {}: {}", endpoint, e))
        })?;
        if endpoint.cannot_be_a_base() {
            return Err(Error::Configuration(format!(
                "Invalid Bedrock endpoint {}",
                endpoint
            )));
        }

        // No whole-request timeout: a long generation may stream for many minutes.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .read_timeout(Duration::from_secs(settings.read_timeout_secs))
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            endpoint,
            api_key,
            client,
        })
    }

    /// Build `{endpoint}/model/{model_id}/{operation}`, percent-encoding the model id.
    fn operation_url(&self, model_id: &str, operation: &str) -> Url {
        let mut url = self.endpoint.clone();
        // Checked in `new`.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["model", model_id, operation]);
        }
        url
    }

    async fn post(&self, url: Url, accept: &str, body: Vec<u8>) -> Result<Response> {
        debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, accept)
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Invocation(format!("Failed to connect to Bedrock: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body: std::result::Result<BedrockError, _> = response.json().await;
            let message = body
                .map(|e| e.message)
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::Invocation(format!(
                "Bedrock request failed with status {}: {}",
                status, message
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl Transport for BedrockClient {
    async fn invoke(&self, model_id: &str, body: Vec<u8>) -> Result<Vec<u8>> {
        let url = self.operation_url(model_id, "invoke");
        let response = self.post(url, "application/json", body).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Invocation(format!("Failed to read Bedrock response: {}", e)))?;
        Ok(bytes.to_vec())
    }

    async fn invoke_stream(&self, model_id: &str, body: Vec<u8>) -> Result<EventStream> {
        let url = self.operation_url(model_id, "invoke-with-response-stream");
        let response = self.post(url, EVENT_STREAM_CONTENT_TYPE, body).await?;
        Ok(decode_event_stream(response))
    }
}

/// Turn a streaming response body into events, one frame at a time.
fn decode_event_stream(response: Response) -> EventStream {
    let mut body = response.bytes_stream();
    let stream = try_stream! {
        let mut decoder = FrameDecoder::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk
                .map_err(|e| Error::Invocation(format!("Stream read error: {}", e)))?;
            decoder.extend(&chunk);
            while let Some(frame) = decoder.next_frame()? {
                yield frame.into_event()?;
            }
        }
        decoder.finish()?;
        yield StreamEvent::Terminator;
    };
    stream.boxed()
}

#[derive(Debug, Deserialize)]
struct BedrockError {
    #[serde(alias = "Message")]
    message: String,
}
