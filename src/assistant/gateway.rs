//! AI completion gateway client.
//!
//! Speaks the hosted gateway's chat-completions contract: a JSON POST
//! with `stream: true` whose response body is the SSE delta stream, and
//! a non-streaming variant used for title derivation. Enum dispatch so
//! tests script exact byte streams without a network.

use std::pin::Pin;

use axum::body::Bytes;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use super::sse;

/// Boxed byte stream of SSE lines from the gateway.
pub type DeltaByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, GatewayError>> + Send>>;

/// Gateway failures. Status-coded variants map one-to-one onto the
/// user-facing failure messages; all variants clone cheaply so they can
/// flow through both sides of a forked stream.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("Gateway rejected credentials")]
    Unauthorized,
    #[error("Gateway requires payment or credits")]
    PaymentRequired,
    #[error("Gateway rate limit exceeded")]
    RateLimited,
    #[error("Gateway returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("Cannot reach gateway: {0}")]
    Connection(String),
    #[error("Gateway response could not be parsed: {0}")]
    Malformed(String),
}

impl GatewayError {
    fn from_status(status: u16, body: String) -> Self {
        match status {
            401 => Self::Unauthorized,
            402 => Self::PaymentRequired,
            429 => Self::RateLimited,
            _ => Self::Upstream { status, body },
        }
    }
}

/// One turn handed to the gateway.
#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    pub role: &'static str,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant",
            content: content.into(),
        }
    }
}

/// Assembled completion request: system prompt plus ordered turns.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub turns: Vec<ChatTurn>,
}

/// Gateway handle.
pub enum ChatGateway {
    Http(HttpChatGateway),
    Mock(MockChatGateway),
}

impl ChatGateway {
    /// Open a streaming completion. Pre-stream failures surface here;
    /// mid-stream failures arrive as items on the returned stream.
    pub async fn stream_chat(&self, request: &CompletionRequest) -> Result<DeltaByteStream, GatewayError> {
        match self {
            Self::Http(client) => client.stream_chat(request).await,
            Self::Mock(mock) => mock.stream_chat(),
        }
    }

    /// Non-streaming completion (title derivation).
    pub async fn complete(&self, system: &str, prompt: &str) -> Result<String, GatewayError> {
        match self {
            Self::Http(client) => client.complete(system, prompt).await,
            Self::Mock(mock) => mock.complete(),
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    stream: bool,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct WireCompletion {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireReply,
}

#[derive(Deserialize)]
struct WireReply {
    content: String,
}

pub struct HttpChatGateway {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl HttpChatGateway {
    pub fn new(base_url: &str, api_key: &str, model: &str, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            client,
        }
    }

    fn wire_messages<'a>(&self, request: &'a CompletionRequest) -> Vec<WireMessage<'a>> {
        let mut messages = Vec::with_capacity(request.turns.len() + 1);
        messages.push(WireMessage {
            role: "system",
            content: &request.system,
        });
        for turn in &request.turns {
            messages.push(WireMessage {
                role: turn.role,
                content: &turn.content,
            });
        }
        messages
    }

    async fn send(
        &self,
        request: &CompletionRequest,
        stream: bool,
    ) -> Result<reqwest::Response, GatewayError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = WireRequest {
            model: &self.model,
            stream,
            messages: self.wire_messages(request),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::from_status(status.as_u16(), body));
        }
        Ok(response)
    }

    async fn stream_chat(&self, request: &CompletionRequest) -> Result<DeltaByteStream, GatewayError> {
        let response = self.send(request, true).await?;
        let stream = response
            .bytes_stream()
            .map(|item| item.map_err(|e| GatewayError::Connection(e.to_string())));
        Ok(Box::pin(stream))
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String, GatewayError> {
        let request = CompletionRequest {
            system: system.to_string(),
            turns: vec![ChatTurn::user(prompt)],
        };
        let response = self.send(&request, false).await?;
        let parsed: WireCompletion = response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| GatewayError::Malformed("empty choices".into()))
    }
}

// ---------------------------------------------------------------------------
// Mock
// ---------------------------------------------------------------------------

/// Scripted gateway for tests: exact byte chunks for the stream, a
/// canned (or failing) title completion, or a status-coded refusal.
#[derive(Default)]
pub struct MockChatGateway {
    chunks: Vec<Vec<u8>>,
    fail_status: Option<u16>,
    title_reply: Option<String>,
    mid_stream_error: Option<GatewayError>,
}

impl MockChatGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a reply as one delta line per fragment plus the sentinel.
    pub fn with_fragments(mut self, fragments: &[&str]) -> Self {
        let mut chunks: Vec<Vec<u8>> = fragments
            .iter()
            .map(|f| sse::encode_delta(f).into_bytes())
            .collect();
        chunks.push(sse::encode_done().into_bytes());
        self.chunks = chunks;
        self
    }

    /// Script exact raw byte chunks (to exercise line re-buffering).
    pub fn with_raw_chunks(mut self, chunks: Vec<Vec<u8>>) -> Self {
        self.chunks = chunks;
        self
    }

    /// Refuse every call with this HTTP status.
    pub fn failing(status: u16) -> Self {
        Self {
            fail_status: Some(status),
            ..Self::default()
        }
    }

    /// Script the non-streaming title completion.
    pub fn with_title(mut self, title: &str) -> Self {
        self.title_reply = Some(title.to_string());
        self
    }

    /// Cut the stream with an error after the scripted chunks.
    pub fn with_mid_stream_error(mut self, error: GatewayError) -> Self {
        self.mid_stream_error = Some(error);
        self
    }

    fn stream_chat(&self) -> Result<DeltaByteStream, GatewayError> {
        if let Some(status) = self.fail_status {
            return Err(GatewayError::from_status(status, String::new()));
        }
        let mut items: Vec<Result<Bytes, GatewayError>> = self
            .chunks
            .iter()
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        if let Some(error) = &self.mid_stream_error {
            items.push(Err(error.clone()));
        }
        Ok(Box::pin(futures_util::stream::iter(items)))
    }

    fn complete(&self) -> Result<String, GatewayError> {
        if let Some(status) = self.fail_status {
            return Err(GatewayError::from_status(status, String::new()));
        }
        self.title_reply
            .clone()
            .ok_or_else(|| GatewayError::Malformed("no scripted completion".into()))
    }
}
