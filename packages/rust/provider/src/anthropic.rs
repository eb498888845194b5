//! Anthropic Messages API client (streaming).

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::Client;
use serde::Deserialize;
use sse_stream::{Sse, SseStream};
use tracing::{debug, instrument, warn};
use url::Url;

use sitegen_shared::{AnthropicConfig, Result, SitegenError};

use crate::{CompletionRequest, FinalMessage, StreamEvent, TextSource, TextStream, Usage};

/// Value sent in the `anthropic-version` header.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("SiteGen/", env!("CARGO_PKG_VERSION"));

/// Streams completions from the Anthropic Messages API.
pub struct AnthropicSource {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    api_key_env: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicSource {
    /// Build from config. The API key is read from the configured env var
    /// now; a missing key only fails when a call is made.
    pub fn from_config(config: &AnthropicConfig) -> Result<Self> {
        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let endpoint = Url::parse(&base)
            .and_then(|url| url.join("v1/messages"))
            .map_err(|e| {
                SitegenError::config(format!("invalid base_url '{}': {e}", config.base_url))
            })?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SitegenError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            api_key: std::env::var(&config.api_key_env).ok(),
            api_key_env: config.api_key_env.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    /// Override the key read from the environment.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

#[async_trait]
impl TextSource for AnthropicSource {
    #[instrument(skip_all, fields(purpose = %request.purpose, model = %self.model))]
    async fn stream(&self, request: CompletionRequest) -> Result<TextStream> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| SitegenError::MissingCredentials {
                env_var: self.api_key_env.clone(),
            })?;

        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": request.system,
            "messages": request.messages,
            "stream": true,
        });

        let response = self
            .client
            .post(self.endpoint.clone())
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| SitegenError::Transport(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SitegenError::Provider {
                status: status.as_u16(),
                message: api_error_message(&text),
            });
        }

        debug!(%status, "completion stream opened");
        let frames = SseStream::from_byte_stream(response.bytes_stream()).boxed();
        Ok(event_stream(frames))
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiEvent {
    MessageStart { message: ApiMessage },
    ContentBlockDelta { delta: ApiDelta },
    MessageDelta {
        delta: ApiMessageDelta,
        #[serde(default)]
        usage: Option<ApiUsage>,
    },
    MessageStop,
    Error { error: ApiError },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiDelta {
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiMessageDelta {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: Option<u64>,
    #[serde(default)]
    output_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

/// Pull a readable message out of an error response body.
fn api_error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => format!("{}: {}", parsed.error.kind, parsed.error.message),
        Err(_) => body.chars().take(200).collect(),
    }
}

// ---------------------------------------------------------------------------
// SSE → StreamEvent
// ---------------------------------------------------------------------------

type SseFrames = BoxStream<'static, std::result::Result<Sse, sse_stream::Error>>;

struct StreamState {
    frames: SseFrames,
    ready: VecDeque<Result<StreamEvent>>,
    text: String,
    usage: Usage,
    stop_reason: Option<String>,
    finished: bool,
}

impl StreamState {
    fn handle(&mut self, sse: Sse) {
        if self.finished {
            return;
        }
        // Comments and keep-alives carry no data.
        let Some(data) = sse.data.as_deref() else {
            return;
        };
        let event: ApiEvent = match serde_json::from_str(data) {
            Ok(event) => event,
            Err(e) => {
                warn!(event = ?sse.event, error = %e, "skipping undecodable stream event");
                return;
            }
        };

        match event {
            ApiEvent::MessageStart { message } => {
                if let Some(usage) = message.usage {
                    self.usage.input_tokens = usage.input_tokens.unwrap_or(0);
                    self.usage.output_tokens = usage.output_tokens.unwrap_or(0);
                }
            }
            ApiEvent::ContentBlockDelta {
                delta: ApiDelta::TextDelta { text },
            } => {
                self.text.push_str(&text);
                self.ready.push_back(Ok(StreamEvent::Delta(text)));
            }
            ApiEvent::ContentBlockDelta { .. } => {}
            ApiEvent::MessageDelta { delta, usage } => {
                if delta.stop_reason.is_some() {
                    self.stop_reason = delta.stop_reason;
                }
                if let Some(output) = usage.and_then(|u| u.output_tokens) {
                    self.usage.output_tokens = output;
                }
            }
            ApiEvent::MessageStop => {
                self.finished = true;
                self.ready.push_back(Ok(StreamEvent::Done(FinalMessage {
                    text: std::mem::take(&mut self.text),
                    usage: self.usage,
                    stop_reason: self.stop_reason.take(),
                })));
            }
            ApiEvent::Error { error } => {
                self.finished = true;
                self.ready.push_back(Err(SitegenError::Stream(format!(
                    "{}: {}",
                    error.kind, error.message
                ))));
            }
            ApiEvent::Other => {}
        }
    }
}

fn event_stream(frames: SseFrames) -> TextStream {
    let state = StreamState {
        frames,
        ready: VecDeque::new(),
        text: String::new(),
        usage: Usage::default(),
        stop_reason: None,
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.ready.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.frames.next().await {
                Some(Ok(sse)) => state.handle(sse),
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(SitegenError::Transport(e.to_string())), state));
                }
                None => {
                    if !state.finished {
                        state.finished = true;
                        state.ready.push_back(Err(SitegenError::Stream(
                            "stream ended before the final message".into(),
                        )));
                    }
                }
            }
        }
    })
    .boxed()
}
