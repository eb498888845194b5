//! Streaming text sources for SiteGen.
//!
//! The pipeline only sees the [`TextSource`] trait: hand it a system prompt
//! and a message list, get back a stream of [`StreamEvent`]s that ends with
//! the final message. Implementations:
//! - [`AnthropicSource`] — Anthropic Messages API over server-sent events
//! - [`ScriptedSource`] — canned replies for tests and offline runs

mod anthropic;
mod scripted;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use sitegen_shared::Result;

pub use anthropic::{ANTHROPIC_VERSION, AnthropicSource};
pub use scripted::ScriptedSource;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Conversation role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Everything needed for one completion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    /// What the call is for (`theme`, `template-parts`, `page:menu`); used
    /// for logging and by scripted sources to pick a reply.
    pub purpose: String,
    pub system: String,
    pub messages: Vec<Message>,
}

/// Token accounting reported by the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl std::ops::AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
    }
}

/// The completed reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalMessage {
    pub text: String,
    pub usage: Usage,
    pub stop_reason: Option<String>,
}

/// One incremental event from a streaming call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A chunk of reply text.
    Delta(String),
    /// The call finished; always the last item of a healthy stream.
    Done(FinalMessage),
}

/// Events of one call. An `Err` item ends the stream.
pub type TextStream = BoxStream<'static, Result<StreamEvent>>;

// ---------------------------------------------------------------------------
// TextSource
// ---------------------------------------------------------------------------

/// A black-box streaming text generator.
#[async_trait]
pub trait TextSource: Send + Sync {
    /// Start a call. Fails up front when the call cannot be made at all
    /// (e.g., [`sitegen_shared::SitegenError::MissingCredentials`]).
    async fn stream(&self, request: CompletionRequest) -> Result<TextStream>;

    /// Short name for logs.
    fn name(&self) -> &str;
}
