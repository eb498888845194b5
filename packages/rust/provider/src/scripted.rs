//! Canned text source for tests and offline runs.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use sitegen_shared::Result;

use crate::{CompletionRequest, FinalMessage, StreamEvent, TextSource, TextStream, Usage};

type Responder = Box<dyn Fn(&CompletionRequest) -> Result<String> + Send + Sync>;

/// Replies with text produced by a closure, streamed in fixed-size chunks.
///
/// A responder returning `Err` makes the call fail up front, the way a
/// rejected HTTP request would.
pub struct ScriptedSource {
    responder: Responder,
    chunk_size: usize,
    chunk_delay: Option<Duration>,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedSource {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            chunk_size: 16,
            chunk_delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Same reply for every call.
    pub fn always(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(move |_| Ok(text.clone()))
    }

    /// Characters per delta (at least 1).
    pub fn with_chunk_size(mut self, chars: usize) -> Self {
        self.chunk_size = chars.max(1);
        self
    }

    /// Sleep between deltas.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// Requests received so far, in call order.
    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Split on char boundaries into pieces of at most `size` chars.
fn chunk_text(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size)
        .map(|piece| piece.iter().collect())
        .collect()
}

#[async_trait]
impl TextSource for ScriptedSource {
    async fn stream(&self, request: CompletionRequest) -> Result<TextStream> {
        let reply = (self.responder)(&request);
        let input_tokens = request
            .messages
            .iter()
            .map(|m| m.content.split_whitespace().count() as u64)
            .sum::<u64>()
            + request.system.split_whitespace().count() as u64;
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        let text = reply?;

        let usage = Usage {
            input_tokens,
            output_tokens: text.split_whitespace().count() as u64,
        };
        let mut events: Vec<Result<StreamEvent>> = chunk_text(&text, self.chunk_size)
            .into_iter()
            .map(|chunk| Ok(StreamEvent::Delta(chunk)))
            .collect();
        events.push(Ok(StreamEvent::Done(FinalMessage {
            text,
            usage,
            stop_reason: Some("end_turn".into()),
        })));

        let stream = futures::stream::iter(events);
        match self.chunk_delay {
            Some(delay) => Ok(stream
                .then(move |event| async move {
                    tokio::time::sleep(delay).await;
                    event
                })
                .boxed()),
            None => Ok(stream.boxed()),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Message;
    use sitegen_shared::SitegenError;

    fn request(purpose: &str) -> CompletionRequest {
        CompletionRequest {
            purpose: purpose.into(),
            system: "system prompt".into(),
            messages: vec![Message::user("hello there")],
        }
    }

    #[tokio::test]
    async fn streams_chunks_then_done() {
        let source = ScriptedSource::always("caf\u{e9} menu").with_chunk_size(4);
        let events: Vec<_> = source
            .stream(request("theme"))
            .await
            .unwrap()
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .map(|e| e.unwrap())
            .collect();

        assert_eq!(
            events[..3],
            [
                StreamEvent::Delta("caf\u{e9}".into()),
                StreamEvent::Delta(" men".into()),
                StreamEvent::Delta("u".into()),
            ]
        );
        match &events[3] {
            StreamEvent::Done(message) => {
                assert_eq!(message.text, "caf\u{e9} menu");
                assert_eq!(message.usage.input_tokens, 4);
                assert_eq!(message.usage.output_tokens, 2);
            }
            other => panic!("expected Done, got {other:?}"),
        }
        assert_eq!(source.call_count(), 1);
    }

    #[tokio::test]
    async fn responder_sees_purpose_and_errors_fail_up_front() {
        let source = ScriptedSource::new(|req| {
            if req.purpose == "theme" {
                Err(SitegenError::Transport("boom".into()))
            } else {
                Ok(req.purpose.clone())
            }
        });

        assert!(source.stream(request("theme")).await.is_err());
        assert!(source.stream(request("page:home")).await.is_ok());

        let purposes: Vec<_> = source.calls().into_iter().map(|c| c.purpose).collect();
        assert_eq!(purposes, vec!["theme", "page:home"]);
    }

    #[test]
    fn chunk_size_zero_is_clamped() {
        let source = ScriptedSource::always("ab").with_chunk_size(0);
        assert_eq!(source.chunk_size, 1);
        assert_eq!(chunk_text("abc", 2), vec!["ab", "c"]);
    }
}
