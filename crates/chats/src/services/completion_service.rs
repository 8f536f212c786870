//! Assistant reply generation against an OpenAI-compatible
//! chat-completions endpoint.
//!
//! The one-shot path fails closed: any transport or service error becomes a
//! fixed, user-legible apology so that a provider outage degrades the chat
//! instead of breaking it. The streaming path hands the caller a lazy
//! fragment stream and propagates a terminal error item if the upstream
//! connection drops mid-reply; fragments already yielded stand.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use parley_config::AiConfig;

/// Reply sent when the provider cannot be reached or errors out.
pub const FAILURE_REPLY: &str =
    "Извините, произошла ошибка при обработке вашего сообщения. Попробуйте еще раз.";

/// Reply sent when the provider answers with an empty completion.
pub const EMPTY_REPLY: &str = "Извините, я не смог обработать ваш запрос.";

const CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("completion stream interrupted: {0}")]
    Stream(String),
}

/// One prior conversation turn, oldest first, as sent to the provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<RequestMessage<'a>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Serialize)]
struct RequestMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct StreamDelta {
    content: Option<String>,
}

/// Client for the configured completion provider.
pub struct CompletionService {
    client: reqwest::Client,
    config: AiConfig,
}

impl CompletionService {
    pub fn new(config: AiConfig) -> Result<Self, CompletionError> {
        // Only a connect timeout at the client level: the overall request
        // timeout would cut long-running streams short, so the one-shot
        // path applies it per request instead.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;

        Ok(Self { client, config })
    }

    /// Generate a complete assistant reply.
    ///
    /// Never fails: provider errors are logged and replaced by the fixed
    /// apology string, empty completions by the fixed fallback.
    pub async fn generate(&self, message: &str, history: &[ConversationTurn]) -> String {
        match self.request_completion(message, history).await {
            Ok(reply) => reply,
            Err(error) => {
                warn!(%error, "completion request failed, sending fallback reply");
                FAILURE_REPLY.to_string()
            }
        }
    }

    /// Generate an assistant reply as a lazy stream of text fragments.
    ///
    /// Fragments are yielded in arrival order. The stream terminates
    /// normally when the provider signals completion and with one terminal
    /// error item if the upstream connection fails after partial output.
    pub async fn generate_streaming(
        &self,
        message: &str,
        history: &[ConversationTurn],
    ) -> Result<BoxStream<'static, Result<String, CompletionError>>, CompletionError> {
        let request = CompletionRequest {
            model: &self.config.model,
            messages: self.request_messages(message, history),
            stream: true,
        };

        let response = self
            .post_chat_completions()
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        Ok(sse_fragments(response.bytes_stream()).boxed())
    }

    async fn request_completion(
        &self,
        message: &str,
        history: &[ConversationTurn],
    ) -> Result<String, CompletionError> {
        let request = CompletionRequest {
            model: &self.config.model,
            messages: self.request_messages(message, history),
            stream: false,
        };

        let response = self
            .post_chat_completions()
            .timeout(Duration::from_secs(self.config.request_timeout_seconds))
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let completion: ChatCompletion = response.json().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty());

        Ok(content.unwrap_or_else(|| EMPTY_REPLY.to_string()))
    }

    fn request_messages<'a>(
        &'a self,
        message: &'a str,
        history: &'a [ConversationTurn],
    ) -> Vec<RequestMessage<'a>> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(RequestMessage {
            role: "system",
            content: &self.config.system_prompt,
        });
        for turn in history {
            messages.push(RequestMessage {
                role: turn.role.as_str(),
                content: &turn.content,
            });
        }
        messages.push(RequestMessage {
            role: "user",
            content: message,
        });
        messages
    }

    fn post_chat_completions(&self) -> reqwest::RequestBuilder {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let mut builder = self.client.post(url);
        if let Some(api_key) = &self.config.api_key {
            builder = builder.bearer_auth(api_key);
        }
        builder
    }
}

struct SseState<S> {
    upstream: S,
    buffer: String,
    pending: VecDeque<String>,
    done: bool,
}

/// Parse a server-sent-event byte stream into completion text fragments.
///
/// Upstream bytes are buffered until a full `data:` line is available;
/// `[DONE]` ends the stream, unparseable lines are skipped. The upstream is
/// dropped together with the returned stream.
fn sse_fragments<S, E>(upstream: S) -> impl Stream<Item = Result<String, CompletionError>>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Into<CompletionError>,
{
    let state = SseState {
        upstream,
        buffer: String::new(),
        pending: VecDeque::new(),
        done: false,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(fragment) = state.pending.pop_front() {
                return Some((Ok(fragment), state));
            }
            if state.done {
                return None;
            }

            match state.upstream.next().await {
                Some(Ok(chunk)) => {
                    state.buffer.push_str(&String::from_utf8_lossy(&chunk));
                    drain_complete_lines(&mut state);
                }
                Some(Err(error)) => {
                    state.done = true;
                    return Some((Err(error.into()), state));
                }
                None => state.done = true,
            }
        }
    })
}

fn drain_complete_lines<S>(state: &mut SseState<S>) {
    while let Some(newline) = state.buffer.find('\n') {
        let line: String = state.buffer.drain(..=newline).collect();
        let line = line.trim();
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };

        let data = data.trim();
        if data == "[DONE]" {
            state.done = true;
            continue;
        }

        let Ok(chunk) = serde_json::from_str::<StreamChunk>(data) else {
            continue;
        };
        if let Some(delta) = chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
        {
            if !delta.is_empty() {
                state.pending.push_back(delta);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn unreachable_service() -> CompletionService {
        let config = AiConfig {
            // Nothing listens on the discard port.
            base_url: "http://127.0.0.1:9/v1".to_string(),
            request_timeout_seconds: 1,
            ..AiConfig::default()
        };
        CompletionService::new(config).unwrap()
    }

    #[tokio::test]
    async fn generate_fails_closed_with_the_apology_reply() {
        let service = unreachable_service();
        let reply = service.generate("2+2?", &[]).await;
        assert_eq!(reply, FAILURE_REPLY);
    }

    #[tokio::test]
    async fn generate_streaming_surfaces_the_connection_error() {
        let service = unreachable_service();
        assert!(service.generate_streaming("2+2?", &[]).await.is_err());
    }

    fn data_line(content: &str) -> String {
        format!("data: {{\"choices\":[{{\"delta\":{{\"content\":\"{content}\"}}}}]}}\n")
    }

    #[tokio::test]
    async fn sse_fragments_yields_deltas_in_arrival_order() {
        let chunks: Vec<Result<Bytes, CompletionError>> = vec![
            Ok(Bytes::from(data_line("Пр"))),
            Ok(Bytes::from(format!("{}data: [DONE]\n", data_line("ивет")))),
        ];
        let fragments: Vec<_> = sse_fragments(stream::iter(chunks)).collect().await;

        let texts: Vec<_> = fragments
            .into_iter()
            .map(|fragment| fragment.unwrap())
            .collect();
        assert_eq!(texts, vec!["Пр", "ивет"]);
    }

    #[tokio::test]
    async fn sse_fragments_reassembles_lines_split_across_chunks() {
        let line = data_line("hello");
        let (head, tail) = line.split_at(17);
        let chunks: Vec<Result<Bytes, CompletionError>> = vec![
            Ok(Bytes::from(head.to_string())),
            Ok(Bytes::from(tail.to_string())),
            Ok(Bytes::from("data: [DONE]\n".to_string())),
        ];

        let fragments: Vec<_> = sse_fragments(stream::iter(chunks)).collect().await;
        let texts: Vec<_> = fragments
            .into_iter()
            .map(|fragment| fragment.unwrap())
            .collect();
        assert_eq!(texts, vec!["hello"]);
    }

    #[tokio::test]
    async fn sse_fragments_ends_with_an_error_item_when_upstream_fails() {
        let chunks: Vec<Result<Bytes, CompletionError>> = vec![
            Ok(Bytes::from(data_line("partial"))),
            Err(CompletionError::Stream("connection reset".to_string())),
        ];

        let fragments: Vec<_> = sse_fragments(stream::iter(chunks)).collect().await;
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].as_deref().unwrap(), "partial");
        assert!(fragments[1].is_err());
    }

    #[tokio::test]
    async fn sse_fragments_skips_comments_and_unparseable_lines() {
        let chunks: Vec<Result<Bytes, CompletionError>> = vec![Ok(Bytes::from(format!(
            ": keep-alive\n{}garbage\ndata: not json\ndata: [DONE]\n",
            data_line("ok")
        )))];

        let fragments: Vec<_> = sse_fragments(stream::iter(chunks)).collect().await;
        let texts: Vec<_> = fragments
            .into_iter()
            .map(|fragment| fragment.unwrap())
            .collect();
        assert_eq!(texts, vec!["ok"]);
    }
}
