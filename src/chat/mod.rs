//! Streaming chat proxy.
//!
//! Forwards an ordered conversation to a remote completion service
//! configured with a small tool surface, executes the tool calls the model
//! requests against the synchronization service, and streams text back to
//! the caller as it arrives.
//!
//! Failure contract: the caller always gets a normal stream. If the
//! upstream call dies before producing a single token, the stream carries a
//! plain-text failure message instead — the client renders one path for
//! content and failures alike, no transport-error special case.

pub mod client;
pub mod tools;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::sync::SyncService;

/// Cap on completion→tool→completion round trips for one request.
const MAX_TOOL_ROUNDS: usize = 4;

/// Channel depth for streamed text chunks.
const STREAM_BUFFER: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model mid-generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// JSON-encoded arguments, exactly as the model produced them.
    pub arguments: String,
}

/// One turn of the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    /// Tool invocations attached to an assistant turn.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// For tool-result turns: the id of the call being answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    /// Tool results are always plain strings — the model consumes them as
    /// text, so tools never raise.
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// Schema-described tool exposed to the remote model.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: serde_json::Value,
}

/// One element of an upstream completion stream.
#[derive(Debug, Clone)]
pub enum CompletionChunk {
    Token(String),
    ToolCall(ToolCall),
    Done,
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("Completion API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Transport: {0}")]
    Transport(String),

    #[error("Completion service not configured: {0}")]
    NotConfigured(String),
}

/// Receiver half of one upstream completion call.
pub type CompletionStream = mpsc::Receiver<Result<CompletionChunk, CompletionError>>;

/// Remote completion service collaborator.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn stream_completion(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<CompletionStream, CompletionError>;
}

/// Live text stream returned to the caller. Dropping it cancels the
/// generation at the next chunk boundary; tool side effects that already
/// happened are not undone.
pub struct ChatStream {
    rx: mpsc::Receiver<String>,
}

impl ChatStream {
    /// Next chunk of text, or `None` when the stream has ended.
    pub async fn next_chunk(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Drain the stream into a single string.
    pub async fn collect_text(mut self) -> String {
        let mut out = String::new();
        while let Some(chunk) = self.next_chunk().await {
            out.push_str(&chunk);
        }
        out
    }
}

/// The chat proxy: completion client + tool surface over the
/// synchronization service.
pub struct ChatProxy {
    client: Arc<dyn CompletionClient>,
    service: Arc<SyncService>,
}

impl ChatProxy {
    pub fn new(client: Arc<dyn CompletionClient>, service: Arc<SyncService>) -> Self {
        Self { client, service }
    }

    /// Start a generation. Returns immediately with a live stream; the
    /// conversation is driven by a background task.
    pub fn stream_chat(&self, messages: Vec<ChatMessage>) -> ChatStream {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let client = self.client.clone();
        let service = self.service.clone();

        tokio::spawn(async move {
            drive_conversation(client, service, messages, tx).await;
        });

        ChatStream { rx }
    }
}

/// Run the completion loop: stream tokens out, execute requested tools,
/// feed their results back, repeat until the model finishes.
async fn drive_conversation(
    client: Arc<dyn CompletionClient>,
    service: Arc<SyncService>,
    mut messages: Vec<ChatMessage>,
    tx: mpsc::Sender<String>,
) {
    let specs = tools::specs();
    let mut produced_any = false;

    for _round in 0..=MAX_TOOL_ROUNDS {
        let mut stream = match client.stream_completion(&messages, &specs).await {
            Ok(stream) => stream,
            Err(e) => {
                // In-band failure text, normal stream termination.
                report_failure(&tx, produced_any, &e).await;
                return;
            }
        };

        let mut assistant_text = String::new();
        let mut tool_calls: Vec<ToolCall> = Vec::new();

        while let Some(chunk) = stream.recv().await {
            match chunk {
                Ok(CompletionChunk::Token(token)) => {
                    if tx.send(token.clone()).await.is_err() {
                        // Caller dropped the stream — stop generating.
                        return;
                    }
                    produced_any = true;
                    assistant_text.push_str(&token);
                }
                Ok(CompletionChunk::ToolCall(call)) => {
                    tool_calls.push(call);
                }
                Ok(CompletionChunk::Done) => break,
                Err(e) => {
                    report_failure(&tx, produced_any, &e).await;
                    return;
                }
            }
        }

        if tool_calls.is_empty() {
            // Final turn — nothing left to execute.
            return;
        }

        messages.push(ChatMessage::assistant(assistant_text, tool_calls.clone()));
        for call in tool_calls {
            let result = tools::dispatch(&service, &call.name, &call.arguments).await;
            messages.push(ChatMessage::tool_result(call.id, result));
        }
    }

    log::warn!("chat generation hit the tool round limit ({MAX_TOOL_ROUNDS})");
    let _ = tx
        .send("\n(Stopped: too many tool calls in one request.)".to_string())
        .await;
}

async fn report_failure(tx: &mpsc::Sender<String>, produced_any: bool, err: &CompletionError) {
    log::warn!("chat completion failed: {err}");
    let text = if produced_any {
        format!("\n(The assistant was interrupted: {err})")
    } else {
        format!("The assistant is unavailable right now: {err}")
    };
    let _ = tx.send(text).await;
}

// =============================================================================
// Tests
// =============================================================================
