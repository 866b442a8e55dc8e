//! Streaming HTTP completion client.
//!
//! Talks to an OpenAI-compatible `/chat/completions` endpoint with
//! `stream: true` and translates the SSE frames into [`CompletionChunk`]s.
//! Tool-call argument fragments arrive spread across many frames and are
//! accumulated per index until the stream ends.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::{
    ChatMessage, ChatRole, CompletionChunk, CompletionClient, CompletionError, CompletionStream,
    ToolCall, ToolSpec,
};

pub struct HttpCompletionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HttpCompletionClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn request_body(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Value {
        let messages: Vec<Value> = messages.iter().map(wire_message).collect();
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
        });
        if !tools.is_empty() {
            let tools: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }
        body
    }
}

fn role_str(role: ChatRole) -> &'static str {
    match role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
        ChatRole::Tool => "tool",
    }
}

fn wire_message(message: &ChatMessage) -> Value {
    let mut wire = json!({
        "role": role_str(message.role),
        "content": message.content,
    });
    if !message.tool_calls.is_empty() {
        let calls: Vec<Value> = message
            .tool_calls
            .iter()
            .map(|call| {
                json!({
                    "id": call.id,
                    "type": "function",
                    "function": { "name": call.name, "arguments": call.arguments }
                })
            })
            .collect();
        wire["tool_calls"] = Value::Array(calls);
    }
    if let Some(ref id) = message.tool_call_id {
        wire["tool_call_id"] = Value::String(id.clone());
    }
    wire
}

/// Partially-accumulated tool call, keyed by stream index.
#[derive(Default)]
struct PendingCall {
    id: String,
    name: String,
    arguments: String,
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn stream_completion(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<CompletionStream, CompletionError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(messages, tools))
            .send()
            .await
            .map_err(|e| CompletionError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CompletionError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            pump_sse(resp, tx).await;
        });
        Ok(rx)
    }
}

/// Read the SSE body chunk by chunk, emitting completion chunks as frames
/// complete. Stops silently when the receiver is dropped.
async fn pump_sse(
    mut resp: reqwest::Response,
    tx: mpsc::Sender<Result<CompletionChunk, CompletionError>>,
) {
    let mut buffer = String::new();
    let mut pending: BTreeMap<u64, PendingCall> = BTreeMap::new();

    loop {
        let chunk = match resp.chunk().await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => break,
            Err(e) => {
                let _ = tx
                    .send(Err(CompletionError::Transport(e.to_string())))
                    .await;
                return;
            }
        };

        buffer.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(pos) = buffer.find('\n') {
            let line = buffer[..pos].trim().to_string();
            buffer.drain(..=pos);

            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();

            if data == "[DONE]" {
                flush_tool_calls(&tx, &mut pending).await;
                let _ = tx.send(Ok(CompletionChunk::Done)).await;
                return;
            }

            let Ok(frame) = serde_json::from_str::<Value>(data) else {
                log::warn!("unparseable SSE frame: {data}");
                continue;
            };

            let delta = &frame["choices"][0]["delta"];

            if let Some(token) = delta["content"].as_str() {
                if !token.is_empty() && tx.send(Ok(CompletionChunk::Token(token.to_string()))).await.is_err()
                {
                    return;
                }
            }

            if let Some(calls) = delta["tool_calls"].as_array() {
                for call in calls {
                    let index = call["index"].as_u64().unwrap_or(0);
                    let entry = pending.entry(index).or_default();
                    if let Some(id) = call["id"].as_str() {
                        entry.id = id.to_string();
                    }
                    if let Some(name) = call["function"]["name"].as_str() {
                        entry.name.push_str(name);
                    }
                    if let Some(fragment) = call["function"]["arguments"].as_str() {
                        entry.arguments.push_str(fragment);
                    }
                }
            }
        }
    }

    // Stream ended without an explicit [DONE] — treat as completion.
    flush_tool_calls(&tx, &mut pending).await;
    let _ = tx.send(Ok(CompletionChunk::Done)).await;
}

async fn flush_tool_calls(
    tx: &mpsc::Sender<Result<CompletionChunk, CompletionError>>,
    pending: &mut BTreeMap<u64, PendingCall>,
) {
    for (_, call) in std::mem::take(pending) {
        if call.name.is_empty() {
            continue;
        }
        let _ = tx
            .send(Ok(CompletionChunk::ToolCall(ToolCall {
                id: call.id,
                name: call.name,
                arguments: call.arguments,
            })))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let client = HttpCompletionClient::new("https://api.example.com/v1", "sk-test", "gpt-test");
        let messages = vec![
            ChatMessage::system("You are LifeOS."),
            ChatMessage::user("hello"),
        ];
        let body = client.request_body(&messages, &crate::chat::tools::specs());

        assert_eq!(body["model"], "gpt-test");
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "getCalendarEvents");
    }

    #[test]
    fn test_wire_message_for_tool_turns() {
        let assistant = ChatMessage::assistant(
            "",
            vec![ToolCall {
                id: "call-1".to_string(),
                name: "getCalendarEvents".to_string(),
                arguments: "{}".to_string(),
            }],
        );
        let wire = wire_message(&assistant);
        assert_eq!(wire["tool_calls"][0]["id"], "call-1");
        assert_eq!(wire["tool_calls"][0]["function"]["name"], "getCalendarEvents");

        let result = ChatMessage::tool_result("call-1", "No events found.");
        let wire = wire_message(&result);
        assert_eq!(wire["role"], "tool");
        assert_eq!(wire["tool_call_id"], "call-1");
        assert_eq!(wire["content"], "No events found.");
    }
}
