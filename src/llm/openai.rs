//! OpenAI-compatible chat completions backend
//!
//! Works against any `/chat/completions` endpoint that speaks the OpenAI
//! streaming protocol (`data: {json}` lines terminated by `data: [DONE]`).

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};

use super::model::{ChatModel, ModelError, ModelResponse};
use crate::agents::messages::{Message, Role, ToolCall};
use crate::config::LlmSettings;
use crate::tools::ToolSchema;

/// Streaming chat completions client
pub struct OpenAiCompatModel {
    client: reqwest::Client,
    settings: LlmSettings,
}

impl OpenAiCompatModel {
    pub fn new(settings: LlmSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.settings.base_url.trim_end_matches('/'))
    }

    fn request_body(&self, messages: &[Message], tools: &[ToolSchema]) -> Value {
        let mut body = json!({
            "model": self.settings.model,
            "temperature": self.settings.temperature,
            "stream": true,
            "messages": messages.iter().map(wire_message).collect::<Vec<_>>(),
        });

        if !tools.is_empty() {
            body["tools"] = tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters,
                        }
                    })
                })
                .collect();
        }

        body
    }
}

fn wire_message(message: &Message) -> Value {
    let mut wire = json!({
        "role": message.role().to_string(),
        "content": message.content(),
    });

    match message.role() {
        Role::Tool => {
            wire["tool_call_id"] = json!(message.tool_call_id().unwrap_or_default());
        }
        Role::User | Role::Assistant => {
            if let Some(author) = message.author() {
                wire["name"] = json!(author);
            }
        }
        Role::System => {}
    }

    if !message.tool_calls().is_empty() {
        wire["tool_calls"] = message
            .tool_calls()
            .iter()
            .map(|call| {
                json!({
                    "id": call.call_id,
                    "type": "function",
                    "function": {
                        "name": call.name,
                        "arguments": call.arguments.to_string(),
                    }
                })
            })
            .collect();
    }

    wire
}

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Folds streamed deltas into a complete response
#[derive(Debug, Default)]
struct Accumulator {
    content: String,
    /// Partial calls keyed by the backend's `index`
    tool_calls: BTreeMap<usize, PartialToolCall>,
}

impl Accumulator {
    /// Applies one `data:` payload; returns the text delta it carried
    fn apply(&mut self, payload: ChunkPayload) -> Option<String> {
        let mut text = None;

        for choice in payload.choices {
            if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                self.content.push_str(&content);
                text = Some(content);
            }

            for delta in choice.delta.tool_calls {
                let call = self.tool_calls.entry(delta.index).or_default();
                if let Some(id) = delta.id {
                    call.id = id;
                }
                if let Some(function) = delta.function {
                    if let Some(name) = function.name {
                        call.name.push_str(&name);
                    }
                    if let Some(arguments) = function.arguments {
                        call.arguments.push_str(&arguments);
                    }
                }
            }
        }

        text
    }

    fn finish(self) -> Result<ModelResponse, ModelError> {
        let tool_calls = self
            .tool_calls
            .into_values()
            .filter(|call| !call.name.is_empty())
            .map(|call| -> Result<ToolCall, ModelError> {
                let arguments = if call.arguments.trim().is_empty() {
                    json!({})
                } else {
                    serde_json::from_str(&call.arguments)?
                };
                Ok(ToolCall::new(call.id, call.name, arguments))
            })
            .collect::<Result<Vec<_>, ModelError>>()?;

        Ok(ModelResponse {
            content: self.content,
            tool_calls,
        })
    }
}

/// Outcome of one complete line of the event stream
enum Line {
    Payload(ChunkPayload),
    Done,
    Skip,
}

fn parse_line(line: &[u8]) -> Result<Line, ModelError> {
    let line = String::from_utf8_lossy(line);
    let Some(data) = line.trim().strip_prefix("data:") else {
        return Ok(Line::Skip);
    };

    match data.trim() {
        "" => Ok(Line::Skip),
        "[DONE]" => Ok(Line::Done),
        data => Ok(Line::Payload(serde_json::from_str(data)?)),
    }
}

impl Accumulator {
    /// Applies one line; returns true once the stream signalled `[DONE]`
    fn feed_line(
        &mut self,
        line: &[u8],
        on_token: &mut (dyn for<'t> FnMut(&'t str) + Send),
    ) -> Result<bool, ModelError> {
        match parse_line(line)? {
            Line::Payload(payload) => {
                if let Some(text) = self.apply(payload) {
                    on_token(&text);
                }
                Ok(false)
            }
            Line::Done => Ok(true),
            Line::Skip => Ok(false),
        }
    }
}

/// Reads an event stream body to the end or to `[DONE]`; a final line
/// without a trailing newline is still parsed
async fn read_stream<S, B>(
    mut stream: S,
    on_token: &mut (dyn for<'t> FnMut(&'t str) + Send),
) -> Result<Accumulator, ModelError>
where
    S: Stream<Item = Result<B, reqwest::Error>> + Unpin,
    B: AsRef<[u8]>,
{
    let mut accumulator = Accumulator::default();
    let mut pending: Vec<u8> = Vec::new();

    while let Some(chunk) = stream.next().await {
        pending.extend_from_slice(chunk?.as_ref());

        while let Some(newline) = pending.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = pending.drain(..=newline).collect();
            if accumulator.feed_line(&line, on_token)? {
                return Ok(accumulator);
            }
        }
    }

    if !pending.is_empty() {
        accumulator.feed_line(&pending, on_token)?;
    }
    Ok(accumulator)
}

#[async_trait]
impl ChatModel for OpenAiCompatModel {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        on_token: &mut (dyn for<'t> FnMut(&'t str) + Send),
    ) -> Result<ModelResponse, ModelError> {
        let mut request = self
            .client
            .post(self.endpoint())
            .json(&self.request_body(messages, tools));
        if let Some(api_key) = &self.settings.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let accumulator = read_stream(response.bytes_stream(), on_token).await?;

        tracing::debug!(
            model = %self.settings.model,
            chars = accumulator.content.len(),
            tool_calls = accumulator.tool_calls.len(),
            "Model stream finished"
        );

        accumulator.finish()
    }
}
