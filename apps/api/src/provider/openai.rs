//! OpenAI-compatible REST backend.
//!
//! Stateless HTTP: the conversation lives in `OpenAiChat::messages` and is
//! replayed in full on every turn. Streaming replies arrive as `data: <json>`
//! frames terminated by `data: [DONE]`; we parse them by hand via `SseDecoder`.
use std::sync::Arc;

use async_stream::try_stream;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::models::interview::{InterviewTypeSet, SessionGoal, Transcript};
use crate::models::results::{Evaluation, Level, RawResumeMatch, ResumeMatch, RoadmapDraft};
use crate::provider::sse::{SseDecoder, SseFrame};
use crate::provider::{
    check_status, http_client, prompts, schema, strip_json_fences, AiProvider, ChatSession,
    FragmentStream, ProviderError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn text(role: Role, text: &str) -> Self {
        Self {
            role,
            content: MessageContent::Text(text.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "is_false")]
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

/// One streamed frame. Servers report mid-stream failures as an `error` object.
#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    #[serde(default)]
    message: String,
}

/// Outcome of decoding a single SSE frame.
#[derive(Debug, PartialEq)]
enum FrameEvent {
    Fragment(String),
    Skip,
    Done,
}

fn decode_frame(frame: SseFrame) -> Result<FrameEvent, ProviderError> {
    let data = match frame {
        SseFrame::Done => return Ok(FrameEvent::Done),
        SseFrame::Data(data) => data,
    };
    let chunk: ChatCompletionChunk = serde_json::from_str(&data)?;
    if let Some(err) = chunk.error {
        return Err(ProviderError::Api {
            status: 200,
            message: err.message,
        });
    }
    let text: String = chunk
        .choices
        .into_iter()
        .filter_map(|c| c.delta.content)
        .collect();
    Ok(if text.is_empty() {
        FrameEvent::Skip
    } else {
        FrameEvent::Fragment(text)
    })
}

struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiClient {
    async fn send(
        &self,
        body: &ChatCompletionRequest<'_>,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;
        check_status(response).await
    }

    /// Non-streaming JSON-mode call; returns the parsed payload.
    async fn complete_json<T: DeserializeOwned>(
        &self,
        user: MessageContent,
        schema: &Value,
    ) -> Result<T, ProviderError> {
        let messages = [
            ChatMessage::text(Role::System, &prompts::json_system_with_schema(schema)),
            ChatMessage {
                role: Role::User,
                content: user,
            },
        ];
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: &messages,
            stream: false,
            response_format: Some(ResponseFormat {
                kind: "json_object",
            }),
        };
        let raw = self.send(&body).await?.text().await?;
        let response: ChatCompletionResponse = serde_json::from_str(&raw)?;
        if let Some(usage) = &response.usage {
            debug!(
                "Completion succeeded: prompt_tokens={}, completion_tokens={}",
                usage.prompt_tokens, usage.completion_tokens
            );
        }
        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ProviderError::MalformedResponse("empty completion".to_string()))?;
        Ok(serde_json::from_str(strip_json_fences(&text))?)
    }
}

/// Replayable conversation: the system framing followed by committed turns.
pub struct OpenAiChat {
    client: Arc<OpenAiClient>,
    messages: Vec<ChatMessage>,
}

impl ChatSession for OpenAiChat {
    fn stream_next_turn<'a>(&'a mut self, message: &str) -> FragmentStream<'a> {
        Box::pin(stream_turn(self, message.to_string()))
    }

    fn interviewer_turns(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .count()
    }
}

fn stream_turn(
    chat: &mut OpenAiChat,
    message: String,
) -> impl Stream<Item = Result<String, ProviderError>> + Send + '_ {
    try_stream! {
        let response = {
            let mut messages = chat.messages.clone();
            messages.push(ChatMessage::text(Role::User, &message));
            let body = ChatCompletionRequest {
                model: &chat.client.model,
                messages: &messages,
                stream: true,
                response_format: None,
            };
            chat.client.send(&body).await?
        };

        let mut relayed = Box::pin(relay_reply(&mut chat.messages, message, response.bytes_stream()));
        while let Some(fragment) = relayed.next().await {
            yield fragment?;
        }
    }
}

/// Forwards the reply fragments of a streamed body and commits the turn to
/// `messages` once `[DONE]` has arrived. Any failure leaves `messages` untouched.
fn relay_reply<'a, S, E>(
    messages: &'a mut Vec<ChatMessage>,
    message: String,
    body: S,
) -> impl Stream<Item = Result<String, ProviderError>> + Send + 'a
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'a,
    E: Send + 'a,
    ProviderError: From<E>,
{
    try_stream! {
        let mut body = Box::pin(body);
        let mut decoder = SseDecoder::default();
        let mut reply = String::new();
        let mut done = false;
        while !done {
            let Some(chunk) = body.next().await else { break };
            let chunk = chunk?;
            for frame in decoder.push(&chunk) {
                match decode_frame(frame)? {
                    FrameEvent::Fragment(text) => {
                        reply.push_str(&text);
                        yield text;
                    }
                    FrameEvent::Skip => {}
                    FrameEvent::Done => {
                        done = true;
                        break;
                    }
                }
            }
        }
        if !done {
            let trailing = decoder.finish();
            done = matches!(trailing, Some(SseFrame::Done));
        }

        if !done {
            Err::<(), _>(ProviderError::MalformedResponse("stream ended before [DONE]".to_string()))?;
        }
        if reply.trim().is_empty() {
            Err::<(), _>(ProviderError::MalformedResponse("model returned an empty reply".to_string()))?;
        }
        debug!("Streamed turn complete ({} chars)", reply.len());
        messages.push(ChatMessage::text(Role::User, &message));
        messages.push(ChatMessage::text(Role::Assistant, &reply));
    }
}

pub struct OpenAiProvider {
    client: Arc<OpenAiClient>,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            client: Arc::new(OpenAiClient {
                http: http_client(),
                api_key,
                model,
                base_url,
            }),
        }
    }
}

/// User message carrying the prompt plus labelled candidate frames.
fn evaluation_content(transcript: &Transcript, goal: &SessionGoal) -> MessageContent {
    let prompt = prompts::evaluation_prompt(transcript, goal);
    if transcript.candidate_images().next().is_none() {
        return MessageContent::Text(prompt);
    }
    let mut parts = vec![ContentPart::Text { text: prompt }];
    for (line, image) in transcript.candidate_images() {
        parts.push(ContentPart::Text {
            text: prompts::frame_label(line),
        });
        parts.push(ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: image.data_url(),
            },
        });
    }
    MessageContent::Parts(parts)
}

#[async_trait]
impl AiProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn start_chat(&self, goal: &SessionGoal, types: &InterviewTypeSet) -> Box<dyn ChatSession> {
        Box::new(OpenAiChat {
            client: self.client.clone(),
            messages: vec![ChatMessage::text(
                Role::System,
                &prompts::interviewer_system(goal, types),
            )],
        })
    }

    async fn generate_evaluation(
        &self,
        transcript: &Transcript,
        goal: &SessionGoal,
    ) -> Result<Evaluation, ProviderError> {
        let evaluation: Evaluation = self
            .client
            .complete_json(evaluation_content(transcript, goal), &schema::evaluation())
            .await?;
        schema::check_evaluation(evaluation)
    }

    async fn generate_roadmap(
        &self,
        level: Level,
        goal: &SessionGoal,
    ) -> Result<Vec<RoadmapDraft>, ProviderError> {
        let content = MessageContent::Text(prompts::roadmap_prompt(level, goal));
        let envelope: schema::RoadmapEnvelope = self
            .client
            .complete_json(content, &schema::roadmap())
            .await?;
        schema::check_roadmap(envelope.items)
    }

    async fn score_resume(
        &self,
        resume_text: &str,
        job_description: &str,
    ) -> Result<ResumeMatch, ProviderError> {
        let content = MessageContent::Text(prompts::resume_prompt(resume_text, job_description));
        let raw: RawResumeMatch = self
            .client
            .complete_json(content, &schema::resume_match())
            .await?;
        Ok(raw.into())
    }
}
