//! Gemini backend: managed chat sessions and native structured output.
//!
//! `GeminiChat` plays the role of the SDK chat object: it owns the system
//! instruction and the committed history, and every turn goes out as a
//! `streamGenerateContent` call. Structured calls use `responseMimeType`
//! plus `responseSchema`, so the model is constrained server-side.
use std::sync::Arc;

use async_stream::try_stream;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::models::interview::{InterviewTypeSet, SessionGoal, StillImage, Transcript};
use crate::models::results::{Evaluation, Level, RawResumeMatch, ResumeMatch, RoadmapDraft};
use crate::provider::sse::{SseDecoder, SseFrame};
use crate::provider::{
    check_status, http_client, prompts, schema, AiProvider, ChatSession, FragmentStream,
    ProviderError,
};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    fn new(role: &str, parts: Vec<Part>) -> Self {
        Self {
            role: Some(role.to_string()),
            parts,
        }
    }

    fn text(role: &str, text: &str) -> Self {
        Self::new(role, vec![Part::text(text)])
    }

    fn system(text: &str) -> Self {
        Self {
            role: None,
            parts: vec![Part::text(text)],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

impl Part {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            inline_data: None,
        }
    }

    fn image(image: &StillImage) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: image.mime_type.clone(),
                data: image.data_base64.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<&'a Content>,
    contents: &'a [Content],
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    /// Set instead of candidates when the server fails mid-stream.
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate's parts.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    fn finish_reason(&self) -> Option<&str> {
        self.candidates
            .first()
            .and_then(|c| c.finish_reason.as_deref())
    }
}

/// Transport shared by the provider and every chat it opens.
struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    fn endpoint(&self, method: &str) -> String {
        format!("{GEMINI_API_BASE}/models/{}:{method}", self.model)
    }

    async fn post(
        &self,
        url: String,
        body: &GenerateContentRequest<'_>,
    ) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;
        check_status(response).await
    }

    async fn generate(
        &self,
        body: &GenerateContentRequest<'_>,
    ) -> Result<GenerateContentResponse, ProviderError> {
        let response = self.post(self.endpoint("generateContent"), body).await?;
        let raw = response.text().await?;
        let parsed: GenerateContentResponse = serde_json::from_str(&raw)?;
        if let Some(usage) = &parsed.usage_metadata {
            debug!(
                "Gemini call succeeded: prompt_tokens={}, output_tokens={}",
                usage.prompt_token_count, usage.candidates_token_count
            );
        }
        Ok(parsed)
    }

    async fn stream(
        &self,
        body: &GenerateContentRequest<'_>,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}?alt=sse", self.endpoint("streamGenerateContent"));
        self.post(url, body).await
    }

    /// One-shot structured call constrained by `schema`.
    async fn generate_json<T: DeserializeOwned>(
        &self,
        parts: Vec<Part>,
        schema: &Value,
    ) -> Result<T, ProviderError> {
        let contents = [Content::new("user", parts)];
        let body = GenerateContentRequest {
            system_instruction: None,
            contents: &contents,
            generation_config: Some(GenerationConfig {
                response_mime_type: "application/json",
                response_schema: schema::to_gemini(schema),
            }),
        };
        let response = self.generate(&body).await?;
        let text = response.text();
        if text.trim().is_empty() {
            return Err(ProviderError::MalformedResponse(format!(
                "empty structured response (finish reason: {})",
                response.finish_reason().unwrap_or("unknown")
            )));
        }
        Ok(serde_json::from_str(text.trim())?)
    }
}

/// What one streamed frame contributes to the reply.
#[derive(Debug, Default, PartialEq)]
struct StreamedPart {
    text: Option<String>,
    /// The frame carried a finish reason: nothing more is coming.
    finished: bool,
}

fn fragment_from(frame: SseFrame) -> Result<StreamedPart, ProviderError> {
    let data = match frame {
        SseFrame::Done => {
            return Ok(StreamedPart {
                text: None,
                finished: true,
            })
        }
        SseFrame::Data(data) => data,
    };
    let chunk: GenerateContentResponse = serde_json::from_str(&data)?;
    if let Some(err) = chunk.error {
        return Err(ProviderError::Api {
            status: err.code,
            message: err.message,
        });
    }
    let text = chunk.text();
    Ok(StreamedPart {
        finished: chunk.finish_reason().is_some(),
        text: (!text.is_empty()).then_some(text),
    })
}

/// Managed conversational session: system instruction plus committed history.
pub struct GeminiChat {
    client: Arc<GeminiClient>,
    system_instruction: Content,
    history: Vec<Content>,
}

impl ChatSession for GeminiChat {
    fn stream_next_turn<'a>(&'a mut self, message: &str) -> FragmentStream<'a> {
        Box::pin(send_message_stream(self, message.to_string()))
    }

    fn interviewer_turns(&self) -> usize {
        self.history
            .iter()
            .filter(|c| c.role.as_deref() == Some("model"))
            .count()
    }
}

fn send_message_stream(
    chat: &mut GeminiChat,
    message: String,
) -> impl Stream<Item = Result<String, ProviderError>> + Send + '_ {
    try_stream! {
        let response = {
            let mut contents = chat.history.clone();
            contents.push(Content::text("user", &message));
            let body = GenerateContentRequest {
                system_instruction: Some(&chat.system_instruction),
                contents: &contents,
                generation_config: None,
            };
            chat.client.stream(&body).await?
        };

        let mut relayed = Box::pin(relay_reply(&mut chat.history, message, response.bytes_stream()));
        while let Some(fragment) = relayed.next().await {
            yield fragment?;
        }
    }
}

/// Forwards the reply fragments of a streamed body and commits the turn to
/// `history` once a frame with a finish reason has arrived. Any failure
/// leaves `history` untouched.
fn relay_reply<'a, S, E>(
    history: &'a mut Vec<Content>,
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
        let mut finished = false;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            for frame in decoder.push(&chunk) {
                let part = fragment_from(frame)?;
                finished |= part.finished;
                if let Some(text) = part.text {
                    reply.push_str(&text);
                    yield text;
                }
            }
        }
        if let Some(frame) = decoder.finish() {
            let part = fragment_from(frame)?;
            finished |= part.finished;
            if let Some(text) = part.text {
                reply.push_str(&text);
                yield text;
            }
        }

        if !finished {
            Err::<(), _>(ProviderError::MalformedResponse("stream ended without a finish reason".to_string()))?;
        }
        if reply.trim().is_empty() {
            Err::<(), _>(ProviderError::MalformedResponse("model returned an empty reply".to_string()))?;
        }
        debug!("Gemini turn complete ({} chars)", reply.len());
        history.push(Content::text("user", &message));
        history.push(Content::text("model", &reply));
    }
}

pub struct GeminiProvider {
    client: Arc<GeminiClient>,
}

impl GeminiProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Arc::new(GeminiClient {
                http: http_client(),
                api_key,
                model,
            }),
        }
    }
}

#[async_trait]
impl AiProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn start_chat(&self, goal: &SessionGoal, types: &InterviewTypeSet) -> Box<dyn ChatSession> {
        Box::new(GeminiChat {
            client: self.client.clone(),
            system_instruction: Content::system(&prompts::interviewer_system(goal, types)),
            history: Vec::new(),
        })
    }

    async fn generate_evaluation(
        &self,
        transcript: &Transcript,
        goal: &SessionGoal,
    ) -> Result<Evaluation, ProviderError> {
        let mut parts = vec![Part::text(&prompts::evaluation_prompt(transcript, goal))];
        for (line, image) in transcript.candidate_images() {
            parts.push(Part::text(&prompts::frame_label(line)));
            parts.push(Part::image(image));
        }
        let evaluation: Evaluation = self
            .client
            .generate_json(parts, &schema::evaluation())
            .await?;
        schema::check_evaluation(evaluation)
    }

    async fn generate_roadmap(
        &self,
        level: Level,
        goal: &SessionGoal,
    ) -> Result<Vec<RoadmapDraft>, ProviderError> {
        let parts = vec![Part::text(&prompts::roadmap_prompt(level, goal))];
        let envelope: schema::RoadmapEnvelope = self
            .client
            .generate_json(parts, &schema::roadmap())
            .await?;
        schema::check_roadmap(envelope.items)
    }

    async fn score_resume(
        &self,
        resume_text: &str,
        job_description: &str,
    ) -> Result<ResumeMatch, ProviderError> {
        let parts = vec![Part::text(&prompts::resume_prompt(
            resume_text,
            job_description,
        ))];
        let raw: RawResumeMatch = self
            .client
            .generate_json(parts, &schema::resume_match())
            .await?;
        Ok(raw.into())
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;

    #[test]
    fn test_stream_frame_text_is_extracted() {
        let frame = SseFrame::Data(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Tell me "},{"text":"about SQL."}]}}]}"#
                .to_string(),
        );
        let part = fragment_from(frame).unwrap();
        assert_eq!(part.text.as_deref(), Some("Tell me about SQL."));
        assert!(!part.finished);
    }

    #[test]
    fn test_frame_without_text_yields_nothing() {
        let frame = SseFrame::Data(
            r#"{"candidates":[{"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":12}}"#
                .to_string(),
        );
        assert_eq!(
            fragment_from(frame).unwrap(),
            StreamedPart {
                text: None,
                finished: true
            }
        );
    }

    #[test]
    fn test_error_frame_is_api_error() {
        let frame = SseFrame::Data(
            r#"{"error":{"code":503,"message":"The model is overloaded.","status":"UNAVAILABLE"}}"#
                .to_string(),
        );
        assert!(matches!(
            fragment_from(frame),
            Err(ProviderError::Api { status: 503, message }) if message == "The model is overloaded."
        ));
    }

    #[test]
    fn test_malformed_frame_is_malformed_response() {
        let frame = SseFrame::Data("{not json".to_string());
        assert!(matches!(
            fragment_from(frame),
            Err(ProviderError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_request_serializes_camel_case_with_inline_image() {
        let image = StillImage {
            mime_type: "image/jpeg".to_string(),
            data_base64: "QUJD".to_string(),
        };
        let system = Content::system("be nice");
        let contents = [Content::new("user", vec![Part::text("hi"), Part::image(&image)])];
        let body = GenerateContentRequest {
            system_instruction: Some(&system),
            contents: &contents,
            generation_config: Some(GenerationConfig {
                response_mime_type: "application/json",
                response_schema: serde_json::json!({"type": "OBJECT"}),
            }),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "be nice");
        assert!(json["systemInstruction"].get("role").is_none());
        assert_eq!(json["contents"][0]["parts"][1]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(json["generationConfig"]["responseMimeType"], "application/json");
    }

    #[test]
    fn test_new_chat_has_no_interviewer_turns() {
        let provider = GeminiProvider::new("key".to_string(), "gemini-2.5-flash".to_string());
        let goal = SessionGoal::new("Ada", "Backend Engineer");
        let types = InterviewTypeSet::new([crate::models::interview::InterviewType::Technical])
            .unwrap();
        let chat = provider.start_chat(&goal, &types);
        assert_eq!(chat.interviewer_turns(), 0);
    }

    fn test_chat() -> GeminiChat {
        GeminiChat {
            client: Arc::new(GeminiClient {
                http: reqwest::Client::new(),
                api_key: "key".to_string(),
                model: "gemini-2.5-flash".to_string(),
            }),
            system_instruction: Content::system("You are interviewing for Backend Engineer."),
            history: Vec::new(),
        }
    }

    fn body(
        chunks: Vec<Result<&'static str, ProviderError>>,
    ) -> impl Stream<Item = Result<Bytes, ProviderError>> {
        stream::iter(
            chunks
                .into_iter()
                .map(|c| c.map(|s| Bytes::from_static(s.as_bytes()))),
        )
    }

    const OPENING: &str = concat!(
        "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"Tell me about \"}]}}]}\r\n\r\n",
        "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"a system you built.\"}]},\"finishReason\":\"STOP\"}]}\r\n\r\n",
    );

    #[tokio::test]
    async fn test_drained_turn_is_committed_once() {
        let mut chat = test_chat();
        let (first, rest) = OPENING.split_at(40);
        let fragments: Vec<String> = relay_reply(
            &mut chat.history,
            "Start the interview.".to_string(),
            body(vec![Ok(first), Ok(rest)]),
        )
        .map(|f| f.unwrap())
        .collect()
        .await;

        assert_eq!(fragments.concat(), "Tell me about a system you built.");
        assert_eq!(chat.interviewer_turns(), 1);
        assert_eq!(chat.history[0], Content::text("user", "Start the interview."));
        assert_eq!(
            chat.history[1],
            Content::text("model", "Tell me about a system you built.")
        );
    }

    #[tokio::test]
    async fn test_error_frame_after_text_is_not_committed() {
        let mut chat = test_chat();
        let results: Vec<_> = relay_reply(
            &mut chat.history,
            "Start the interview.".to_string(),
            body(vec![
                Ok("data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Tell me\"}]}}]}\n\n"),
                Ok("data: {\"error\":{\"code\":503,\"message\":\"overloaded\"}}\n\n"),
            ]),
        )
        .collect()
        .await;

        assert_eq!(results.len(), 2);
        assert!(matches!(results[1], Err(ProviderError::Api { status: 503, .. })));
        assert!(chat.history.is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_mid_stream_is_not_committed() {
        let mut chat = test_chat();
        let results: Vec<_> = relay_reply(
            &mut chat.history,
            "Start the interview.".to_string(),
            body(vec![
                Ok("data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Tell me\"}]}}]}\n\n"),
                Err(ProviderError::Api {
                    status: 502,
                    message: "connection reset".to_string(),
                }),
            ]),
        )
        .collect()
        .await;

        assert!(results.last().unwrap().is_err());
        assert_eq!(chat.interviewer_turns(), 0);
    }

    #[tokio::test]
    async fn test_stream_closed_without_finish_reason_is_malformed() {
        let mut chat = test_chat();
        let results: Vec<_> = relay_reply(
            &mut chat.history,
            "Start the interview.".to_string(),
            body(vec![Ok(
                "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Tell me\"}]}}]}\n\n",
            )]),
        )
        .collect()
        .await;

        assert!(matches!(
            results.last(),
            Some(Err(ProviderError::MalformedResponse(_)))
        ));
        assert!(chat.history.is_empty());
    }
}
