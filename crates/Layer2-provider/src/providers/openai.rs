//! OpenAI-compatible chat completion reasoner
//!
//! `POST {base_url}/chat/completions` 한 번이 한 스텝의 결정입니다.
//! OpenAI, Azure, LocalAI, vLLM 등 호환 API에 그대로 사용합니다.

use crate::{
    error::ProviderError,
    retry::{with_retry, RetryConfig},
};
use async_trait::async_trait;
use orca_foundation::{
    CapabilitySchema, Decision, DecisionRequest, Error, LlmConfig, Message, MessageRole, Reasoner,
    Result, TokenUsage, ToolCall,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// OpenAI-compatible reasoner
pub struct OpenAiReasoner {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
    max_tokens: u32,
    temperature: f32,
    retry: RetryConfig,
}

impl OpenAiReasoner {
    /// 설정으로 생성
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Provider(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            endpoint: completions_url(&config.base_url),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            retry: RetryConfig::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, request: &DecisionRequest<'_>) -> OpenAiRequest {
        let mut api_messages: Vec<OpenAiMessage> = Vec::with_capacity(request.messages.len() + 2);

        if let Some(system) = request.system_prompt {
            api_messages.push(OpenAiMessage::text("system", system));
        }

        for msg in request.messages {
            push_message(&mut api_messages, msg);
        }

        // 이번 호출에만 덧붙임
        if let Some(next) = request.next_step_prompt {
            api_messages.push(OpenAiMessage::text("user", next));
        }

        let tools: Vec<OpenAiTool> = request.capabilities.iter().map(OpenAiTool::from).collect();

        OpenAiRequest {
            model: self.model.clone(),
            messages: api_messages,
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
            tool_choice: if tools.is_empty() {
                None
            } else {
                Some("auto".to_string())
            },
            tools: if tools.is_empty() { None } else { Some(tools) },
        }
    }

    async fn complete_once(&self, body: &OpenAiRequest) -> std::result::Result<Decision, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::MissingApiKey);
        }

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(&e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(parse_error_response(status.as_u16(), &body));
        }

        let api_response: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedReply(e.to_string()))?;

        into_decision(api_response)
    }
}

#[async_trait]
impl Reasoner for OpenAiReasoner {
    fn name(&self) -> &str {
        &self.model
    }

    async fn decide(&self, request: DecisionRequest<'_>) -> Result<Decision> {
        let body = self.build_request(&request);
        debug!(
            "Requesting decision from {} ({} messages, {} capabilities)",
            self.model,
            body.messages.len(),
            request.capabilities.len()
        );

        let decision = with_retry(&self.retry, "chat completion", || self.complete_once(&body)).await?;
        Ok(decision)
    }
}

/// `{base_url}/chat/completions` (이미 붙어 있으면 그대로)
fn completions_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else {
        format!("{}/chat/completions", base)
    }
}

/// Parse error response from an OpenAI-compatible API
fn parse_error_response(status: u16, body: &str) -> ProviderError {
    if let Ok(error_response) = serde_json::from_str::<OpenAiErrorResponse>(body) {
        let error = error_response.error;
        let message = error.message;

        return match error.code.as_deref() {
            Some("rate_limit_exceeded") => ProviderError::from_status(429, message),
            Some("context_length_exceeded") => ProviderError::ContextTooLong(message),
            Some("invalid_api_key") => ProviderError::Unauthorized(message),
            // 쿼터 초과는 기다려도 풀리지 않음
            Some("insufficient_quota") => ProviderError::Rejected { status, message },
            _ => ProviderError::from_status(status, message),
        };
    }

    ProviderError::from_status(status, body)
}

fn into_decision(response: OpenAiResponse) -> std::result::Result<Decision, ProviderError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::MalformedReply("no choices in response".to_string()))?;

    let content = match choice.message.content {
        Some(OpenAiContent::Text(text)) => text,
        Some(OpenAiContent::Parts(parts)) => parts
            .into_iter()
            .filter_map(|p| match p {
                OpenAiContentPart::Text { text } => Some(text),
                OpenAiContentPart::ImageUrl { .. } => None,
            })
            .collect::<Vec<_>>()
            .join(""),
        None => String::new(),
    };

    let invocations = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| {
            let arguments = tc.function.arguments_parsed();
            ToolCall::new(tc.id, tc.function.name, arguments)
        })
        .collect();

    Ok(Decision {
        content,
        invocations,
        usage: response.usage.map(|u| TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        }),
    })
}

// ============================================================================
// Message conversion
// ============================================================================

fn push_message(out: &mut Vec<OpenAiMessage>, msg: &Message) {
    match msg.role {
        MessageRole::System => out.push(OpenAiMessage::text("system", &msg.content)),
        MessageRole::User => out.push(user_message(&msg.content, msg)),
        // 외부 상태 주입은 user 메시지로 전달
        MessageRole::Context => out.push(user_message(&msg.content, msg)),
        MessageRole::Assistant => {
            let tool_calls = msg.tool_calls.as_ref().map(|calls| {
                calls
                    .iter()
                    .map(|tc| OpenAiToolCall {
                        id: tc.id.clone(),
                        call_type: "function".to_string(),
                        function: OpenAiFunctionCall {
                            name: tc.name.clone(),
                            arguments: tc.arguments.to_string(),
                        },
                    })
                    .collect()
            });
            out.push(OpenAiMessage {
                role: "assistant".to_string(),
                content: if msg.content.is_empty() {
                    None
                } else {
                    Some(OpenAiContent::Text(msg.content.clone()))
                },
                tool_calls,
                tool_call_id: None,
            });
        }
        MessageRole::Tool => match &msg.invocation {
            Some(record) => {
                out.push(OpenAiMessage {
                    role: "tool".to_string(),
                    content: Some(OpenAiContent::Text(msg.content.clone())),
                    tool_calls: None,
                    tool_call_id: Some(record.call_id.clone()),
                });
                // tool 메시지는 이미지를 담을 수 없어서 뒤에 따로 붙임
                if msg.attachment.is_some() {
                    out.push(user_message(
                        &format!("Attachment from {}", record.name),
                        msg,
                    ));
                }
            }
            None => out.push(user_message(&msg.content, msg)),
        },
    }
}

fn user_message(text: &str, msg: &Message) -> OpenAiMessage {
    let content = match &msg.attachment {
        Some(attachment) => OpenAiContent::Parts(vec![
            OpenAiContentPart::Text {
                text: text.to_string(),
            },
            OpenAiContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: attachment.data_url(),
                },
            },
        ]),
        None => OpenAiContent::Text(text.to_string()),
    };
    OpenAiMessage {
        role: "user".to_string(),
        content: Some(content),
        tool_calls: None,
        tool_call_id: None,
    }
}

// ============================================================================
// OpenAI API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<OpenAiContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl OpenAiMessage {
    fn text(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: Some(OpenAiContent::Text(content.to_string())),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum OpenAiContent {
    Text(String),
    Parts(Vec<OpenAiContentPart>),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
enum OpenAiContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize, Deserialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: OpenAiFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

impl OpenAiFunctionCall {
    /// 빈 문자열은 `{}`; 파싱 불가한 값은 문자열로 남겨 스키마 검증에서 걸리게 함
    fn arguments_parsed(&self) -> Value {
        if self.arguments.trim().is_empty() {
            return Value::Object(Default::default());
        }
        serde_json::from_str(&self.arguments).unwrap_or_else(|e| {
            warn!("Unparsable arguments for '{}': {}", self.name, e);
            Value::String(self.arguments.clone())
        })
    }
}

#[derive(Debug, Serialize)]
struct OpenAiTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: OpenAiFunction,
}

#[derive(Debug, Serialize)]
struct OpenAiFunction {
    name: String,
    description: String,
    parameters: Value,
}

impl From<&CapabilitySchema> for OpenAiTool {
    fn from(schema: &CapabilitySchema) -> Self {
        OpenAiTool {
            tool_type: "function".to_string(),
            function: OpenAiFunction {
                name: schema.name.clone(),
                description: schema.description.clone(),
                parameters: schema.parameters.clone(),
            },
        }
    }
}

// Response types
#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

// Error types
#[derive(Debug, Deserialize)]
struct OpenAiErrorResponse {
    error: OpenAiError,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    message: String,
    #[serde(default)]
    code: Option<String>,
}
