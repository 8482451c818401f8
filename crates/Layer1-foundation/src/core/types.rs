//! Core Types - 공용 타입 정의
//!
//! 모든 레이어에서 공통으로 사용하는 타입들

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ============================================================================
// Message - 메모리에 쌓이는 메시지
// ============================================================================

/// Role of a message in memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    /// 추론 서비스의 결정 (decision)
    Assistant,
    /// Capability 실행 결과 (observation)
    Tool,
    /// Context augmentor가 주입한 합성 관찰
    Context,
}

/// A message in memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: Uuid,

    /// Role of this message
    pub role: MessageRole,

    /// Text content
    pub content: String,

    /// Capability invocations requested by a decision (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,

    /// Invocation record (if this is an observation message)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invocation: Option<InvocationRecord>,

    /// Optional binary attachment (base64)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,

    pub created_at: DateTime<Utc>,
}

impl Message {
    fn with_role(role: MessageRole, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            tool_calls: None,
            invocation: None,
            attachment: None,
            created_at: Utc::now(),
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::System, content.into())
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::User, content.into())
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::Assistant, content.into())
    }

    /// Create an assistant message with capability invocations
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::with_role(MessageRole::Assistant, content.into());
        if !tool_calls.is_empty() {
            msg.tool_calls = Some(tool_calls);
        }
        msg
    }

    /// Create an observation for a dispatched invocation
    pub fn observation(call: &ToolCall, content: impl Into<String>, is_error: bool) -> Self {
        let mut msg = Self::with_role(MessageRole::Tool, content.into());
        msg.invocation = Some(InvocationRecord {
            call_id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
            is_error,
        });
        msg
    }

    /// Create a synthetic context observation
    pub fn context(content: impl Into<String>, attachment: Option<Attachment>) -> Self {
        let mut msg = Self::with_role(MessageRole::Context, content.into());
        msg.attachment = attachment;
        msg
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    /// 이 메시지가 주어진 capability를 호출했는지 (결정 또는 관찰 기준)
    pub fn mentions_capability(&self, name: &str) -> bool {
        let requested = self
            .tool_calls
            .as_ref()
            .map(|calls| calls.iter().any(|c| c.name == name))
            .unwrap_or(false);
        let observed = self
            .invocation
            .as_ref()
            .map(|inv| inv.name == name)
            .unwrap_or(false);
        requested || observed
    }

    pub fn is_error_observation(&self) -> bool {
        self.invocation.as_ref().map(|i| i.is_error).unwrap_or(false)
    }
}

/// A capability invocation requested by a decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique ID for this call
    pub id: String,

    /// Name of the capability to call
    pub name: String,

    /// Arguments as JSON
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Structured record attached to an observation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationRecord {
    /// ID of the call this observation responds to
    pub call_id: String,

    /// Capability name
    pub name: String,

    /// Arguments that were dispatched
    pub arguments: Value,

    /// Whether the outcome was an error
    pub is_error: bool,
}

/// Binary attachment (e.g. a screenshot), base64 encoded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub mime_type: String,
    pub data: String,
}

impl Attachment {
    pub fn new(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// `data:` URL 형태
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

// ============================================================================
// Token Usage
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}
