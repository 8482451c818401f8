//! MCP Types - MCP 관련 타입 정의

use orca_foundation::{Attachment, CapabilityResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// MCP 서버에서 제공하는 도구 정보
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpTool {
    /// 도구 이름
    pub name: String,

    /// 도구 설명
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// 입력 스키마 (JSON Schema)
    #[serde(rename = "inputSchema", default = "empty_object_schema")]
    pub input_schema: Value,
}

fn empty_object_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

/// `tools/list` 응답
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ToolsListResult {
    #[serde(default)]
    pub tools: Vec<McpTool>,
}

/// MCP 도구 호출
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolCall {
    /// 도구 이름 (서버 쪽 원래 이름)
    pub name: String,

    /// 인자
    #[serde(default)]
    pub arguments: Value,
}

/// MCP 도구 실행 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolResult {
    /// 실패 여부
    #[serde(rename = "isError", default)]
    pub is_error: bool,

    /// 결과 콘텐츠
    #[serde(default)]
    pub content: Vec<McpContent>,
}

/// MCP 콘텐츠
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum McpContent {
    /// 텍스트 콘텐츠
    Text { text: String },

    /// 이미지 콘텐츠
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },

    /// 리소스 참조
    Resource { resource: Value },
}

impl McpToolResult {
    /// 성공 결과 생성
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            is_error: false,
            content: vec![McpContent::Text { text: text.into() }],
        }
    }

    /// 오류 결과 생성
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            is_error: true,
            content: vec![McpContent::Text { text: text.into() }],
        }
    }

    /// 텍스트 파트들을 줄바꿈으로 연결
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                McpContent::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// 첫 번째 이미지
    pub fn first_image(&self) -> Option<Attachment> {
        self.content.iter().find_map(|c| match c {
            McpContent::Image { data, mime_type } => Some(Attachment::new(mime_type, data)),
            _ => None,
        })
    }

    /// Capability 결과로 변환
    pub fn into_capability_result(self) -> CapabilityResult {
        let mut text = self.text();
        for content in &self.content {
            if let McpContent::Resource { resource } = content {
                if let Some(uri) = resource.get("uri").and_then(Value::as_str) {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(&format!("[resource: {}]", uri));
                }
            }
        }

        let mut result = if self.is_error {
            CapabilityResult::error(if text.is_empty() {
                "Tool reported an error".to_string()
            } else {
                text
            })
        } else {
            CapabilityResult::success(text)
        };
        result.attachment = self.first_image();
        result
    }
}
