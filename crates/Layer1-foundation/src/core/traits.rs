//! Core Traits - 핵심 인터페이스 정의
//!
//! 상위 레이어에서 구현하거나 주입하는 경계(boundary) trait들을 정의합니다.
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Layer4-CLI                                                 │
//! │  └── 설정 로드, 실행, 종료 처리                               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Layer3-Agent                                               │
//! │  ├── Execution Loop (Reasoner 호출 → dispatch)              │
//! │  └── ContextAugmentor 주입                                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Layer2-Core / Provider                                     │
//! │  ├── Capability Registry, Session Manager (MCP)             │
//! │  ├── Tool trait 구현 (terminate 등 로컬 도구)                │
//! │  └── Reasoner trait 구현 (OpenAI 호환)                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Layer1-Foundation (이 레이어)                              │
//! │  └── Trait 정의 (Tool, Reasoner, ContextAugmentor)          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use super::types::{Attachment, Message, TokenUsage, ToolCall};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

// ============================================================================
// Capability Result - 호출 결과 (text / attachment / error)
// ============================================================================

/// 도구 실행 결과
///
/// 로컬 도구와 원격 세션 도구 모두 이 타입으로 결과를 돌려줍니다.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapabilityResult {
    /// 성공 여부
    pub success: bool,
    /// 출력 내용
    pub output: String,
    /// 에러 메시지 (실패 시)
    pub error: Option<String>,
    /// 바이너리 첨부 (스크린샷 등)
    pub attachment: Option<Attachment>,
}

impl CapabilityResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            attachment: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(message.into()),
            attachment: None,
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    /// 관찰 메시지로 기록할 텍스트
    pub fn observation_text(&self) -> String {
        if self.success {
            if self.output.is_empty() {
                "Capability completed with no output".to_string()
            } else {
                self.output.clone()
            }
        } else {
            format!("Error: {}", self.error.as_deref().unwrap_or("Unknown error"))
        }
    }
}

// ============================================================================
// Tool Trait - 로컬 도구 인터페이스
// ============================================================================

/// 로컬(in-process) capability
#[async_trait]
pub trait Tool: Send + Sync {
    /// 도구 이름 (고유 식별자)
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 입력 JSON Schema
    fn schema(&self) -> Value;

    /// 도구 실행
    ///
    /// `input`은 dispatch 전에 schema 검증을 통과한 값입니다.
    async fn execute(&self, input: Value, context: &dyn ToolContext) -> Result<CapabilityResult>;
}

/// 도구 실행 컨텍스트
pub trait ToolContext: Send + Sync {
    /// 현재 실행(run) ID
    fn run_id(&self) -> &str;

    /// 작업 디렉토리
    fn working_dir(&self) -> &Path;
}

// ============================================================================
// Reasoner - 추론 서비스 경계
// ============================================================================

/// 추론 서비스에 전달되는 capability 설명
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySchema {
    pub name: String,
    pub description: String,
    /// JSON Schema for the arguments
    pub parameters: Value,
}

/// 한 스텝의 결정 요청
#[derive(Debug, Clone, Copy)]
pub struct DecisionRequest<'a> {
    /// 전체 메모리 (순서 보존)
    pub messages: &'a [Message],
    /// 현재 registry 스냅샷의 스키마 목록
    pub capabilities: &'a [CapabilitySchema],
    pub system_prompt: Option<&'a str>,
    /// 이번 호출에만 덧붙는 프롬프트 (메모리에 저장되지 않음)
    pub next_step_prompt: Option<&'a str>,
}

/// 추론 서비스의 결정
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decision {
    /// Free text content
    pub content: String,
    /// Requested invocations, in order
    pub invocations: Vec<ToolCall>,
    pub usage: Option<TokenUsage>,
}

impl Decision {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_call(mut self, call: ToolCall) -> Self {
        self.invocations.push(call);
        self
    }
}

/// 결정을 만들어내는 외부 서비스
#[async_trait]
pub trait Reasoner: Send + Sync {
    /// 표시용 이름 (로그)
    fn name(&self) -> &str;

    async fn decide(&self, request: DecisionRequest<'_>) -> Result<Decision>;
}

// ============================================================================
// Context Augmentor - 외부 상태 주입
// ============================================================================

/// 외부 상태 스냅샷
#[derive(Debug, Clone, PartialEq)]
pub struct ContextSnapshot {
    pub summary: String,
    pub attachment: Option<Attachment>,
}

/// 결정 요청 전에 한 번 호출되어 외부 상태를 설명
#[async_trait]
pub trait ContextAugmentor: Send + Sync {
    /// `None`이면 "unavailable"
    async fn describe(&self, recent: &[Message]) -> Option<ContextSnapshot>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_observation_text() {
        assert_eq!(CapabilityResult::success("ok").observation_text(), "ok");
        assert_eq!(
            CapabilityResult::error("bad input").observation_text(),
            "Error: bad input"
        );
        assert_eq!(
            CapabilityResult::success("").observation_text(),
            "Capability completed with no output"
        );
    }

    #[test]
    fn test_decision_builder() {
        let decision = Decision::text("go")
            .with_call(ToolCall::new("1", "a", Value::Null))
            .with_call(ToolCall::new("2", "b", Value::Null));
        let names: Vec<_> = decision.invocations.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
