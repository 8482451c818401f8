//! Dispatcher - 결정의 호출을 capability로 보냄
//!
//! 이름은 디스패치 시점에 registry에서 다시 조회합니다 (결정 시점 캐시 없음).
//! 실행 중 생긴 에러는 모두 관찰(observation)로 바뀌어 메모리에 남습니다.

use futures::future::join_all;
use orca_core::{CapabilityRegistry, Invoker, SessionManager};
use orca_foundation::{CapabilityResult, Message, Result, ToolCall, ToolContext};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// 잘린 관찰 끝에 붙는 표시
pub const TRUNCATION_MARKER: &str = "... (truncated)";

/// Capability dispatcher
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<CapabilityRegistry>,
    sessions: Arc<SessionManager>,
    /// 관찰 최대 길이 (문자 수, 0 = 제한 없음)
    max_observe: usize,
}

impl Dispatcher {
    pub fn new(registry: Arc<CapabilityRegistry>, sessions: Arc<SessionManager>) -> Self {
        Self {
            registry,
            sessions,
            max_observe: 0,
        }
    }

    pub fn with_max_observe(mut self, max_observe: usize) -> Self {
        self.max_observe = max_observe;
        self
    }

    /// 이름으로 capability 실행 (조회 → 인자 검증 → 로컬/원격 호출)
    pub async fn invoke(
        &self,
        name: &str,
        arguments: Value,
        context: &dyn ToolContext,
    ) -> Result<CapabilityResult> {
        let capability = self.registry.get(name)?;
        capability.validate(&arguments)?;

        match &capability.invoker {
            Invoker::Local(tool) => tool.execute(arguments, context).await,
            Invoker::Remote { .. } => self.sessions.call_capability(&capability, arguments).await,
        }
    }

    /// 한 호출을 실행하고 관찰 메시지로 변환
    pub async fn dispatch(&self, call: &ToolCall, context: &dyn ToolContext) -> Message {
        debug!("Dispatching {} ({})", call.name, call.id);

        let (text, is_error, attachment) =
            match self.invoke(&call.name, call.arguments.clone(), context).await {
                Ok(result) => {
                    let text = result.observation_text();
                    (text, !result.success, result.attachment)
                }
                Err(e) => {
                    if !e.is_recoverable() {
                        warn!("Capability '{}' failed: {}", call.name, e);
                    }
                    (format!("Error: {}", e), true, None)
                }
            };

        let mut message = Message::observation(call, truncate(&text, self.max_observe), is_error);
        if let Some(attachment) = attachment {
            message = message.with_attachment(attachment);
        }
        message
    }

    /// 모든 호출을 동시에 실행. 결과는 결정 순서대로
    pub async fn dispatch_parallel(
        &self,
        calls: &[ToolCall],
        context: &dyn ToolContext,
    ) -> Vec<Message> {
        join_all(calls.iter().map(|call| self.dispatch(call, context))).await
    }
}

/// `max` 문자 넘으면 char 경계에서 자르고 표시를 붙임
pub fn truncate(text: &str, max: usize) -> String {
    if max == 0 {
        return text.to_string();
    }
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use orca_core::RunContext;
    use orca_foundation::{Error, MessageRole, Tool};
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo text back"
        }

        fn schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"]
            })
        }

        async fn execute(&self, input: Value, _context: &dyn ToolContext) -> Result<CapabilityResult> {
            match input["text"].as_str() {
                Some("boom") => Err(Error::capability_execution("echo", "exploded")),
                Some(text) => Ok(CapabilityResult::success(text)),
                None => Ok(CapabilityResult::error("no text")),
            }
        }
    }

    fn dispatcher(max_observe: usize) -> Dispatcher {
        let registry = Arc::new(CapabilityRegistry::default());
        registry.register_local(Arc::new(Echo)).unwrap();
        let sessions = Arc::new(SessionManager::new(registry.clone()));
        Dispatcher::new(registry, sessions).with_max_observe(max_observe)
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 0), "hello");
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 5), "hello");
        assert_eq!(truncate("hello world", 5), "hello... (truncated)");
        // multi-byte
        assert_eq!(truncate("가나다라", 2), "가나... (truncated)");
    }

    #[tokio::test]
    async fn test_dispatch_success() {
        let ctx = RunContext::new("run", "/tmp");
        let call = ToolCall::new("c1", "echo", json!({"text": "hi"}));
        let msg = dispatcher(0).dispatch(&call, &ctx).await;

        assert_eq!(msg.role, MessageRole::Tool);
        assert_eq!(msg.content, "hi");
        assert!(!msg.is_error_observation());
        assert_eq!(msg.invocation.as_ref().unwrap().call_id, "c1");
    }

    #[tokio::test]
    async fn test_unknown_capability_becomes_observation() {
        let ctx = RunContext::new("run", "/tmp");
        let call = ToolCall::new("c1", "missing", json!({}));
        let msg = dispatcher(0).dispatch(&call, &ctx).await;

        assert!(msg.is_error_observation());
        assert!(msg.content.contains("Capability not found: missing"));
    }

    #[tokio::test]
    async fn test_invalid_arguments_are_not_executed() {
        let ctx = RunContext::new("run", "/tmp");
        let call = ToolCall::new("c1", "echo", json!({"text": 42}));
        let msg = dispatcher(0).dispatch(&call, &ctx).await;

        assert!(msg.is_error_observation());
        assert!(msg.content.contains("invalid arguments"));
    }

    #[tokio::test]
    async fn test_execution_errors() {
        let ctx = RunContext::new("run", "/tmp");
        let d = dispatcher(0);

        let msg = d
            .dispatch(&ToolCall::new("c1", "echo", json!({"text": "boom"})), &ctx)
            .await;
        assert!(msg.is_error_observation());
        assert!(msg.content.contains("exploded"));
    }

    #[tokio::test]
    async fn test_output_truncated() {
        let ctx = RunContext::new("run", "/tmp");
        let call = ToolCall::new("c1", "echo", json!({"text": "abcdefghij"}));
        let msg = dispatcher(4).dispatch(&call, &ctx).await;
        assert_eq!(msg.content, format!("abcd{}", TRUNCATION_MARKER));
    }

    #[tokio::test]
    async fn test_parallel_preserves_order() {
        let ctx = RunContext::new("run", "/tmp");
        let calls = vec![
            ToolCall::new("1", "echo", json!({"text": "first"})),
            ToolCall::new("2", "missing", json!({})),
            ToolCall::new("3", "echo", json!({"text": "third"})),
        ];
        let msgs = dispatcher(0).dispatch_parallel(&calls, &ctx).await;
        let ids: Vec<&str> = msgs
            .iter()
            .map(|m| m.invocation.as_ref().unwrap().call_id.as_str())
            .collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(msgs[2].content, "third");
    }
}
