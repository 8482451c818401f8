//! Terminate Tool - 실행 종료 도구
//!
//! 추론 서비스가 작업을 끝냈다고 판단할 때 호출합니다.
//! 종료 여부 판단은 Agent 쪽 special tool 목록으로 이루어지고,
//! 이 도구는 종료 상태를 관찰 결과로 남기기만 합니다.

use async_trait::async_trait;
use orca_foundation::{CapabilityResult, Error, Result, Tool, ToolContext};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

/// Terminate 도구 입력
#[derive(Debug, Deserialize)]
pub struct TerminateInput {
    pub status: TerminateStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminateStatus {
    Success,
    Failure,
}

impl TerminateStatus {
    fn as_str(&self) -> &'static str {
        match self {
            TerminateStatus::Success => "success",
            TerminateStatus::Failure => "failure",
        }
    }
}

/// Terminate 도구
pub struct TerminateTool;

impl TerminateTool {
    pub const NAME: &'static str = "terminate";

    pub fn new() -> Self {
        Self
    }
}

impl Default for TerminateTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for TerminateTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Terminate the interaction when the request is met or cannot proceed further. \
         Call this once all tasks are finished."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "status": {
                    "type": "string",
                    "description": "The finish status of the interaction.",
                    "enum": ["success", "failure"]
                }
            },
            "required": ["status"]
        })
    }

    async fn execute(&self, input: Value, context: &dyn ToolContext) -> Result<CapabilityResult> {
        let input: TerminateInput = serde_json::from_value(input)
            .map_err(|e| Error::capability_execution(Self::NAME, e.to_string()))?;

        info!(
            "Run {} terminated with status: {}",
            context.run_id(),
            input.status.as_str()
        );
        Ok(CapabilityResult::success(format!(
            "The interaction has been completed with status: {}",
            input.status.as_str()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::RunContext;

    #[test]
    fn test_schema() {
        let tool = TerminateTool::new();
        let schema = tool.schema();
        assert_eq!(schema["required"][0], "status");
        assert_eq!(schema["properties"]["status"]["enum"][1], "failure");
    }

    #[tokio::test]
    async fn test_execute() {
        let tool = TerminateTool::new();
        let ctx = RunContext::new("run-1", "/tmp");

        let result = tool
            .execute(json!({"status": "success"}), &ctx)
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.output.contains("status: success"));

        let err = tool.execute(json!({"status": "maybe"}), &ctx).await;
        assert!(err.is_err());
    }
}
