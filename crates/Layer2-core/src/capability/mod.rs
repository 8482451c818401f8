//! Capability - 호출 가능한 동작의 정의
//!
//! 로컬 도구(`Tool`)와 세션(MCP 서버)이 제공하는 도구를 같은 형태로 표현합니다.
//! 등록된 뒤에는 변경되지 않으며, 같은 이름으로 다시 등록하면 통째로 교체됩니다.

mod registry;

pub use registry::{CapabilityRegistry, RegistryEvent};

use crate::mcp::McpTool;
use orca_foundation::{validate_arguments, CapabilitySchema, Error, Result, Tool};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Capability 소유자
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Owner {
    /// 프로세스 내부 도구
    Local,
    /// 세션 ID
    Session(String),
}

impl Owner {
    pub fn session(id: impl Into<String>) -> Self {
        Owner::Session(id.into())
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            Owner::Local => None,
            Owner::Session(id) => Some(id),
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::Local => write!(f, "local"),
            Owner::Session(id) => write!(f, "session:{}", id),
        }
    }
}

/// 호출 방법
#[derive(Clone)]
pub enum Invoker {
    /// `Tool::execute`로 직접 실행
    Local(Arc<dyn Tool>),
    /// Session Manager를 통해 원격 호출 (서버 쪽 이름)
    Remote { remote_name: String },
}

impl fmt::Debug for Invoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invoker::Local(tool) => f.debug_tuple("Local").field(&tool.name()).finish(),
            Invoker::Remote { remote_name } => f
                .debug_struct("Remote")
                .field("remote_name", remote_name)
                .finish(),
        }
    }
}

/// 등록된 capability
#[derive(Debug, Clone)]
pub struct Capability {
    /// registry 안에서 고유한 이름
    pub name: String,
    pub description: String,
    /// 인자 JSON Schema
    pub input_schema: Value,
    pub owner: Owner,
    pub invoker: Invoker,
}

impl Capability {
    /// 로컬 도구로부터 생성
    pub fn local(tool: Arc<dyn Tool>) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            input_schema: tool.schema(),
            owner: Owner::Local,
            invoker: Invoker::Local(tool),
        }
    }

    /// MCP 서버 도구로부터 생성 (`prefix`가 있으면 이름 앞에 붙임)
    pub fn remote(session: &str, tool: &McpTool, prefix: Option<&str>) -> Self {
        Self {
            name: format!("{}{}", prefix.unwrap_or(""), tool.name),
            description: tool.description.clone().unwrap_or_default(),
            input_schema: tool.input_schema.clone(),
            owner: Owner::session(session),
            invoker: Invoker::Remote {
                remote_name: tool.name.clone(),
            },
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self.owner, Owner::Local)
    }

    /// 추론 서비스에 전달할 스키마
    pub fn schema(&self) -> CapabilitySchema {
        CapabilitySchema {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.input_schema.clone(),
        }
    }

    /// 인자 검증 (스키마 불일치는 실행 에러)
    pub fn validate(&self, args: &Value) -> Result<()> {
        validate_arguments(&self.input_schema, args).map_err(|errors| {
            Error::capability_execution(
                &self.name,
                format!("invalid arguments: {}", errors.join("; ")),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mcp_tool(name: &str) -> McpTool {
        McpTool {
            name: name.to_string(),
            description: Some("reads a file".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {"path": {"type": "string"}},
                "required": ["path"]
            }),
        }
    }

    #[test]
    fn test_remote_capability_with_prefix() {
        let cap = Capability::remote("fs", &mcp_tool("read_file"), Some("fs_"));
        assert_eq!(cap.name, "fs_read_file");
        assert_eq!(cap.owner, Owner::session("fs"));
        assert!(matches!(
            &cap.invoker,
            Invoker::Remote { remote_name } if remote_name == "read_file"
        ));
        assert_eq!(cap.schema().parameters["required"][0], "path");
    }

    #[test]
    fn test_validate_arguments() {
        let cap = Capability::remote("fs", &mcp_tool("read_file"), None);
        assert!(cap.validate(&json!({"path": "/etc/hosts"})).is_ok());

        let err = cap.validate(&json!({"path": 1})).unwrap_err();
        assert!(matches!(err, Error::CapabilityExecution { .. }));
        assert!(err.to_string().contains("invalid arguments"));
    }

    #[test]
    fn test_owner_display() {
        assert_eq!(Owner::Local.to_string(), "local");
        assert_eq!(Owner::session("fs").to_string(), "session:fs");
        assert_eq!(Owner::session("fs").session_id(), Some("fs"));
    }
}
