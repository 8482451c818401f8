//! orca-core: Capability Runtime
//!
//! Layer2 - capability와 세션 관리 레이어
//!
//! # 주요 모듈
//!
//! - `capability`: Capability Registry (로컬 도구 + 세션 도구의 단일 이름 공간)
//! - `mcp`: MCP (Model Context Protocol) 클라이언트와 전송 계층
//! - `session`: Session Manager (연결, 해제, 원격 호출)
//! - `tool`: 로컬 도구와 builtin 도구들
//!
//! # 사용 예시
//!
//! ```ignore
//! use orca_core::{CapabilityRegistry, SessionManager, builtin_tools};
//!
//! let registry = Arc::new(CapabilityRegistry::default());
//! for tool in builtin_tools() {
//!     registry.register_local(tool)?;
//! }
//!
//! let sessions = SessionManager::new(registry.clone());
//! sessions.connect("fs", &McpServerConfig::stdio("mcp-server-fs")).await;
//!
//! let cap = registry.get("read_file")?;
//! let result = sessions.call_capability(&cap, json!({"path": "README.md"})).await?;
//!
//! sessions.disconnect("").await;
//! ```

pub mod capability;
pub mod mcp;
pub mod session;
pub mod tool;

// Re-exports: Capability
pub use capability::{Capability, CapabilityRegistry, Invoker, Owner, RegistryEvent};

// Re-exports: MCP
pub use mcp::{
    McpClient, McpContent, McpTool, McpToolCall, McpToolResult, McpTransport, SseTransport,
    StdioTransport, MCP_PROTOCOL_VERSION,
};

// Re-exports: Session
pub use session::{SessionInfo, SessionManager, SessionOptions, SessionState};

// Re-exports: Tool
pub use tool::{builtin_tools, RunContext, TerminateTool};
