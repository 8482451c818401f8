//! MCP - Model Context Protocol 클라이언트
//!
//! 외부 MCP 서버를 세션으로 연결해 capability를 확장합니다.
//!
//! ## 기능
//! - 전송 계층 (stdio, SSE)
//! - initialize 핸드셰이크와 도구 목록 조회
//! - 도구 호출 프록시
//!
//! ## 참고
//! - https://modelcontextprotocol.io/

mod client;
mod transport;
mod types;

pub use client::{McpClient, MCP_PROTOCOL_VERSION};
pub use transport::{
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, McpTransport,
    SseTransport, StdioTransport,
};
pub use types::{McpContent, McpTool, McpToolCall, McpToolResult};
