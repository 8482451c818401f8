//! MCP Client - MCP 서버 클라이언트
//!
//! 전송 계층 위에서 initialize 핸드셰이크, 도구 목록 조회, 도구 호출을 처리

use super::transport::{McpTransport, SseTransport, StdioTransport};
use super::types::{McpTool, McpToolCall, McpToolResult, ToolsListResult};
use orca_foundation::{Error, McpServerConfig, Result, TransportKind};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// MCP 프로토콜 버전
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// tools/list 페이지 최대 수
const MAX_TOOL_PAGES: usize = 64;

/// MCP 클라이언트 정보
#[derive(Debug, Clone, Serialize)]
struct ClientInfo {
    name: String,
    version: String,
}

/// MCP 서버 정보
#[derive(Debug, Clone, Default, Deserialize)]
struct ServerInfo {
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: String,
}

/// Initialize 응답
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeResult {
    #[serde(default)]
    protocol_version: String,
    #[serde(default)]
    server_info: ServerInfo,
}

/// MCP 클라이언트
pub struct McpClient {
    /// 세션 이름
    name: String,

    /// 전송 계층
    transport: Arc<dyn McpTransport>,

    /// 요청별 타임아웃
    request_timeout: Duration,
}

impl McpClient {
    /// 설정에 따라 전송을 열고 initialize 핸드셰이크까지 수행
    pub async fn connect(name: &str, config: &McpServerConfig) -> Result<Self> {
        let connect_timeout = Duration::from_secs(config.connect_timeout_secs);
        let request_timeout = Duration::from_secs(config.request_timeout_secs);

        let transport: Arc<dyn McpTransport> = match config.kind() {
            TransportKind::Stdio => {
                let command = config
                    .command
                    .as_deref()
                    .ok_or_else(|| Error::Config("stdio session requires a command".into()))?;
                Arc::new(StdioTransport::spawn(command, &config.args, &config.env).await?)
            }
            TransportKind::Sse => {
                let url = config
                    .url
                    .as_deref()
                    .ok_or_else(|| Error::Config("sse session requires a url".into()))?;
                Arc::new(SseTransport::connect(url, connect_timeout).await?)
            }
        };

        match Self::with_transport(name, transport.clone(), connect_timeout, request_timeout).await
        {
            Ok(client) => Ok(client),
            Err(e) => {
                let _ = transport.close().await;
                Err(e)
            }
        }
    }

    /// 이미 열린 전송으로 클라이언트 생성 (initialize 수행)
    pub async fn with_transport(
        name: &str,
        transport: Arc<dyn McpTransport>,
        handshake_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = Self {
            name: name.to_string(),
            transport,
            request_timeout,
        };
        client.initialize(handshake_timeout).await?;
        Ok(client)
    }

    /// 연결 상태
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// MCP initialize 핸드셰이크
    async fn initialize(&self, timeout: Duration) -> Result<()> {
        let params = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "clientInfo": ClientInfo {
                name: "orca".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            "capabilities": {}
        });

        let result = self
            .transport
            .request("initialize", Some(params), timeout)
            .await?;

        let init: InitializeResult = serde_json::from_value(result)
            .map_err(|e| Error::Protocol(format!("Invalid initialize response: {}", e)))?;

        if !init.protocol_version.is_empty() && init.protocol_version != MCP_PROTOCOL_VERSION {
            warn!(
                "MCP server '{}' speaks protocol {}, client expects {}",
                self.name, init.protocol_version, MCP_PROTOCOL_VERSION
            );
        }
        debug!(
            "MCP server '{}' ({} v{}) initialized",
            self.name, init.server_info.name, init.server_info.version
        );

        // initialized 알림 전송
        self.transport
            .notify("notifications/initialized", None, timeout)
            .await?;

        Ok(())
    }

    /// 도구 목록 조회 (페이지네이션 포함)
    pub async fn list_tools(&self) -> Result<Vec<McpTool>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_TOOL_PAGES {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let result = self
                .transport
                .request("tools/list", params, self.request_timeout)
                .await?;

            let next = result
                .get("nextCursor")
                .and_then(Value::as_str)
                .map(str::to_string);
            let page: ToolsListResult = serde_json::from_value(result)
                .map_err(|e| Error::Protocol(format!("Invalid tools/list response: {}", e)))?;
            tools.extend(page.tools);

            match next {
                Some(c) if !c.is_empty() => cursor = Some(c),
                _ => break,
            }
        }

        info!(
            "MCP server '{}' offers {} tools",
            self.name,
            tools.len()
        );
        Ok(tools)
    }

    /// 도구 호출
    pub async fn call_tool(&self, call: &McpToolCall) -> Result<McpToolResult> {
        self.call_tool_with_timeout(call, self.request_timeout).await
    }

    pub async fn call_tool_with_timeout(
        &self,
        call: &McpToolCall,
        timeout: Duration,
    ) -> Result<McpToolResult> {
        debug!("Calling MCP tool: {} with args: {}", call.name, call.arguments);

        let params = json!({
            "name": call.name,
            "arguments": call.arguments
        });
        let result = self
            .transport
            .request("tools/call", Some(params), timeout)
            .await?;

        let tool_result: McpToolResult = serde_json::from_value(result)
            .map_err(|e| Error::Protocol(format!("Invalid tools/call response: {}", e)))?;

        if tool_result.is_error {
            warn!(
                "MCP tool '{}' returned error: {}",
                call.name,
                tool_result.text()
            );
        }
        Ok(tool_result)
    }

    /// 연결 종료
    pub async fn close(&self) -> Result<()> {
        self.transport.close().await?;
        info!("Disconnected from MCP server: {}", self.name);
        Ok(())
    }
}
