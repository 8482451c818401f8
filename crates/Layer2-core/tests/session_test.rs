//! Session Manager 통합 테스트
//!
//! `cargo test -p orca-core --test session_test`

use async_trait::async_trait;
use orca_core::{
    CapabilityRegistry, McpTransport, Owner, SessionManager, SessionOptions, SessionState,
    MCP_PROTOCOL_VERSION,
};
use orca_foundation::{ConflictPolicy, Error, McpServerConfig, Result, TransportKind};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

// ============================================================================
// Fake transport
// ============================================================================

/// 메모리 안에서 MCP 서버를 흉내내는 전송
struct FakeTransport {
    tools: Vec<Value>,
    connected: AtomicBool,
    closed: AtomicUsize,
    calls: AtomicUsize,
}

impl FakeTransport {
    fn new(tool_names: &[&str]) -> Arc<Self> {
        let tools = tool_names
            .iter()
            .map(|name| {
                json!({
                    "name": name,
                    "description": format!("{} tool", name),
                    "inputSchema": {
                        "type": "object",
                        "properties": {"path": {"type": "string"}}
                    }
                })
            })
            .collect();
        Arc::new(Self {
            tools,
            connected: AtomicBool::new(true),
            closed: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl McpTransport for FakeTransport {
    async fn request(&self, method: &str, params: Option<Value>, _timeout: Duration) -> Result<Value> {
        if !self.is_connected() {
            return Err(Error::Protocol("MCP transport not connected".to_string()));
        }
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "serverInfo": {"name": "fake", "version": "0.1.0"},
                "capabilities": {}
            })),
            "tools/list" => Ok(json!({ "tools": self.tools })),
            "tools/call" => {
                self.calls.fetch_add(1, Ordering::SeqCst);
                let params = params.unwrap_or_default();
                let name = params["name"].as_str().unwrap_or_default().to_string();
                match name.as_str() {
                    "slow" => Err(Error::Timeout("MCP request 'tools/call' timed out".into())),
                    "crash" => {
                        self.connected.store(false, Ordering::SeqCst);
                        Err(Error::Protocol("Transport closed before 'tools/call' response".into()))
                    }
                    "broken" => Ok(json!({
                        "content": [{"type": "text", "text": "disk on fire"}],
                        "isError": true
                    })),
                    _ => Ok(json!({
                        "content": [{"type": "text", "text": format!("{} ok: {}", name, params["arguments"])}]
                    })),
                }
            }
            other => Err(Error::Protocol(format!("MCP error -32601: Method not found: {}", other))),
        }
    }

    async fn notify(&self, _method: &str, _params: Option<Value>, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

fn manager() -> SessionManager {
    SessionManager::new(Arc::new(CapabilityRegistry::default()))
}

async fn connect_fake(manager: &SessionManager, id: &str, transport: Arc<FakeTransport>) -> SessionState {
    manager
        .connect_transport(
            id,
            TransportKind::Stdio,
            "fake",
            transport,
            SessionOptions::default(),
        )
        .await
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_connect_then_disconnect_removes_capabilities() {
    let manager = manager();
    let transport = FakeTransport::new(&["read_file"]);

    let state = connect_fake(&manager, "fs", transport.clone()).await;
    assert_eq!(state, SessionState::Active);

    let cap = manager.registry().get("read_file").unwrap();
    assert_eq!(cap.owner, Owner::session("fs"));

    assert_eq!(manager.disconnect("fs").await, 1);
    assert!(matches!(
        manager.registry().get("read_file"),
        Err(Error::CapabilityNotFound(_))
    ));
    assert_eq!(transport.closed.load(Ordering::SeqCst), 1);
    assert!(manager.state("fs").is_none());
}

#[tokio::test]
async fn test_failing_session_does_not_block_others() {
    let manager = manager();

    let bad = McpServerConfig::stdio("/nonexistent/orca-missing-mcp-server").timeouts(5, 5);
    let failed = manager.connect("broken", &bad).await;
    let healthy = connect_fake(&manager, "web", FakeTransport::new(&["search", "fetch"])).await;

    assert_eq!(failed, SessionState::Failed);
    assert_eq!(healthy, SessionState::Active);
    assert!(manager.registry().contains("search"));
    assert!(manager.registry().contains("fetch"));

    let infos = manager.sessions();
    let broken = infos.iter().find(|s| s.id == "broken").unwrap();
    assert_eq!(broken.state, SessionState::Failed);
    assert!(broken.last_error.as_deref().unwrap().contains("broken"));
    assert!(broken.capabilities.is_empty());
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let manager = manager();
    let transport = FakeTransport::new(&["read_file"]);
    connect_fake(&manager, "fs", transport.clone()).await;

    assert_eq!(manager.disconnect("fs").await, 1);
    let names_once: Vec<String> = manager.registry().list().iter().map(|c| c.name.clone()).collect();

    assert_eq!(manager.disconnect("fs").await, 0);
    assert_eq!(manager.disconnect("unknown").await, 0);
    let names_twice: Vec<String> = manager.registry().list().iter().map(|c| c.name.clone()).collect();

    assert_eq!(names_once, names_twice);
    assert_eq!(transport.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_disconnect_all() {
    let manager = manager();
    connect_fake(&manager, "a", FakeTransport::new(&["one"])).await;
    connect_fake(&manager, "b", FakeTransport::new(&["two"])).await;
    assert_eq!(manager.active_count(), 2);

    assert_eq!(manager.disconnect("").await, 2);
    assert!(manager.registry().is_empty());
    assert!(manager.sessions().is_empty());
}

#[tokio::test]
async fn test_reconnect_same_id_replaces_session() {
    let manager = manager();
    let first = FakeTransport::new(&["old_tool"]);
    connect_fake(&manager, "fs", first.clone()).await;
    connect_fake(&manager, "fs", FakeTransport::new(&["new_tool"])).await;

    assert_eq!(first.closed.load(Ordering::SeqCst), 1);
    assert!(!manager.registry().contains("old_tool"));
    assert!(manager.registry().contains("new_tool"));
    assert_eq!(manager.sessions().len(), 1);
}

// ============================================================================
// Invocation
// ============================================================================

#[tokio::test]
async fn test_call_capability() {
    let manager = manager();
    connect_fake(&manager, "fs", FakeTransport::new(&["read_file", "broken"])).await;

    let cap = assert_ok!(manager.registry().get("read_file"));
    let result = assert_ok!(manager.call_capability(&cap, json!({"path": "/tmp/a"})).await);
    assert!(result.success);
    assert!(result.output.contains("read_file ok"));

    let cap = manager.registry().get("broken").unwrap();
    let result = manager.call_capability(&cap, json!({})).await.unwrap();
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("disk on fire"));
}

#[tokio::test]
async fn test_prefixed_capability_calls_remote_name() {
    let manager = manager();
    let transport = FakeTransport::new(&["read_file"]);
    let options = SessionOptions {
        prefix: Some("fs_".to_string()),
        ..SessionOptions::default()
    };
    manager
        .connect_transport("fs", TransportKind::Stdio, "fake", transport, options)
        .await;

    assert!(!manager.registry().contains("read_file"));
    let cap = manager.registry().get("fs_read_file").unwrap();
    let result = manager.call_capability(&cap, json!({})).await.unwrap();
    assert!(result.output.starts_with("read_file ok"));
}

#[tokio::test]
async fn test_call_after_disconnect_is_session_inactive() {
    let manager = manager();
    let transport = FakeTransport::new(&["read_file"]);
    connect_fake(&manager, "fs", transport.clone()).await;

    // 조회는 disconnect 전에
    let cap = manager.registry().get("read_file").unwrap();
    manager.disconnect("fs").await;

    let err = manager.call_capability(&cap, json!({})).await.unwrap_err();
    assert!(matches!(err, Error::SessionInactive(ref s) if s == "fs"));
    assert!(err.is_recoverable());
    assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_timeout_keeps_session_active() {
    let manager = manager();
    connect_fake(&manager, "fs", FakeTransport::new(&["slow", "read_file"])).await;

    let err = manager.call("fs", "slow", json!({})).await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
    assert_eq!(manager.state("fs"), Some(SessionState::Active));
    assert!(manager.registry().contains("read_file"));
}

#[tokio::test]
async fn test_dead_transport_marks_session_failed() {
    let manager = manager();
    connect_fake(&manager, "fs", FakeTransport::new(&["crash", "read_file"])).await;

    let err = manager.call("fs", "crash", json!({})).await.unwrap_err();
    assert!(matches!(err, Error::SessionInactive(_)));
    assert_eq!(manager.state("fs"), Some(SessionState::Failed));
    assert!(!manager.registry().contains("read_file"));

    // Failed 세션도 disconnect로 정리됨
    assert_eq!(manager.disconnect("fs").await, 1);
    assert!(manager.state("fs").is_none());
}

#[tokio::test]
async fn test_overwritten_capability_listed_under_new_owner_only() {
    let manager = manager();
    connect_fake(&manager, "a", FakeTransport::new(&["search", "a_only"])).await;
    connect_fake(&manager, "b", FakeTransport::new(&["search"])).await;

    let infos = manager.sessions();
    let a = infos.iter().find(|s| s.id == "a").unwrap();
    let b = infos.iter().find(|s| s.id == "b").unwrap();
    assert_eq!(a.capabilities, vec!["a_only".to_string()]);
    assert_eq!(b.capabilities, vec!["search".to_string()]);
}

#[tokio::test]
async fn test_reject_policy_fails_conflicting_session() {
    let registry = Arc::new(CapabilityRegistry::new(ConflictPolicy::Reject));
    let manager = SessionManager::new(registry);

    connect_fake(&manager, "first", FakeTransport::new(&["search"])).await;
    let second = FakeTransport::new(&["search", "fetch"]);
    let state = connect_fake(&manager, "second", second.clone()).await;

    assert_eq!(state, SessionState::Failed);
    assert_eq!(second.closed.load(Ordering::SeqCst), 1);
    assert!(!manager.registry().contains("fetch"));
    assert_eq!(
        manager.registry().get("search").unwrap().owner,
        Owner::session("first")
    );
}

// ============================================================================
// Real stdio transport (sh responder)
// ============================================================================

#[cfg(unix)]
mod stdio {
    use super::*;
    use std::path::PathBuf;

    const RESPONDER: &str = r##"
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  [ -z "$id" ] && continue
  case "$line" in
    *'"method":"initialize"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2024-11-05","serverInfo":{"name":"sh-fs","version":"0.1"},"capabilities":{}}}\n' "$id" ;;
    *'"method":"tools/list"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"read_file","description":"Read a file","inputSchema":{"type":"object","properties":{"path":{"type":"string"}},"required":["path"]}}]}}\n' "$id" ;;
    *'"method":"tools/call"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"hello from fs"}],"isError":false}}\n' "$id" ;;
    *)
      printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32601,"message":"Method not found"}}\n' "$id" ;;
  esac
done
"##;

    fn write_responder(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("fs-server.sh");
        std::fs::write(&path, RESPONDER).unwrap();
        path
    }

    #[tokio::test]
    async fn test_stdio_session_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_responder(&dir);
        let config = McpServerConfig::stdio("sh")
            .arg(script.to_string_lossy())
            .timeouts(10, 10);

        let manager = manager();
        assert_eq!(manager.connect("fs", &config).await, SessionState::Active);

        let cap = manager.registry().get("read_file").unwrap();
        assert_eq!(cap.owner, Owner::session("fs"));

        let result = manager
            .call_capability(&cap, json!({"path": "/etc/hosts"}))
            .await
            .unwrap();
        assert_eq!(result.output, "hello from fs");

        manager.disconnect("fs").await;
        assert!(matches!(
            manager.registry().get("read_file"),
            Err(Error::CapabilityNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_all_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_responder(&dir);

        let servers = vec![
            (
                "missing".to_string(),
                McpServerConfig::stdio("/nonexistent/orca-missing-mcp-server").timeouts(5, 5),
            ),
            (
                "fs".to_string(),
                McpServerConfig::stdio("sh")
                    .arg(script.to_string_lossy())
                    .timeouts(10, 10),
            ),
        ];

        let manager = manager();
        let states = manager.connect_all(servers).await;

        assert_eq!(states[0], ("missing".to_string(), SessionState::Failed));
        assert_eq!(states[1], ("fs".to_string(), SessionState::Active));
        assert!(manager.registry().contains("read_file"));

        manager.disconnect("").await;
        assert!(manager.registry().is_empty());
    }
}
