//! Session Manager - MCP 세션 연결 관리
//!
//! 외부 도구 서버(로컬 프로세스 또는 SSE 엔드포인트)와의 세션을 열고, 도구 목록을
//! registry에 등록하고, 끊을 때 그 세션이 등록한 항목을 한 번에 제거합니다.
//!
//! ## 보장
//! - 한 세션의 연결 실패는 다른 세션 연결을 막지 않음 (Failed로 기록 후 계속)
//! - `disconnect`가 반환되기 전에 registry 제거가 끝남
//! - 원격 호출 직전에 세션이 Active인지 다시 확인
//! - 요청 타임아웃은 호출 에러일 뿐 세션을 끊지 않음
//!
//! ```text
//!            connect()                         disconnect()
//!   (none) ────────────▶ Connecting ──ok──▶ Active ─────────▶ Disconnected
//!                            │                 │
//!                            └──err──▶ Failed ◀┘ (transport died)
//! ```

use crate::capability::{Capability, CapabilityRegistry, Invoker, Owner};
use crate::mcp::{McpClient, McpToolCall, McpTransport};
use futures::stream::{self, StreamExt};
use orca_foundation::{
    CapabilityResult, Error, McpServerConfig, Result, TransportKind,
};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 동시에 진행할 연결 수
const CONNECT_CONCURRENCY: usize = 8;

/// 세션 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Disconnected,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Disconnected => "disconnected",
            SessionState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// 세션 옵션 (타임아웃, 이름 접두사)
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub prefix: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(60),
            prefix: None,
        }
    }
}

impl From<&McpServerConfig> for SessionOptions {
    fn from(config: &McpServerConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            prefix: config.prefix.clone().filter(|p| !p.is_empty()),
        }
    }
}

/// 세션 상태 스냅샷
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: String,
    pub kind: TransportKind,
    pub target: String,
    pub state: SessionState,
    pub capabilities: Vec<String>,
    pub last_error: Option<String>,
}

struct Session {
    id: String,
    kind: TransportKind,
    target: String,
    state: RwLock<SessionState>,
    /// Connecting / Failed(연결 실패)일 때는 None
    client: Option<McpClient>,
    last_error: RwLock<Option<String>>,
}

impl Session {
    fn placeholder(id: &str, kind: TransportKind, target: &str) -> Self {
        Self {
            id: id.to_string(),
            kind,
            target: target.to_string(),
            state: RwLock::new(SessionState::Connecting),
            client: None,
            last_error: RwLock::new(None),
        }
    }

    fn state(&self) -> SessionState {
        *self.state.read()
    }

    fn set_state(&self, state: SessionState) {
        *self.state.write() = state;
    }

    /// `capabilities`는 registry 기준 (다른 세션에 덮어써진 이름은 빠짐)
    fn info(&self, registry: &CapabilityRegistry) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            kind: self.kind,
            target: self.target.clone(),
            state: self.state(),
            capabilities: registry.names_for_session(&self.id),
            last_error: self.last_error.read().clone(),
        }
    }
}

/// Session Manager
///
/// 세션 맵과 전송 핸들의 유일한 소유자이며, 세션 수명에 따른 registry
/// 일괄 추가/제거를 호출하는 유일한 곳입니다.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    registry: Arc<CapabilityRegistry>,
}

impl SessionManager {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    // ========================================================================
    // Connect
    // ========================================================================

    /// 설정으로 세션 연결
    ///
    /// 실패해도 에러를 던지지 않고 `SessionState::Failed`를 반환합니다.
    pub async fn connect(&self, id: &str, config: &McpServerConfig) -> SessionState {
        let options = SessionOptions::from(config);
        let target = config.target();
        info!("Connecting session '{}' ({} {})", id, config.kind(), target);

        let placeholder = self.begin(id, config.kind(), &target).await;

        let attempt =
            tokio::time::timeout(options.connect_timeout, McpClient::connect(id, config)).await;
        let client = match attempt {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => return self.fail(&placeholder, Error::connect(id, e.to_string())),
            Err(_) => {
                return self.fail(
                    &placeholder,
                    Error::connect(
                        id,
                        format!("timed out after {:?}", options.connect_timeout),
                    ),
                )
            }
        };

        self.activate(placeholder, client, &options).await
    }

    /// 이미 열린 전송으로 세션 연결 (핸드셰이크부터 수행)
    pub async fn connect_transport(
        &self,
        id: &str,
        kind: TransportKind,
        target: &str,
        transport: Arc<dyn McpTransport>,
        options: SessionOptions,
    ) -> SessionState {
        let placeholder = self.begin(id, kind, target).await;

        let handshake = McpClient::with_transport(
            id,
            Arc::clone(&transport),
            options.connect_timeout,
            options.request_timeout,
        )
        .await;
        match handshake {
            Ok(client) => self.activate(placeholder, client, &options).await,
            Err(e) => {
                let _ = transport.close().await;
                self.fail(&placeholder, Error::connect(id, e.to_string()))
            }
        }
    }

    /// 여러 세션을 병렬로 연결 (하나의 실패가 다른 연결을 막지 않음)
    pub async fn connect_all(
        &self,
        servers: Vec<(String, McpServerConfig)>,
    ) -> Vec<(String, SessionState)> {
        stream::iter(servers)
            .map(|(id, config)| async move {
                let state = self.connect(&id, &config).await;
                (id, state)
            })
            .buffered(CONNECT_CONCURRENCY)
            .collect()
            .await
    }

    async fn begin(&self, id: &str, kind: TransportKind, target: &str) -> Arc<Session> {
        // 같은 ID가 살아있으면 먼저 정리
        if self.sessions.read().contains_key(id) {
            debug!("Session '{}' already exists, disconnecting first", id);
            self.disconnect(id).await;
        }
        let placeholder = Arc::new(Session::placeholder(id, kind, target));
        self.sessions
            .write()
            .insert(id.to_string(), Arc::clone(&placeholder));
        placeholder
    }

    async fn activate(
        &self,
        placeholder: Arc<Session>,
        client: McpClient,
        options: &SessionOptions,
    ) -> SessionState {
        let id = placeholder.id.clone();

        let tools = match tokio::time::timeout(options.connect_timeout, client.list_tools()).await
        {
            Ok(Ok(tools)) => tools,
            Ok(Err(e)) => {
                let _ = client.close().await;
                return self.fail(&placeholder, Error::connect(&id, e.to_string()));
            }
            Err(_) => {
                let _ = client.close().await;
                return self.fail(
                    &placeholder,
                    Error::connect(&id, "tools/list timed out".to_string()),
                );
            }
        };

        let capabilities: Vec<Capability> = tools
            .iter()
            .map(|tool| Capability::remote(&id, tool, options.prefix.as_deref()))
            .collect();

        let outcome = {
            let mut sessions = self.sessions.write();
            let still_current = sessions
                .get(&id)
                .map(|s| Arc::ptr_eq(s, &placeholder))
                .unwrap_or(false);

            if !still_current {
                Err((client, None))
            } else {
                match self.registry.add_batch(&Owner::session(&id), capabilities) {
                    Ok(_) => {
                        let session = Session {
                            id: id.clone(),
                            kind: placeholder.kind,
                            target: placeholder.target.clone(),
                            state: RwLock::new(SessionState::Active),
                            client: Some(client),
                            last_error: RwLock::new(None),
                        };
                        sessions.insert(id.clone(), Arc::new(session));
                        Ok(())
                    }
                    Err(e) => Err((client, Some(e))),
                }
            }
        };

        match outcome {
            Ok(()) => {
                info!("Session '{}' active with {} capabilities", id, tools.len());
                SessionState::Active
            }
            Err((client, Some(e))) => {
                let _ = client.close().await;
                self.fail(&placeholder, Error::connect(&id, e.to_string()))
            }
            Err((client, None)) => {
                // 연결 중에 disconnect됨
                debug!("Session '{}' was disconnected while connecting", id);
                let _ = client.close().await;
                SessionState::Disconnected
            }
        }
    }

    fn fail(&self, placeholder: &Arc<Session>, error: Error) -> SessionState {
        warn!("{}", error);
        *placeholder.last_error.write() = Some(error.to_string());
        placeholder.set_state(SessionState::Failed);
        SessionState::Failed
    }

    // ========================================================================
    // Disconnect
    // ========================================================================

    /// 세션 연결 해제 (`""`이면 전체). 없는 ID는 no-op. 해제한 세션 수 반환
    pub async fn disconnect(&self, id: &str) -> usize {
        let targets: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.write();
            if id.is_empty() {
                sessions.drain().map(|(_, s)| s).collect()
            } else {
                sessions.remove(id).into_iter().collect()
            }
        };

        let count = targets.len();
        for session in targets {
            self.teardown(session).await;
        }
        count
    }

    /// 전체 세션 해제
    pub async fn disconnect_all(&self) -> usize {
        self.disconnect("").await
    }

    async fn teardown(&self, session: Arc<Session>) {
        // 먼저 비활성화해서 이후 호출이 죽은 전송으로 가지 않게 함
        session.set_state(SessionState::Disconnected);
        self.registry.remove_by_session(&session.id);

        if let Some(client) = &session.client {
            if let Err(e) = client.close().await {
                warn!("Failed to close session '{}': {}", session.id, e);
            }
        }
        info!("Session '{}' disconnected", session.id);
    }

    // ========================================================================
    // Invoke
    // ========================================================================

    /// 세션의 도구 호출 (`remote_name`은 서버 쪽 이름)
    pub async fn call(
        &self,
        session_id: &str,
        remote_name: &str,
        arguments: Value,
    ) -> Result<CapabilityResult> {
        let session = self
            .sessions
            .read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::SessionInactive(session_id.to_string()))?;

        // 전송 직전 재확인
        if session.state() != SessionState::Active {
            return Err(Error::SessionInactive(session_id.to_string()));
        }
        let client = session
            .client
            .as_ref()
            .ok_or_else(|| Error::SessionInactive(session_id.to_string()))?;
        if !client.is_connected() {
            self.mark_failed(&session, "transport closed");
            return Err(Error::SessionInactive(session_id.to_string()));
        }

        let call = McpToolCall {
            name: remote_name.to_string(),
            arguments,
        };
        match client.call_tool(&call).await {
            Ok(result) => Ok(result.into_capability_result()),
            Err(e @ Error::Timeout(_)) => Err(e),
            Err(e) if !client.is_connected() => {
                self.mark_failed(&session, &e.to_string());
                Err(Error::SessionInactive(session_id.to_string()))
            }
            Err(e) => Err(Error::capability_execution(remote_name, e.to_string())),
        }
    }

    /// Capability의 invoker에 맞춰 원격 호출
    pub async fn call_capability(
        &self,
        capability: &Capability,
        arguments: Value,
    ) -> Result<CapabilityResult> {
        match (&capability.owner, &capability.invoker) {
            (Owner::Session(session_id), Invoker::Remote { remote_name }) => {
                self.call(session_id, remote_name, arguments).await
            }
            _ => Err(Error::Internal(format!(
                "Capability '{}' is not owned by a session",
                capability.name
            ))),
        }
    }

    /// 살아있던 전송이 죽은 경우: Failed로 바꾸고 registry에서 제거
    fn mark_failed(&self, session: &Session, reason: &str) {
        let was_active = {
            let mut state = session.state.write();
            let was = *state == SessionState::Active;
            if was {
                *state = SessionState::Failed;
            }
            was
        };
        if was_active {
            warn!("Session '{}' failed: {}", session.id, reason);
            *session.last_error.write() = Some(reason.to_string());
            self.registry.remove_by_session(&session.id);
        }
    }

    // ========================================================================
    // Status
    // ========================================================================

    pub fn state(&self, id: &str) -> Option<SessionState> {
        self.sessions.read().get(id).map(|s| s.state())
    }

    /// 모든 세션 스냅샷 (ID 순)
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let sessions: Vec<Arc<Session>> = self.sessions.read().values().cloned().collect();
        let mut infos: Vec<SessionInfo> = sessions
            .iter()
            .map(|s| s.info(&self.registry))
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    pub fn active_count(&self) -> usize {
        self.sessions
            .read()
            .values()
            .filter(|s| s.state() == SessionState::Active)
            .count()
    }
}
