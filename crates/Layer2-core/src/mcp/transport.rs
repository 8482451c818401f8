//! MCP Transport - 전송 계층 구현
//!
//! MCP 서버와의 통신을 위한 전송 계층
//! - Stdio: 로컬 프로세스와 stdin/stdout 통신 (한 줄에 JSON-RPC 프레임 하나)
//! - SSE: HTTP Server-Sent Events (응답은 스트림, 요청은 POST)
//!
//! 두 전송 모두 요청 ID로 응답을 매칭하며, 요청마다 타임아웃을 받습니다.
//! 전송이 끊기면 대기 중인 요청은 즉시 실패합니다.

use async_trait::async_trait;
use futures::StreamExt;
use orca_foundation::{Error, Result};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// JSON-RPC 2.0 요청
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 응답
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: u64, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            result: None,
            error: Some(error),
        }
    }

    /// result 추출 (error 객체는 Protocol 에러로)
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(error) => Err(Error::Protocol(format!(
                "MCP error {}: {}",
                error.code, error.message
            ))),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// JSON-RPC 에러
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {}", method),
            data: None,
        }
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self {
            code: -32603,
            message: msg.into(),
            data: None,
        }
    }
}

/// JSON-RPC 알림 (응답 없음)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
        }
    }
}

/// MCP Transport trait
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// 요청 전송 및 응답 수신 (timeout 안에 응답이 없으면 `Error::Timeout`)
    async fn request(&self, method: &str, params: Option<Value>, timeout: Duration)
        -> Result<Value>;

    /// 알림 전송 (응답 없음, timeout 안에 보내지 못하면 `Error::Timeout`)
    async fn notify(&self, method: &str, params: Option<Value>, timeout: Duration) -> Result<()>;

    /// 연결 종료
    async fn close(&self) -> Result<()>;

    /// 연결 상태 확인
    fn is_connected(&self) -> bool;
}

// ============================================================================
// Pending requests (id -> response sender)
// ============================================================================

#[derive(Clone, Default)]
struct PendingRequests {
    inner: Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>,
}

impl PendingRequests {
    fn register(&self, id: u64) -> oneshot::Receiver<JsonRpcResponse> {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().insert(id, tx);
        rx
    }

    fn complete(&self, response: JsonRpcResponse) {
        let Some(id) = response.id else {
            debug!("Ignoring JSON-RPC message without id");
            return;
        };
        match self.inner.lock().remove(&id) {
            Some(sender) => {
                let _ = sender.send(response);
            }
            None => debug!("No pending request for response id {}", id),
        }
    }

    fn cancel(&self, id: u64) {
        self.inner.lock().remove(&id);
    }

    /// 모든 대기 요청 실패 처리 (sender drop)
    fn fail_all(&self) {
        let dropped = {
            let mut map = self.inner.lock();
            let n = map.len();
            map.clear();
            n
        };
        if dropped > 0 {
            debug!("Failed {} pending MCP requests", dropped);
        }
    }

    /// `deadline`까지 응답 대기 (`budget`은 에러 메시지용 전체 제한)
    async fn wait_until(
        &self,
        id: u64,
        method: &str,
        rx: oneshot::Receiver<JsonRpcResponse>,
        deadline: Instant,
        budget: Duration,
    ) -> Result<Value> {
        match tokio::time::timeout_at(deadline, rx).await {
            Ok(Ok(response)) => response.into_result(),
            Ok(Err(_)) => Err(Error::Protocol(format!(
                "Transport closed before '{}' response",
                method
            ))),
            Err(_) => {
                self.cancel(id);
                Err(request_timeout(method, budget))
            }
        }
    }
}

fn request_timeout(method: &str, budget: Duration) -> Error {
    Error::Timeout(format!(
        "MCP request '{}' timed out after {:?}",
        method, budget
    ))
}

// ============================================================================
// Stdio Transport
// ============================================================================

/// Stdio Transport - 프로세스 기반 통신
pub struct StdioTransport {
    /// 요청 ID 카운터
    request_id: AtomicU64,

    /// 자식 프로세스
    child: tokio::sync::Mutex<Option<Child>>,

    /// stdin writer
    stdin_tx: mpsc::Sender<String>,

    /// 대기 중인 요청들
    pending: PendingRequests,

    /// 연결 상태
    connected: Arc<AtomicBool>,
}

impl StdioTransport {
    /// 새 stdio transport 생성 및 프로세스 시작
    pub async fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Self> {
        info!("Spawning MCP process: {} {:?}", command, args);

        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Internal(format!("Failed to spawn '{}': {}", command, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Internal("Failed to capture stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("Failed to capture stdout".to_string()))?;

        let (stdin_tx, mut stdin_rx) = mpsc::channel::<String>(32);
        let pending = PendingRequests::default();
        let connected = Arc::new(AtomicBool::new(true));

        // stdin writer task
        let connected_for_writer = Arc::clone(&connected);
        let mut writer = stdin;
        tokio::spawn(async move {
            while let Some(msg) = stdin_rx.recv().await {
                let written = async {
                    writer.write_all(msg.as_bytes()).await?;
                    writer.flush().await
                }
                .await;
                if let Err(e) = written {
                    warn!("Failed to write to MCP stdin: {}", e);
                    connected_for_writer.store(false, Ordering::SeqCst);
                    break;
                }
            }
        });

        // stdout reader task
        let pending_for_reader = pending.clone();
        let connected_for_reader = Arc::clone(&connected);
        let mut lines = BufReader::new(stdout).lines();
        tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                debug!("MCP stdout: {}", line);
                match serde_json::from_str::<JsonRpcResponse>(line) {
                    Ok(response) => pending_for_reader.complete(response),
                    Err(e) => debug!("Non-JSON-RPC line or parse error: {}", e),
                }
            }
            connected_for_reader.store(false, Ordering::SeqCst);
            pending_for_reader.fail_all();
            info!("MCP stdout reader finished");
        });

        // stderr는 디버그 로그로만
        if let Some(stderr) = child.stderr.take() {
            let mut lines = BufReader::new(stderr).lines();
            tokio::spawn(async move {
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("MCP stderr: {}", line);
                }
            });
        }

        Ok(Self {
            request_id: AtomicU64::new(1),
            child: tokio::sync::Mutex::new(Some(child)),
            stdin_tx,
            pending,
            connected,
        })
    }

    /// 다음 요청 ID 생성
    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }

    /// 쓰기 큐에 한 줄 넣기
    ///
    /// 자식이 stdin을 읽지 않으면 파이프와 큐가 차서 무한정 막히므로
    /// `deadline`까지만 기다립니다.
    async fn send_line(
        &self,
        method: &str,
        line: String,
        deadline: Instant,
        budget: Duration,
    ) -> Result<()> {
        match tokio::time::timeout_at(deadline, self.stdin_tx.send(line)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(Error::Protocol("MCP stdin writer closed".to_string())),
            Err(_) => {
                warn!("MCP stdin is not draining, '{}' was not sent", method);
                Err(request_timeout(method, budget))
            }
        }
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        if !self.is_connected() {
            return Err(Error::Protocol("MCP transport not connected".to_string()));
        }

        // 큐 대기와 응답 대기가 하나의 제한을 나눠 씀
        let deadline = Instant::now() + timeout;
        let id = self.next_id();
        let rx = self.pending.register(id);
        let msg = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;
        debug!("Sending MCP request: {}", msg);

        if let Err(e) = self
            .send_line(method, format!("{}\n", msg), deadline, timeout)
            .await
        {
            self.pending.cancel(id);
            return Err(e);
        }

        self.pending
            .wait_until(id, method, rx, deadline, timeout)
            .await
    }

    async fn notify(&self, method: &str, params: Option<Value>, timeout: Duration) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::Protocol("MCP transport not connected".to_string()));
        }
        let msg = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        self.send_line(method, format!("{}\n", msg), Instant::now() + timeout, timeout)
            .await
    }

    async fn close(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.pending.fail_all();

        let mut guard = self.child.lock().await;
        if let Some(mut child) = guard.take() {
            if let Err(e) = child.kill().await {
                debug!("MCP process already exited: {}", e);
            }
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

// ============================================================================
// SSE Transport
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum SseStatus {
    Connecting,
    /// 스트림 열림, endpoint 이벤트 대기 중
    Open,
    /// endpoint 수신 완료
    Ready,
    Closed(String),
}

/// SSE Transport - HTTP Server-Sent Events 기반 통신
pub struct SseTransport {
    /// 요청 ID 카운터
    request_id: AtomicU64,

    /// HTTP 클라이언트
    client: reqwest::Client,

    /// 대기 중인 요청들
    pending: PendingRequests,

    /// 연결 상태
    connected: Arc<AtomicBool>,

    /// 메시지 엔드포인트 URL (endpoint 이벤트로 갱신)
    message_url: Arc<RwLock<String>>,

    /// 이벤트 수신 태스크
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl SseTransport {
    /// SSE 연결 생성
    ///
    /// 스트림이 열리고 서버가 `endpoint` 이벤트를 보낼 때까지 기다립니다.
    /// 스트림은 열렸지만 endpoint가 오지 않으면 `<base>/messages`를 사용합니다.
    pub async fn connect(url: &str, connect_timeout: Duration) -> Result<Self> {
        info!("Connecting to MCP SSE server: {}", url);

        let base = url::Url::parse(url)
            .map_err(|e| Error::Config(format!("Invalid SSE url '{}': {}", url, e)))?;

        // 스트림은 오래 유지되므로 클라이언트 전역 타임아웃은 두지 않음
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| Error::Http(format!("Failed to create HTTP client: {}", e)))?;

        let es = reqwest_eventsource::EventSource::new(client.get(url))
            .map_err(|e| Error::Http(format!("Failed to create EventSource: {}", e)))?;

        let pending = PendingRequests::default();
        let connected = Arc::new(AtomicBool::new(true));
        let message_url = Arc::new(RwLock::new(fallback_message_url(&base)));
        let (status_tx, mut status_rx) = watch::channel(SseStatus::Connecting);

        let router = SseRouter {
            base,
            pending: pending.clone(),
            connected: Arc::clone(&connected),
            message_url: Arc::clone(&message_url),
            status: status_tx,
        };
        let listener = tokio::spawn(Self::sse_listener(es, router));

        let transport = Self {
            request_id: AtomicU64::new(1),
            client,
            pending,
            connected,
            message_url,
            listener: Mutex::new(Some(listener)),
        };

        let waited = tokio::time::timeout(connect_timeout, async {
            loop {
                let status = status_rx.borrow_and_update().clone();
                match status {
                    SseStatus::Ready => return Ok(()),
                    SseStatus::Closed(reason) => return Err(reason),
                    SseStatus::Connecting | SseStatus::Open => {}
                }
                if status_rx.changed().await.is_err() {
                    return Err("SSE listener stopped".to_string());
                }
            }
        })
        .await;

        match waited {
            Ok(Ok(())) => Ok(transport),
            Ok(Err(reason)) => {
                transport.shutdown();
                Err(Error::Http(format!("SSE connection failed: {}", reason)))
            }
            Err(_) if *status_rx.borrow() == SseStatus::Open => {
                warn!(
                    "No endpoint event from {}, using {}",
                    url,
                    transport.message_url.read()
                );
                Ok(transport)
            }
            Err(_) => {
                transport.shutdown();
                Err(Error::Timeout(format!(
                    "SSE connect to '{}' timed out after {:?}",
                    url, connect_timeout
                )))
            }
        }
    }

    /// SSE 이벤트 수신 루프
    async fn sse_listener(mut es: reqwest_eventsource::EventSource, router: SseRouter) {
        let reason = loop {
            match es.next().await {
                Some(Ok(event)) => router.handle(event),
                Some(Err(e)) => break e.to_string(),
                None => break "stream ended".to_string(),
            }
        };

        es.close();
        router.close(reason);
    }

    /// 다음 요청 ID 생성
    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }

    fn shutdown(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.pending.fail_all();
        if let Some(handle) = self.listener.lock().take() {
            handle.abort();
        }
    }

    async fn post(&self, body: &impl Serialize, timeout: Duration) -> Result<()> {
        let url = self.message_url.read().clone();
        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Http(format!("Failed to send request: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Http(format!("HTTP error: {}", response.status())));
        }
        Ok(())
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// SSE 이벤트를 전송 상태에 반영
///
/// - `endpoint`: POST 주소 갱신 (상대 경로는 스트림 URL 기준)
/// - 그 외 메시지: JSON-RPC 응답으로 보고 대기 중인 요청에 전달
struct SseRouter {
    base: url::Url,
    pending: PendingRequests,
    connected: Arc<AtomicBool>,
    message_url: Arc<RwLock<String>>,
    status: watch::Sender<SseStatus>,
}

impl SseRouter {
    fn handle(&self, event: reqwest_eventsource::Event) {
        use reqwest_eventsource::Event;

        match event {
            Event::Open => {
                info!("SSE connection opened");
                let _ = self.status.send(SseStatus::Open);
            }
            Event::Message(message) if message.event == "endpoint" => {
                match self.base.join(message.data.trim()) {
                    Ok(endpoint) => {
                        debug!("SSE message endpoint: {}", endpoint);
                        *self.message_url.write() = endpoint.to_string();
                        let _ = self.status.send(SseStatus::Ready);
                    }
                    Err(e) => warn!("Invalid SSE endpoint '{}': {}", message.data, e),
                }
            }
            Event::Message(message) => {
                debug!("SSE message: {}", message.data);
                match serde_json::from_str::<JsonRpcResponse>(&message.data) {
                    Ok(response) => self.pending.complete(response),
                    Err(e) => debug!("Failed to parse SSE message: {}", e),
                }
            }
        }
    }

    /// 스트림 종료: 대기 중인 요청을 모두 실패시킴
    fn close(&self, reason: String) {
        self.connected.store(false, Ordering::SeqCst);
        self.pending.fail_all();
        info!("SSE connection closed: {}", reason);
        let _ = self.status.send(SseStatus::Closed(reason));
    }
}

fn fallback_message_url(base: &url::Url) -> String {
    let trimmed = base.as_str().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix("/sse").unwrap_or(trimmed);
    format!("{}/messages", trimmed)
}

#[async_trait]
impl McpTransport for SseTransport {
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        if !self.is_connected() {
            return Err(Error::Protocol(
                "MCP SSE transport not connected".to_string(),
            ));
        }

        let deadline = Instant::now() + timeout;
        let id = self.next_id();
        let rx = self.pending.register(id);
        let request = JsonRpcRequest::new(id, method, params);

        if let Err(e) = self.post(&request, timeout).await {
            self.pending.cancel(id);
            return Err(e);
        }

        self.pending
            .wait_until(id, method, rx, deadline, timeout)
            .await
    }

    async fn notify(&self, method: &str, params: Option<Value>, timeout: Duration) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::Protocol(
                "MCP SSE transport not connected".to_string(),
            ));
        }
        self.post(&JsonRpcNotification::new(method, params), timeout)
            .await
    }

    async fn close(&self) -> Result<()> {
        self.shutdown();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
