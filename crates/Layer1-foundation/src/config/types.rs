//! Config Types - 설정 타입 정의
//!
//! `config.toml` 구조:
//! ```toml
//! [llm]
//! model = "gpt-4o"
//!
//! [agent]
//! max_steps = 20
//!
//! [agent.state_probe]
//! probe = "browser_state"
//! watch = ["browser"]
//!
//! [[mcp.servers]]
//! id = "fs"
//! type = "stdio"
//! command = "mcp-server-fs"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use super::env::expand_env_var;
use crate::{Error, Result};

// ============================================================================
// Orca Config (통합)
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrcaConfig {
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub mcp: McpConfig,
}

impl OrcaConfig {
    /// TOML 문자열에서 파싱 (환경변수 확장 포함)
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut config: OrcaConfig = toml::from_str(s)?;
        config.expand_env();
        Ok(config)
    }

    /// `${VAR}` 참조 확장
    pub fn expand_env(&mut self) {
        self.llm.api_key = expand_env_var(&self.llm.api_key);
        self.llm.base_url = expand_env_var(&self.llm.base_url);
        if self.llm.api_key.is_empty() {
            self.llm.api_key = std::env::var("ORCA_API_KEY")
                .or_else(|_| std::env::var("OPENAI_API_KEY"))
                .unwrap_or_default();
        }
        for server in &mut self.mcp.servers {
            server.expand_env();
        }
    }

    /// 에이전트 생성 전 검증. 모든 문제를 모아서 하나의 초기화 에러로 반환
    pub fn validate(&self) -> Result<()> {
        let mut issues = Vec::new();

        if self.agent.special_tools.is_empty() {
            issues.push("agent.special_tools must name at least one terminate capability".into());
        }
        if let Some(probe) = &self.agent.state_probe {
            if probe.probe.trim().is_empty() {
                issues.push("agent.state_probe requires 'probe'".into());
            }
            if probe.watch.is_empty() {
                issues.push("agent.state_probe requires at least one 'watch' capability".into());
            }
        }
        issues.extend(self.mcp.issues());

        if issues.is_empty() {
            Ok(())
        } else {
            Err(Error::Initialization(issues.join("; ")))
        }
    }
}

// ============================================================================
// LLM
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            api_key: String::new(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            timeout_secs: default_llm_timeout(),
        }
    }
}

// ============================================================================
// Agent
// ============================================================================

/// 같은 이름의 capability가 다른 세션에서 들어올 때의 정책
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// last-writer-wins (경고 로그)
    #[default]
    Overwrite,
    /// 배치 전체 거부, 세션은 Failed
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// 관찰 최대 길이 (문자 수, 0 = 제한 없음)
    #[serde(default = "default_max_observe")]
    pub max_observe: usize,

    /// 동일 결정 연속 반복 허용 횟수 (0 = 비활성)
    #[serde(default = "default_duplicate_threshold")]
    pub duplicate_threshold: u32,

    #[serde(default)]
    pub parallel_dispatch: bool,

    #[serde(default)]
    pub on_conflict: ConflictPolicy,

    #[serde(default = "default_special_tools")]
    pub special_tools: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step_prompt: Option<String>,

    /// 결정 전 상태 주입 (`[agent.state_probe]`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_probe: Option<StateProbeConfig>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_observe: default_max_observe(),
            duplicate_threshold: default_duplicate_threshold(),
            parallel_dispatch: false,
            on_conflict: ConflictPolicy::default(),
            special_tools: default_special_tools(),
            system_prompt: None,
            next_step_prompt: None,
            state_probe: None,
        }
    }
}

impl AgentConfig {
    pub fn max_steps(mut self, steps: u32) -> Self {
        self.max_steps = steps;
        self
    }

    pub fn is_special_tool(&self, name: &str) -> bool {
        self.special_tools.iter().any(|t| t.eq_ignore_ascii_case(name))
    }
}

/// 감시 capability가 최근 `window`개 메시지 안에서 쓰였으면 `probe`를 호출해
/// 그 결과를 다음 결정 전에 주입
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateProbeConfig {
    pub probe: String,

    #[serde(default)]
    pub watch: Vec<String>,

    #[serde(default = "default_probe_window")]
    pub window: usize,

    /// probe 호출 인자 (없으면 `{}`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,
}

// ============================================================================
// MCP
// ============================================================================

/// 세션 전송 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// 로컬 프로세스 (stdin/stdout)
    Stdio,
    /// HTTP Server-Sent Events
    Sse,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Stdio => write!(f, "stdio"),
            TransportKind::Sse => write!(f, "sse"),
        }
    }
}

/// 하나의 세션 정의
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// 세션 ID (없으면 자동 생성)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// 전송 종류 (없으면 url 유무로 추론)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// capability 이름 접두사
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

impl McpServerConfig {
    pub fn stdio(command: impl Into<String>) -> Self {
        Self {
            id: None,
            transport: Some(TransportKind::Stdio),
            command: Some(command.into()),
            args: Vec::new(),
            env: HashMap::new(),
            url: None,
            enabled: true,
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            prefix: None,
        }
    }

    pub fn sse(url: impl Into<String>) -> Self {
        Self {
            transport: Some(TransportKind::Sse),
            command: None,
            url: Some(url.into()),
            ..Self::stdio("")
        }
    }

    pub fn kind(&self) -> TransportKind {
        match self.transport {
            Some(kind) => kind,
            None if self.url.is_some() => TransportKind::Sse,
            None => TransportKind::Stdio,
        }
    }

    /// 연결 대상 (표시용)
    pub fn target(&self) -> String {
        match self.kind() {
            TransportKind::Stdio => {
                let mut parts = vec![self.command.clone().unwrap_or_default()];
                parts.extend(self.args.iter().cloned());
                parts.join(" ")
            }
            TransportKind::Sse => self.url.clone().unwrap_or_default(),
        }
    }

    // === Builder methods ===

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn timeouts(mut self, connect_secs: u64, request_secs: u64) -> Self {
        self.connect_timeout_secs = connect_secs;
        self.request_timeout_secs = request_secs;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    fn expand_env(&mut self) {
        self.command = self.command.as_deref().map(expand_env_var);
        self.url = self.url.as_deref().map(expand_env_var);
        self.args = self.args.iter().map(|a| expand_env_var(a)).collect();
        self.env = self
            .env
            .iter()
            .map(|(k, v)| (k.clone(), expand_env_var(v)))
            .collect();
    }

    fn issues(&self, label: &str) -> Vec<String> {
        let mut issues = Vec::new();
        match self.kind() {
            TransportKind::Stdio => {
                if self.command.as_deref().map(str::trim).unwrap_or("").is_empty() {
                    issues.push(format!("{}: stdio session requires 'command'", label));
                }
            }
            TransportKind::Sse => match self.url.as_deref() {
                None | Some("") => issues.push(format!("{}: sse session requires 'url'", label)),
                Some(raw) => match url::Url::parse(raw) {
                    Ok(u) if u.scheme() == "http" || u.scheme() == "https" => {}
                    Ok(u) => issues.push(format!(
                        "{}: unsupported url scheme '{}'",
                        label,
                        u.scheme()
                    )),
                    Err(e) => issues.push(format!("{}: invalid url '{}': {}", label, raw, e)),
                },
            },
        }
        if self.connect_timeout_secs == 0 || self.request_timeout_secs == 0 {
            issues.push(format!("{}: timeouts must be greater than zero", label));
        }
        issues
    }
}

/// 세션 정의 목록
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(default)]
    pub servers: Vec<McpServerConfig>,
}

impl McpConfig {
    pub fn add(&mut self, server: McpServerConfig) {
        self.servers.push(server);
    }

    /// 활성화된 서버를 (세션 ID, 설정) 쌍으로 반환
    ///
    /// ID가 없으면 sse는 url, stdio는 command 이름을 쓰고 충돌 시 `-2`, `-3` ...을 붙입니다.
    pub fn resolved(&self) -> Vec<(String, McpServerConfig)> {
        let mut taken: HashSet<String> = self.servers.iter().filter_map(|s| s.id.clone()).collect();
        let mut out = Vec::new();

        for server in self.servers.iter().filter(|s| s.enabled) {
            let id = match &server.id {
                Some(id) => id.clone(),
                None => {
                    let base = default_session_id(server);
                    let mut candidate = base.clone();
                    let mut n = 2;
                    while taken.contains(&candidate) {
                        candidate = format!("{}-{}", base, n);
                        n += 1;
                    }
                    taken.insert(candidate.clone());
                    candidate
                }
            };
            out.push((id, server.clone()));
        }
        out
    }

    fn issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        let mut seen = HashSet::new();

        for (i, server) in self.servers.iter().enumerate() {
            let label = match &server.id {
                Some(id) => format!("mcp.servers[{}] '{}'", i, id),
                None => format!("mcp.servers[{}]", i),
            };
            if let Some(id) = &server.id {
                if id.is_empty() {
                    issues.push(format!("{}: id must not be empty", label));
                } else if !seen.insert(id.clone()) {
                    issues.push(format!("{}: duplicate session id", label));
                }
            }
            if server.enabled {
                issues.extend(server.issues(&label));
            }
        }
        issues
    }
}

fn default_session_id(server: &McpServerConfig) -> String {
    match server.kind() {
        TransportKind::Sse => server.url.clone().unwrap_or_else(|| "sse".to_string()),
        TransportKind::Stdio => server
            .command
            .as_deref()
            .and_then(|c| std::path::Path::new(c).file_stem())
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "stdio".to_string()),
    }
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_max_steps() -> u32 {
    20
}

fn default_max_observe() -> usize {
    10_000
}

fn default_duplicate_threshold() -> u32 {
    2
}

fn default_probe_window() -> usize {
    3
}

fn default_special_tools() -> Vec<String> {
    vec!["terminate".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    60
}
