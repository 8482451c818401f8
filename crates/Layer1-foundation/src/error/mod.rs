//! Error types for Orca
//!
//! 모든 에러를 중앙에서 관리

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Orca 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 설정 / 초기화
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    /// 에이전트 생성 전에 발견된 잘못된 설정 (치명적)
    #[error("Fatal initialization error: {0}")]
    Initialization(String),

    // ========================================================================
    // 세션 관련
    // ========================================================================
    /// 한 세션의 전송/핸드셰이크 실패 (다른 세션에는 영향 없음)
    #[error("Connect error [{session}]: {message}")]
    Connect { session: String, message: String },

    #[error("Session no longer active: {0}")]
    SessionInactive(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    // ========================================================================
    // Capability 관련
    // ========================================================================
    #[error("Capability not found: {0}")]
    CapabilityNotFound(String),

    #[error("Capability execution failed: {capability} - {message}")]
    CapabilityExecution { capability: String, message: String },

    // ========================================================================
    // Provider 관련
    // ========================================================================
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("HTTP error: {0}")]
    Http(String),

    // ========================================================================
    // 실행 관련
    // ========================================================================
    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Cancelled")]
    Cancelled,

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // 기타
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// 실행 중인 스텝 안에서 관찰(observation)로 복구 가능한 에러인지 확인
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::CapabilityNotFound(_)
                | Error::CapabilityExecution { .. }
                | Error::SessionInactive(_)
                | Error::Timeout(_)
                | Error::Protocol(_)
        )
    }

    /// 재시도 가능한 에러인지 확인
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Timeout(_) | Error::Http(_))
    }

    /// Connect 에러 생성 헬퍼
    pub fn connect(session: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Connect {
            session: session.into(),
            message: message.into(),
        }
    }

    /// Capability 실행 에러 생성 헬퍼
    pub fn capability_execution(capability: impl Into<String>, message: impl Into<String>) -> Self {
        Error::CapabilityExecution {
            capability: capability.into(),
            message: message.into(),
        }
    }
}

// ============================================================================
// From 구현 (추가 변환)
// ============================================================================

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}
