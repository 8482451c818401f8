//! Reasoning service errors
//!
//! 한 번의 chat completion 호출이 실패한 이유입니다. 재시도 판단(`Retryable`)을
//! 스스로 하고, 최종적으로 `orca_foundation::Error`로 바뀌어 실행을 끝냅니다.

use crate::retry::{RetryDecision, Retryable};
use orca_foundation::Error as FoundationError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("API key is not set (llm.api_key, ORCA_API_KEY or OPENAI_API_KEY)")]
    MissingApiKey,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        /// 서버가 알려준 대기 시간
        retry_after: Option<Duration>,
    },

    /// 메모리가 모델 컨텍스트보다 큼
    #[error("Context too long: {0}")]
    ContextTooLong(String),

    /// 5xx
    #[error("Service unavailable (HTTP {status}): {message}")]
    Unavailable { status: u16, message: String },

    /// 연결 실패, DNS, 타임아웃
    #[error("Transport error: {0}")]
    Transport(String),

    /// 나머지 4xx (모델 없음, 쿼터 초과, 잘못된 요청)
    #[error("Request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Malformed reply: {0}")]
    MalformedReply(String),
}

impl ProviderError {
    /// HTTP 상태와 에러 메시지로 분류
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => ProviderError::Unauthorized(message),
            429 => ProviderError::RateLimited {
                retry_after: retry_after_hint(&message),
                message,
            },
            500..=599 => ProviderError::Unavailable { status, message },
            _ => ProviderError::Rejected { status, message },
        }
    }

    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::MalformedReply(err.to_string())
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

impl Retryable for ProviderError {
    fn retry_decision(&self) -> RetryDecision {
        match self {
            ProviderError::RateLimited {
                retry_after: Some(wait),
                ..
            } => RetryDecision::After(*wait),
            ProviderError::RateLimited { .. }
            | ProviderError::Unavailable { .. }
            | ProviderError::Transport(_) => RetryDecision::Backoff,
            _ => RetryDecision::Stop,
        }
    }
}

/// "Please try again in 1.5s" / `{"retry_after": 2}` 에서 대기 시간 추출
pub(crate) fn retry_after_hint(text: &str) -> Option<Duration> {
    let secs = match serde_json::from_str::<serde_json::Value>(text) {
        Ok(json) => json
            .pointer("/error/retry_after")
            .or_else(|| json.get("retry_after"))
            .and_then(|v| v.as_f64()),
        Err(_) => {
            let at = text.find("try again in")?;
            let number: String = text[at..]
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            number.parse::<f64>().ok()
        }
    }?;
    (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs))
}

impl From<ProviderError> for FoundationError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::MissingApiKey => FoundationError::Config(err.to_string()),
            ProviderError::Transport(msg) => FoundationError::Http(msg),
            other => FoundationError::Provider(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            ProviderError::from_status(401, "bad key"),
            ProviderError::Unauthorized(_)
        ));
        assert!(matches!(
            ProviderError::from_status(503, "overloaded"),
            ProviderError::Unavailable { status: 503, .. }
        ));
        assert!(matches!(
            ProviderError::from_status(404, "no such model"),
            ProviderError::Rejected { status: 404, .. }
        ));
        assert_eq!(
            ProviderError::from_status(429, "Please try again in 1.5s."),
            ProviderError::RateLimited {
                message: "Please try again in 1.5s.".to_string(),
                retry_after: Some(Duration::from_millis(1500)),
            }
        );
    }

    #[test]
    fn test_retry_after_hint() {
        assert_eq!(
            retry_after_hint(r#"{"error":{"retry_after":2}}"#),
            Some(Duration::from_secs(2))
        );
        assert_eq!(retry_after_hint("slow down"), None);
    }

    #[test]
    fn test_retry_decisions() {
        assert_eq!(
            ProviderError::Transport("reset".into()).retry_decision(),
            RetryDecision::Backoff
        );
        assert_eq!(
            ProviderError::from_status(429, "busy").retry_decision(),
            RetryDecision::Backoff
        );
        assert_eq!(
            ProviderError::ContextTooLong("x".into()).retry_decision(),
            RetryDecision::Stop
        );
        assert_eq!(ProviderError::MissingApiKey.retry_decision(), RetryDecision::Stop);
    }

    #[test]
    fn test_into_orca_error() {
        let err: FoundationError = ProviderError::Transport("refused".into()).into();
        assert!(matches!(err, FoundationError::Http(_)));

        let err: FoundationError = ProviderError::MissingApiKey.into();
        assert!(matches!(err, FoundationError::Config(_)));

        let err: FoundationError = ProviderError::from_status(404, "gpt-9").into();
        assert!(matches!(err, FoundationError::Provider(ref m) if m.contains("gpt-9")));
    }
}
