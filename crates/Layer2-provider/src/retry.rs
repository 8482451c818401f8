//! Retry with exponential backoff
//!
//! 추론 서비스 호출 한 번을 재시도합니다. 재시도 여부는 에러가 스스로 판단합니다
//! (`Retryable`): 429는 서버가 준 대기 시간을, 5xx와 네트워크 에러는 backoff를 씁니다.

use std::future::Future;
use std::time::{Duration, SystemTime};
use tokio::time::sleep;
use tracing::{debug, warn};

/// 실패 후 다음 동작
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// 영구 실패
    Stop,
    /// backoff 후 재시도
    Backoff,
    /// 서버가 알려준 시간 후 재시도
    After(Duration),
}

/// 재시도 판단이 가능한 에러
pub trait Retryable {
    fn retry_decision(&self) -> RetryDecision;
}

/// Backoff policy
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// 첫 시도 이후 최대 재시도 횟수
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// 지연에 ±20% 흔들림
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// `retry`번째 재시도 전 대기 시간 (0부터, 매번 두 배, `max_delay`에서 멈춤)
    pub fn backoff(&self, retry: u32) -> Duration {
        let doubled = self
            .base_delay
            .checked_mul(1u32.checked_shl(retry).unwrap_or(u32::MAX))
            .unwrap_or(self.max_delay);
        let delay = doubled.min(self.max_delay);

        if self.jitter {
            delay.mul_f64(0.8 + clock_fraction() * 0.4)
        } else {
            delay
        }
    }
}

/// 0.0 ~ 1.0, 시계 나노초 기반
fn clock_fraction() -> f64 {
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    f64::from(nanos % 1000) / 1000.0
}

/// `operation`을 정책에 따라 재시도
pub async fn with_retry<T, E, F, Fut>(config: &RetryConfig, label: &str, mut operation: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut retries = 0;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        let wait = match err.retry_decision() {
            RetryDecision::Stop => {
                debug!("{} failed permanently: {}", label, err);
                return Err(err);
            }
            _ if retries >= config.max_retries => {
                warn!("{} failed after {} retries: {}", label, retries, err);
                return Err(err);
            }
            RetryDecision::After(wait) => wait,
            RetryDecision::Backoff => config.backoff(retries),
        };

        retries += 1;
        warn!(
            "{} failed ({}), retry {}/{} in {:?}",
            label, err, retries, config.max_retries, wait
        );
        sleep(wait).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Failure(RetryDecision);

    impl std::fmt::Display for Failure {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self.0)
        }
    }

    impl Retryable for Failure {
        fn retry_decision(&self) -> RetryDecision {
            self.0
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = RetryConfig {
            jitter: false,
            ..Default::default()
        };

        assert_eq!(config.backoff(0), Duration::from_secs(1));
        assert_eq!(config.backoff(1), Duration::from_secs(2));
        assert_eq!(config.backoff(2), Duration::from_secs(4));
        assert_eq!(config.backoff(6), Duration::from_secs(30));
        assert_eq!(config.backoff(40), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let config = RetryConfig::default();
        let delay = config.backoff(1);
        assert!(delay >= Duration::from_millis(1590));
        assert!(delay <= Duration::from_millis(2410));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, Failure> = with_retry(&RetryConfig::default(), "decide", || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Failure(RetryDecision::Backoff))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_hint_is_used_and_retries_are_bounded() {
        let attempts = AtomicU32::new(0);
        let started = tokio::time::Instant::now();
        let result: Result<(), Failure> = with_retry(&RetryConfig::default(), "decide", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(Failure(RetryDecision::After(Duration::from_millis(500)))) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert!(started.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), Failure> = with_retry(&RetryConfig::default(), "decide", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(Failure(RetryDecision::Stop)) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
