//! Context augmentation
//!
//! 결정 요청 직전에 외부 상태(예: 브라우저 화면)를 합성 관찰로 주입합니다.
//!
//! `StateProbeAugmentor`는 감시 대상 capability가 최근 메시지에서 쓰였을 때만
//! probe capability를 호출해 그 결과를 스냅샷으로 돌려줍니다.

use crate::dispatch::Dispatcher;
use async_trait::async_trait;
use orca_core::RunContext;
use orca_foundation::{ContextAugmentor, ContextSnapshot, Message, StateProbeConfig};
use serde_json::Value;
use tracing::debug;

/// 감시 대상 사용 여부를 볼 최근 메시지 수
pub const DEFAULT_PROBE_WINDOW: usize = 3;

/// 감시 capability가 최근에 쓰였으면 probe capability로 상태를 가져오는 augmentor
pub struct StateProbeAugmentor {
    dispatcher: Dispatcher,
    /// 상태를 돌려주는 capability
    probe: String,
    probe_arguments: Value,
    /// 이 중 하나가 최근에 호출되었을 때만 동작
    watched: Vec<String>,
    window: usize,
    context: RunContext,
}

impl StateProbeAugmentor {
    pub fn new(dispatcher: Dispatcher, probe: impl Into<String>) -> Self {
        Self {
            dispatcher,
            probe: probe.into(),
            probe_arguments: Value::Object(Default::default()),
            watched: Vec::new(),
            window: DEFAULT_PROBE_WINDOW,
            context: RunContext::current("state-probe"),
        }
    }

    /// `[agent.state_probe]` 설정으로 생성
    pub fn from_config(dispatcher: Dispatcher, config: &StateProbeConfig) -> Self {
        let mut augmentor = config
            .watch
            .iter()
            .fold(Self::new(dispatcher, &config.probe), |a, name| a.watch(name))
            .with_window(config.window);
        if let Some(arguments) = &config.arguments {
            augmentor = augmentor.with_arguments(arguments.clone());
        }
        augmentor
    }

    pub fn watch(mut self, capability: impl Into<String>) -> Self {
        self.watched.push(capability.into());
        self
    }

    pub fn with_arguments(mut self, arguments: Value) -> Self {
        self.probe_arguments = arguments;
        self
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    fn recently_used(&self, messages: &[Message]) -> bool {
        let start = messages.len().saturating_sub(self.window);
        messages[start..]
            .iter()
            .any(|m| self.watched.iter().any(|name| m.mentions_capability(name)))
    }
}

#[async_trait]
impl ContextAugmentor for StateProbeAugmentor {
    async fn describe(&self, recent: &[Message]) -> Option<ContextSnapshot> {
        if !self.recently_used(recent) {
            return None;
        }

        match self
            .dispatcher
            .invoke(&self.probe, self.probe_arguments.clone(), &self.context)
            .await
        {
            Ok(result) if result.success => Some(ContextSnapshot {
                summary: format!("Current state:\n{}", result.output),
                attachment: result.attachment,
            }),
            Ok(result) => {
                debug!("State probe '{}' unavailable: {:?}", self.probe, result.error);
                None
            }
            Err(e) => {
                debug!("State probe '{}' unavailable: {}", self.probe, e);
                None
            }
        }
    }
}
