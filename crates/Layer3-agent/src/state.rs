//! Execution state
//!
//! Agent 실행 단계와 결과입니다.

use crate::memory::Memory;
use orca_foundation::TokenUsage;
use std::fmt;

// ============================================================================
// AgentPhase - 실행 단계
// ============================================================================

/// 실행 단계
///
/// ```text
/// Thinking ──▶ Acting ──▶ Thinking ──▶ ... ──▶ Done | Terminated | Error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentPhase {
    /// 결정 요청 중
    Thinking,
    /// 호출 실행 중
    Acting,
    /// terminate capability로 종료
    Done,
    /// 최대 스텝 도달 (또는 반복 감지)
    Terminated,
    Error,
}

impl AgentPhase {
    /// 종료 상태 여부
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AgentPhase::Done | AgentPhase::Terminated | AgentPhase::Error
        )
    }
}

impl fmt::Display for AgentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentPhase::Thinking => "thinking",
            AgentPhase::Acting => "acting",
            AgentPhase::Done => "done",
            AgentPhase::Terminated => "terminated",
            AgentPhase::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// 한 실행의 상태 (스텝 카운터는 단조 증가)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionState {
    pub step: u32,
    pub phase: AgentPhase,
}

impl Default for ExecutionState {
    fn default() -> Self {
        Self {
            step: 0,
            phase: AgentPhase::Thinking,
        }
    }
}

impl ExecutionState {
    pub fn begin_step(&mut self) -> u32 {
        self.step += 1;
        self.phase = AgentPhase::Thinking;
        self.step
    }

    /// 결정을 받은 뒤 호출 실행으로 전환
    pub fn begin_acting(&mut self) {
        if self.phase == AgentPhase::Thinking {
            self.phase = AgentPhase::Acting;
        }
    }

    pub fn finish(&mut self, outcome: &RunOutcome) {
        self.phase = match outcome {
            RunOutcome::Done => AgentPhase::Done,
            RunOutcome::MaxSteps => AgentPhase::Terminated,
            RunOutcome::Error(_) => AgentPhase::Error,
        };
    }
}

// ============================================================================
// RunOutcome / RunReport
// ============================================================================

/// 실행 결과 (항상 셋 중 하나)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Done,
    /// Terminated(MaxSteps)
    MaxSteps,
    Error(String),
}

impl RunOutcome {
    pub fn cancelled() -> Self {
        RunOutcome::Error("cancelled".to_string())
    }

    pub fn is_done(&self) -> bool {
        matches!(self, RunOutcome::Done)
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Done => write!(f, "done"),
            RunOutcome::MaxSteps => write!(f, "terminated (max steps)"),
            RunOutcome::Error(msg) => write!(f, "error: {}", msg),
        }
    }
}

/// `Agent::run`의 보고서
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// 진행된 스텝 수
    pub steps: u32,
    pub memory: Memory,
    pub usage: TokenUsage,
}

impl RunReport {
    /// 종료 단계
    pub fn phase(&self) -> AgentPhase {
        let mut state = ExecutionState {
            step: self.steps,
            phase: AgentPhase::Thinking,
        };
        state.finish(&self.outcome);
        state.phase
    }

    /// 마지막 assistant 응답 텍스트
    pub fn final_text(&self) -> Option<&str> {
        self.memory
            .last_assistant()
            .map(|m| m.content.as_str())
            .filter(|s| !s.is_empty())
    }
}
