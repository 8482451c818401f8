//! # orca-agent
//!
//! Orca의 실행 루프 - 결정을 받고, capability를 호출하고, 관찰을 메모리에 쌓는
//! 단순한 반복입니다.
//!
//! ## 핵심 원칙
//!
//! 1. **Serialized Steps** - 한 실행 안에서 스텝은 겹치지 않음
//! 2. **Errors Are Observations** - 스텝 안의 실패는 추론 서비스에 되돌려줌
//! 3. **Scoped Sessions** - 실행이 어떻게 끝나든 세션 정리는 한 번
//!
//! ## 핵심 컴포넌트
//!
//! - **Agent**: 실행 루프와 수명 관리
//! - **Dispatcher**: 디스패치 시점 조회, 인자 검증, 로컬/원격 호출
//! - **Memory**: 추가 전용 메시지 기록
//! - **StateProbeAugmentor**: 결정 전 외부 상태 주입
//!
//! ## 사용 예
//!
//! ```ignore
//! use orca_agent::{Agent, AgentEvent};
//! use tokio_util::sync::CancellationToken;
//!
//! let agent = Agent::create(&config, reasoner, vec![]).await?;
//!
//! let cancel = CancellationToken::new();
//! let report = agent.run("Summarize README.md", cancel.clone()).await;
//! println!("{} after {} steps", report.outcome, report.steps);
//! ```

pub mod agent;
pub mod context;
pub mod dispatch;
pub mod memory;
pub mod state;
pub mod stuck;

pub use agent::{Agent, AgentEvent};
pub use context::StateProbeAugmentor;
pub use dispatch::{truncate, Dispatcher, TRUNCATION_MARKER};
pub use memory::Memory;
pub use state::{AgentPhase, ExecutionState, RunOutcome, RunReport};
pub use stuck::DuplicateDetector;

pub use tokio_util::sync::CancellationToken;
