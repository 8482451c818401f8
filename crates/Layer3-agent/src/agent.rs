//! Core agent implementation
//!
//! 결정 → 실행 → 관찰을 반복하는 실행 루프입니다.
//!
//! ```text
//! ┌─────────┐  decide   ┌──────────┐  dispatch  ┌────────────┐
//! │ Memory  │ ────────▶ │ Reasoner │ ─────────▶ │ Dispatcher │
//! └─────────┘           └──────────┘            └────────────┘
//!      ▲                                              │
//!      └──────────────── observations ◀───────────────┘
//! ```
//!
//! - 한 실행 안에서 스텝은 겹치지 않음
//! - 스텝 안의 에러는 관찰로 바뀌고 루프는 계속됨
//! - 어떤 경로로 끝나든 세션 정리는 정확히 한 번

use crate::dispatch::Dispatcher;
use crate::memory::Memory;
use crate::state::{ExecutionState, RunOutcome, RunReport};
use crate::stuck::DuplicateDetector;
use orca_core::{builtin_tools, CapabilityRegistry, RunContext, SessionManager, SessionState};
use orca_foundation::{
    AgentConfig, ContextAugmentor, DecisionRequest, Error, Message, OrcaConfig, Reasoner, Result,
    TokenUsage, Tool, ToolCall,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Events emitted by the agent during execution
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// 스텝 시작 (결정 요청 전)
    Thinking { step: u32 },

    /// 외부 상태가 주입됨
    ContextInjected { summary: String },

    /// 결정 수신
    Decision {
        content: String,
        invocations: Vec<String>,
    },

    /// 결정된 호출 실행 시작
    Acting { step: u32 },

    /// Capability execution started
    ToolStart { name: String, call_id: String },

    /// Capability execution completed
    ToolComplete {
        name: String,
        call_id: String,
        output: String,
        success: bool,
    },

    /// 실행 종료
    Finished { outcome: RunOutcome, steps: u32 },
}

/// The agent: registry + sessions + reasoner + loop policy
pub struct Agent {
    config: AgentConfig,
    reasoner: Arc<dyn Reasoner>,
    registry: Arc<CapabilityRegistry>,
    sessions: Arc<SessionManager>,
    dispatcher: Dispatcher,
    augmentor: Option<Arc<dyn ContextAugmentor>>,
    event_tx: Option<mpsc::Sender<AgentEvent>>,
    working_dir: PathBuf,
    running: AtomicBool,
    shut_down: AtomicBool,
}

impl Agent {
    /// 설정 검증 → 로컬 도구 등록 → 세션 연결
    ///
    /// 설정 에러만 여기서 실패합니다. 개별 세션 연결 실패는 Failed로 기록됩니다.
    pub async fn create(
        config: &OrcaConfig,
        reasoner: Arc<dyn Reasoner>,
        tools: Vec<Arc<dyn Tool>>,
    ) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(CapabilityRegistry::new(config.agent.on_conflict));
        for tool in builtin_tools().into_iter().chain(tools) {
            registry
                .register_local(tool)
                .map_err(|e| Error::Initialization(e.to_string()))?;
        }

        let sessions = Arc::new(SessionManager::new(Arc::clone(&registry)));
        let servers = config.mcp.resolved();
        if !servers.is_empty() {
            let results = sessions.connect_all(servers).await;
            let failed: Vec<&str> = results
                .iter()
                .filter(|(_, state)| *state != SessionState::Active)
                .map(|(id, _)| id.as_str())
                .collect();
            if failed.is_empty() {
                info!("Connected {} sessions", results.len());
            } else {
                warn!(
                    "Connected {}/{} sessions (failed: {})",
                    results.len() - failed.len(),
                    results.len(),
                    failed.join(", ")
                );
            }
        }

        let dispatcher = Dispatcher::new(Arc::clone(&registry), Arc::clone(&sessions))
            .with_max_observe(config.agent.max_observe);

        Ok(Self {
            config: config.agent.clone(),
            reasoner,
            registry,
            sessions,
            dispatcher,
            augmentor: None,
            event_tx: None,
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            running: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn with_augmentor(mut self, augmentor: Arc<dyn ContextAugmentor>) -> Self {
        self.augmentor = Some(augmentor);
        self
    }

    pub fn with_events(mut self, event_tx: mpsc::Sender<AgentEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// 이 agent의 registry/세션으로 호출하는 dispatcher (augmentor 구성용)
    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher.clone()
    }

    /// 모든 세션 정리. 처음 호출에서만 동작하고 true 반환
    pub async fn shutdown(&self) -> bool {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return false;
        }
        let closed = self.sessions.disconnect_all().await;
        info!("Agent shut down ({} sessions closed)", closed);
        true
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    // ========================================================================
    // Run
    // ========================================================================

    /// 프롬프트로 실행. 끝나면 (취소/에러 포함) 세션을 정리합니다
    pub async fn run(&self, prompt: &str, cancel: CancellationToken) -> RunReport {
        if self.is_shut_down() {
            return RunReport {
                outcome: RunOutcome::Error("agent has been shut down".to_string()),
                steps: 0,
                memory: Memory::new(),
                usage: TokenUsage::default(),
            };
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return RunReport {
                outcome: RunOutcome::Error("agent is already running".to_string()),
                steps: 0,
                memory: Memory::new(),
                usage: TokenUsage::default(),
            };
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        let context = RunContext::new(&run_id, &self.working_dir);
        info!("Run {} started", run_id);

        let mut memory = Memory::new();
        memory.push(Message::user(prompt));
        let mut state = ExecutionState::default();
        let mut usage = TokenUsage::default();

        let (outcome, cancelled) = tokio::select! {
            biased;
            _ = cancel.cancelled() => (RunOutcome::cancelled(), true),
            outcome = self.run_loop(&mut memory, &mut state, &mut usage, &context) => (outcome, false),
        };

        if cancelled {
            // 중단된 호출은 실패 관찰로 남김
            for call in memory.unanswered_calls() {
                memory.push(Message::observation(&call, "Error: Cancelled", true));
            }
            warn!("Run {} cancelled at step {}", run_id, state.step);
        }
        state.finish(&outcome);

        self.shutdown().await;
        self.running.store(false, Ordering::SeqCst);

        match &outcome {
            RunOutcome::Error(msg) => error!("Run {} ended with error: {}", run_id, msg),
            other => info!("Run {} finished: {} after {} steps", run_id, other, state.step),
        }
        self.emit(AgentEvent::Finished {
            outcome: outcome.clone(),
            steps: state.step,
        })
        .await;

        RunReport {
            outcome,
            steps: state.step,
            memory,
            usage,
        }
    }

    async fn run_loop(
        &self,
        memory: &mut Memory,
        state: &mut ExecutionState,
        usage: &mut TokenUsage,
        context: &RunContext,
    ) -> RunOutcome {
        let mut detector = DuplicateDetector::new(self.config.duplicate_threshold);

        while state.step < self.config.max_steps {
            let step = state.begin_step();
            self.emit(AgentEvent::Thinking { step }).await;

            // 1. 외부 상태 주입
            if let Some(augmentor) = &self.augmentor {
                if let Some(snapshot) = augmentor.describe(memory.messages()).await {
                    self.emit(AgentEvent::ContextInjected {
                        summary: snapshot.summary.clone(),
                    })
                    .await;
                    memory.push(Message::context(snapshot.summary, snapshot.attachment));
                }
            }

            // 2. 결정
            let schemas = self.registry.schemas();
            let request = DecisionRequest {
                messages: memory.messages(),
                capabilities: &schemas,
                system_prompt: self.config.system_prompt.as_deref(),
                next_step_prompt: self.config.next_step_prompt.as_deref(),
            };
            let decision = match self.reasoner.decide(request).await {
                Ok(decision) => decision,
                Err(e) => return RunOutcome::Error(e.to_string()),
            };
            if let Some(u) = &decision.usage {
                usage.add(u);
            }

            let names: Vec<String> = decision.invocations.iter().map(|c| c.name.clone()).collect();
            debug!("Step {}: decision with {} invocations {:?}", step, names.len(), names);
            self.emit(AgentEvent::Decision {
                content: decision.content.clone(),
                invocations: names,
            })
            .await;

            memory.push(Message::assistant_with_tools(
                decision.content.clone(),
                decision.invocations.clone(),
            ));

            state.begin_acting();
            self.emit(AgentEvent::Acting { step }).await;

            // 3. terminate
            if let Some(call) = decision
                .invocations
                .iter()
                .find(|c| self.config.is_special_tool(&c.name))
            {
                self.act(std::slice::from_ref(call), memory, context).await;
                info!("Terminate capability '{}' selected at step {}", call.name, step);
                return RunOutcome::Done;
            }

            // 4. 실행
            self.act(&decision.invocations, memory, context).await;

            if detector.observe(&decision) {
                warn!(
                    "Same decision repeated {} times, stopping at step {}",
                    detector.repeats() + 1,
                    step
                );
                return RunOutcome::MaxSteps;
            }
        }

        info!("Reached max steps ({})", self.config.max_steps);
        RunOutcome::MaxSteps
    }

    async fn act(&self, calls: &[ToolCall], memory: &mut Memory, context: &RunContext) {
        if calls.is_empty() {
            return;
        }

        if self.config.parallel_dispatch && calls.len() > 1 {
            for call in calls {
                self.emit_start(call).await;
            }
            let observations = self.dispatcher.dispatch_parallel(calls, context).await;
            for (call, observation) in calls.iter().zip(observations) {
                self.emit_complete(call, &observation).await;
                memory.push(observation);
            }
        } else {
            for call in calls {
                self.emit_start(call).await;
                let observation = self.dispatcher.dispatch(call, context).await;
                self.emit_complete(call, &observation).await;
                memory.push(observation);
            }
        }
    }

    // ========================================================================
    // Events
    // ========================================================================

    async fn emit(&self, event: AgentEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }

    async fn emit_start(&self, call: &ToolCall) {
        self.emit(AgentEvent::ToolStart {
            name: call.name.clone(),
            call_id: call.id.clone(),
        })
        .await;
    }

    async fn emit_complete(&self, call: &ToolCall, observation: &Message) {
        self.emit(AgentEvent::ToolComplete {
            name: call.name.clone(),
            call_id: call.id.clone(),
            output: observation.content.clone(),
            success: !observation.is_error_observation(),
        })
        .await;
    }
}
