//! # orca-foundation
//!
//! Foundation layer for Orca:
//! - Core: 핵심 Trait 정의 (Tool, Reasoner, ContextAugmentor)와 메시지 타입
//! - Config: TOML 설정 (LLM, Agent, MCP 세션 정의)
//! - Error: 에러 분류 (ConnectError, CapabilityNotFound, ...)
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Execution Loop                                         │
//! │        │ decide()              │ dispatch               │
//! │        ▼                       ▼                        │
//! │   Reasoner            Capability Registry               │
//! │                        ├── Local Tools                  │
//! │                        └── Session Tools (MCP)          │
//! │                                 │                       │
//! │                          Session Manager                │
//! │                          (stdio, sse)                   │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod core;
pub mod error;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Core (핵심 Trait 및 타입)
// ============================================================================
pub use self::core::{
    // Types (types.rs)
    Attachment,
    InvocationRecord,
    Message,
    MessageRole,
    TokenUsage,
    ToolCall,
    // Traits - Tool (traits.rs)
    CapabilityResult,
    Tool,
    ToolContext,
    // Traits - Reasoner / Context (traits.rs)
    CapabilitySchema,
    ContextAugmentor,
    ContextSnapshot,
    Decision,
    DecisionRequest,
    Reasoner,
    // Schema (schema.rs)
    validate_arguments,
};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{
    AgentConfig, ConflictPolicy, LlmConfig, McpConfig, McpServerConfig, OrcaConfig,
    StateProbeConfig, TransportKind, CONFIG_FILE,
};
