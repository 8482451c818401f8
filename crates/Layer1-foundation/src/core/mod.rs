//! Core Module - 핵심 인터페이스 및 타입
//!
//! ## 타입 계층
//!
//! - `types.rs`: 데이터 타입 (Message, ToolCall, Attachment 등)
//! - `traits.rs`: 인터페이스 (Tool, Reasoner, ContextAugmentor)
//! - `schema.rs`: capability 인자 검증
//!
//! ## Capability 유형
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Capability Registry                       │
//! │  ┌─────────────────┐  ┌─────────────────┐                   │
//! │  │  Local Tools    │  │  Session Tools  │                   │
//! │  │  └── terminate  │  │  ├── read_file  │                   │
//! │  │                 │  │  └── ...        │                   │
//! │  └────────┬────────┘  └────────┬────────┘                   │
//! │           ▼                    ▼                            │
//! │    Tool::execute       Session Manager (stdio / sse)        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod schema;
pub mod traits;
pub mod types;

// Message & Role
pub use types::{Attachment, InvocationRecord, Message, MessageRole, TokenUsage, ToolCall};

// Tool trait & related
pub use traits::{CapabilityResult, Tool, ToolContext};

// Reasoner & Context
pub use traits::{
    CapabilitySchema, ContextAugmentor, ContextSnapshot, Decision, DecisionRequest, Reasoner,
};

pub use schema::validate_arguments;
