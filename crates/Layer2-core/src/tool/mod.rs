//! Tool - 로컬 도구
//!
//! 프로세스 안에서 실행되는 도구와 실행 컨텍스트.
//! 세션이 제공하는 도구와 같은 registry에 `Owner::Local`로 등록됩니다.

pub mod builtin;
mod context;

pub use builtin::{builtin_tools, TerminateTool};
pub use context::RunContext;
