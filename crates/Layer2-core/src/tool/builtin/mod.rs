//! Builtin Tools - 내장 도구들
//!
//! - `terminate` - 실행 종료 (status: success | failure)

pub mod terminate;

pub use terminate::TerminateTool;

use orca_foundation::Tool;
use std::sync::Arc;

/// 모든 builtin 도구 인스턴스 생성
pub fn builtin_tools() -> Vec<Arc<dyn Tool>> {
    vec![Arc::new(TerminateTool::new()) as Arc<dyn Tool>]
}
