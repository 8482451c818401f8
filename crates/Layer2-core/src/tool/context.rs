//! Tool Context - 도구 실행 컨텍스트

use orca_foundation::ToolContext;
use std::path::{Path, PathBuf};

/// 한 번의 실행(run) 동안 도구에 전달되는 컨텍스트
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: String,
    working_dir: PathBuf,
}

impl RunContext {
    pub fn new(run_id: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_id: run_id.into(),
            working_dir: working_dir.into(),
        }
    }

    /// 현재 디렉토리 기준 컨텍스트
    pub fn current(run_id: impl Into<String>) -> Self {
        let dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::new(run_id, dir)
    }
}

impl ToolContext for RunContext {
    fn run_id(&self) -> &str {
        &self.run_id
    }

    fn working_dir(&self) -> &Path {
        &self.working_dir
    }
}
