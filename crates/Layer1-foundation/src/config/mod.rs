//! Config Module - 설정 로드
//!
//! 우선순위 (뒤로 갈수록 높음):
//! 1. 글로벌: `~/.config/orca/config.toml`
//! 2. 프로젝트: `./.orca/config.toml`
//! 3. 명시적 경로 (`--config`)
//!
//! 테이블은 필드 단위로 병합되고, `id`를 가진 테이블 배열(`mcp.servers`)은 id 기준으로 병합됩니다.

mod env;
mod types;

pub use env::expand_env_var;
pub use types::{
    AgentConfig, ConflictPolicy, LlmConfig, McpConfig, McpServerConfig, OrcaConfig,
    StateProbeConfig, TransportKind,
};

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// 설정 파일명
pub const CONFIG_FILE: &str = "config.toml";

/// 프로젝트 설정 디렉토리
pub const PROJECT_DIR: &str = ".orca";

/// 글로벌 설정 경로
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("orca").join(CONFIG_FILE))
}

/// 프로젝트 설정 경로
pub fn project_config_path() -> PathBuf {
    PathBuf::from(PROJECT_DIR).join(CONFIG_FILE)
}

impl OrcaConfig {
    /// 글로벌 → 프로젝트 → 명시적 경로 순으로 병합 로드
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut paths: Vec<PathBuf> = Vec::new();
        if let Some(global) = global_config_path() {
            paths.push(global);
        }
        paths.push(project_config_path());

        let mut merged = toml::Value::Table(toml::map::Map::new());
        for path in paths.iter().filter(|p| p.is_file()) {
            debug!("Loading config: {}", path.display());
            merge_toml(&mut merged, read_toml(path)?);
        }

        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            debug!("Loading config: {}", path.display());
            merge_toml(&mut merged, read_toml(path)?);
        }

        let mut config: OrcaConfig = merged.try_into()?;
        config.expand_env();
        Ok(config)
    }

    /// 단일 파일 로드
    pub fn load_file(path: &Path) -> Result<Self> {
        let value = read_toml(path)?;
        let mut config: OrcaConfig = value.try_into()?;
        config.expand_env();
        Ok(config)
    }
}

fn read_toml(path: &Path) -> Result<toml::Value> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// overlay를 base에 병합
fn merge_toml(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => {
                        base_table.insert(key, value);
                    }
                }
            }
        }
        (toml::Value::Array(base_items), toml::Value::Array(overlay_items))
            if overlay_items.iter().all(has_id) =>
        {
            for item in overlay_items {
                let id = item.get("id").cloned();
                match base_items
                    .iter_mut()
                    .find(|existing| existing.get("id").cloned() == id)
                {
                    Some(existing) => *existing = item,
                    None => base_items.push(item),
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn has_id(value: &toml::Value) -> bool {
    value.get("id").and_then(toml::Value::as_str).is_some()
}
