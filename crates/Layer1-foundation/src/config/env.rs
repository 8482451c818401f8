//! 환경변수 확장
//! - ${VAR}: 환경변수 값 (없으면 빈 문자열)
//! - ${VAR:-default}: 환경변수가 없으면 기본값

use regex::{Captures, Regex};
use std::sync::OnceLock;

fn pattern() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").ok())
        .as_ref()
}

/// 문자열 안의 `${...}` 참조를 현재 프로세스 환경으로 치환
pub fn expand_env_var(value: &str) -> String {
    expand_with(value, |name| std::env::var(name).ok())
}

pub(crate) fn expand_with<F>(value: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    if !value.contains("${") {
        return value.to_string();
    }
    let Some(re) = pattern() else {
        return value.to_string();
    };

    re.replace_all(value, |caps: &Captures| {
        let name = &caps[1];
        match (lookup(name), caps.get(2)) {
            (Some(v), _) if !v.is_empty() => v,
            (_, Some(default)) => default.as_str().to_string(),
            (Some(v), None) => v,
            (None, None) => String::new(),
        }
    })
    .into_owned()
}
