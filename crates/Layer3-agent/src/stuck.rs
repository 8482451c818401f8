//! Stuck-loop detection
//!
//! 같은 결정(텍스트 + 호출 이름/인자)이 연속으로 반복되면 실행을 멈춥니다.

use orca_foundation::Decision;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
struct Fingerprint {
    content: String,
    calls: Vec<(String, Value)>,
}

impl From<&Decision> for Fingerprint {
    fn from(decision: &Decision) -> Self {
        Self {
            content: decision.content.trim().to_string(),
            calls: decision
                .invocations
                .iter()
                .map(|c| (c.name.clone(), c.arguments.clone()))
                .collect(),
        }
    }
}

/// 연속 중복 결정 감지기
#[derive(Debug, Clone)]
pub struct DuplicateDetector {
    /// 허용되는 연속 반복 횟수 (0 = 비활성)
    threshold: u32,
    last: Option<Fingerprint>,
    repeats: u32,
}

impl DuplicateDetector {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            last: None,
            repeats: 0,
        }
    }

    /// 결정을 기록하고 반복이 임계값에 도달했으면 true
    pub fn observe(&mut self, decision: &Decision) -> bool {
        if self.threshold == 0 {
            return false;
        }

        let fingerprint = Fingerprint::from(decision);
        if self.last.as_ref() == Some(&fingerprint) {
            self.repeats += 1;
        } else {
            self.last = Some(fingerprint);
            self.repeats = 0;
        }
        self.repeats >= self.threshold
    }

    pub fn repeats(&self) -> u32 {
        self.repeats
    }
}
