//! Capability Registry - 현재 호출 가능한 capability 목록
//!
//! 이름 → Capability 매핑의 단일 소스입니다.
//!
//! ## 규칙
//! - 이름은 항상 고유. 같은 이름을 다시 넣으면 정책에 따라 교체하거나 배치 전체를 거부
//! - `add_batch` / `remove_by_session`은 하나의 write lock 안에서 적용되어
//!   읽는 쪽은 절반만 적용된 상태를 볼 수 없음
//! - `list()`는 짧은 read lock으로 만든 스냅샷
//!
//! ```ignore
//! let registry = CapabilityRegistry::new(ConflictPolicy::Overwrite);
//! registry.add_batch(&Owner::session("fs"), caps)?;
//! let cap = registry.get("read_file")?;
//! registry.remove_by_session("fs");
//! ```

use super::{Capability, Owner};
use orca_foundation::{CapabilitySchema, ConflictPolicy, Error, Result, Tool};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Registry 변경 이벤트
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    /// 배치 추가됨
    Added { owner: Owner, names: Vec<String> },
    /// 다른 소유자의 항목을 교체함
    Replaced {
        name: String,
        previous: Owner,
        owner: Owner,
    },
    /// 세션 단위로 제거됨
    Removed { owner: Owner, names: Vec<String> },
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Arc<Capability>>,
    /// 삽입 순서
    order: Vec<String>,
}

/// Capability 레지스트리
pub struct CapabilityRegistry {
    inner: RwLock<Inner>,
    policy: ConflictPolicy,
    event_tx: broadcast::Sender<RegistryEvent>,
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new(ConflictPolicy::default())
    }
}

impl CapabilityRegistry {
    pub fn new(policy: ConflictPolicy) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            inner: RwLock::new(Inner::default()),
            policy,
            event_tx,
        }
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    // ========================================================================
    // 쓰기 (Session Manager / 초기화 경로)
    // ========================================================================

    /// 여러 capability를 한 번에 등록
    ///
    /// 모든 항목의 소유자는 `owner`로 태그됩니다. `ConflictPolicy::Reject`에서
    /// 다른 소유자의 이름과 겹치면 아무것도 적용하지 않고 에러를 반환합니다.
    pub fn add_batch(&self, owner: &Owner, capabilities: Vec<Capability>) -> Result<usize> {
        let mut events = Vec::new();
        let count;
        {
            let mut inner = self.inner.write();

            if self.policy == ConflictPolicy::Reject {
                let conflicts: Vec<String> = capabilities
                    .iter()
                    .filter_map(|cap| {
                        inner
                            .entries
                            .get(&cap.name)
                            .filter(|existing| &existing.owner != owner)
                            .map(|existing| format!("'{}' (owned by {})", cap.name, existing.owner))
                    })
                    .collect();
                if !conflicts.is_empty() {
                    return Err(Error::Config(format!(
                        "{} conflicts with existing capabilities: {}",
                        owner,
                        conflicts.join(", ")
                    )));
                }
            }

            let mut names = Vec::with_capacity(capabilities.len());
            for mut cap in capabilities {
                cap.owner = owner.clone();
                let name = cap.name.clone();

                match inner.entries.insert(name.clone(), Arc::new(cap)) {
                    Some(previous) if &previous.owner != owner => {
                        warn!(
                            "Capability '{}' from {} overwritten by {}",
                            name, previous.owner, owner
                        );
                        events.push(RegistryEvent::Replaced {
                            name: name.clone(),
                            previous: previous.owner.clone(),
                            owner: owner.clone(),
                        });
                    }
                    Some(_) => debug!("Capability '{}' re-registered by {}", name, owner),
                    None => inner.order.push(name.clone()),
                }
                names.push(name);
            }

            count = names.len();
            events.insert(
                0,
                RegistryEvent::Added {
                    owner: owner.clone(),
                    names,
                },
            );
        }

        info!("Registered {} capabilities from {}", count, owner);
        for event in events {
            let _ = self.event_tx.send(event);
        }
        Ok(count)
    }

    /// 로컬 도구 등록
    pub fn register_local(&self, tool: Arc<dyn Tool>) -> Result<usize> {
        self.add_batch(&Owner::Local, vec![Capability::local(tool)])
    }

    /// 세션이 소유한 capability를 모두 제거 (없으면 no-op)
    pub fn remove_by_session(&self, session_id: &str) -> Vec<String> {
        let owner = Owner::session(session_id);
        let removed: Vec<String> = {
            let mut inner = self.inner.write();
            let Inner { entries, order } = &mut *inner;

            let removed: Vec<String> = order
                .iter()
                .filter(|name| entries.get(*name).map(|c| c.owner == owner).unwrap_or(false))
                .cloned()
                .collect();
            for name in &removed {
                entries.remove(name);
            }
            order.retain(|name| entries.contains_key(name));
            removed
        };

        if !removed.is_empty() {
            info!(
                "Removed {} capabilities from session '{}'",
                removed.len(),
                session_id
            );
            let _ = self.event_tx.send(RegistryEvent::Removed {
                owner,
                names: removed.clone(),
            });
        }
        removed
    }

    // ========================================================================
    // 읽기 (Execution Loop)
    // ========================================================================

    /// 이름으로 조회
    pub fn get(&self, name: &str) -> Result<Arc<Capability>> {
        self.inner
            .read()
            .entries
            .get(name)
            .cloned()
            .ok_or_else(|| Error::CapabilityNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().entries.contains_key(name)
    }

    /// 현재 시점 스냅샷 (삽입 순서)
    pub fn list(&self) -> Vec<Arc<Capability>> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|name| inner.entries.get(name).cloned())
            .collect()
    }

    /// 추론 서비스용 스키마 목록
    pub fn schemas(&self) -> Vec<CapabilitySchema> {
        self.list().iter().map(|cap| cap.schema()).collect()
    }

    /// 세션이 소유한 이름들
    pub fn names_for_session(&self, session_id: &str) -> Vec<String> {
        let owner = Owner::session(session_id);
        self.list()
            .into_iter()
            .filter(|cap| cap.owner == owner)
            .map(|cap| cap.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// 변경 이벤트 구독
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Invoker;
    use serde_json::json;

    fn cap(name: &str) -> Capability {
        Capability {
            name: name.to_string(),
            description: String::new(),
            input_schema: json!({"type": "object"}),
            owner: Owner::Local,
            invoker: Invoker::Remote {
                remote_name: name.to_string(),
            },
        }
    }

    fn names(registry: &CapabilityRegistry) -> Vec<String> {
        registry.list().iter().map(|c| c.name.clone()).collect()
    }

    #[test]
    fn test_add_and_get() {
        let registry = CapabilityRegistry::default();
        let n = registry
            .add_batch(&Owner::session("fs"), vec![cap("read_file"), cap("write_file")])
            .unwrap();

        assert_eq!(n, 2);
        let found = registry.get("read_file").unwrap();
        assert_eq!(found.owner, Owner::session("fs"));
        assert!(matches!(
            registry.get("missing"),
            Err(Error::CapabilityNotFound(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_remove_by_session_is_idempotent() {
        let registry = CapabilityRegistry::default();
        registry
            .add_batch(&Owner::session("fs"), vec![cap("read_file")])
            .unwrap();
        registry
            .add_batch(&Owner::session("web"), vec![cap("fetch")])
            .unwrap();

        assert_eq!(registry.remove_by_session("fs"), vec!["read_file"]);
        let after_once = names(&registry);
        assert!(registry.remove_by_session("fs").is_empty());
        assert_eq!(names(&registry), after_once);
        assert_eq!(after_once, vec!["fetch"]);

        assert!(registry.remove_by_session("never-connected").is_empty());
    }

    #[test]
    fn test_overwrite_keeps_names_unique() {
        let registry = CapabilityRegistry::new(ConflictPolicy::Overwrite);
        registry
            .add_batch(&Owner::session("a"), vec![cap("search"), cap("a_only")])
            .unwrap();
        registry
            .add_batch(&Owner::session("b"), vec![cap("search")])
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(names(&registry), vec!["search", "a_only"]);
        assert_eq!(registry.get("search").unwrap().owner, Owner::session("b"));

        // a를 제거해도 b가 가져간 항목은 남음
        registry.remove_by_session("a");
        assert_eq!(names(&registry), vec!["search"]);
        registry.remove_by_session("b");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reject_policy_is_all_or_nothing() {
        let registry = CapabilityRegistry::new(ConflictPolicy::Reject);
        registry
            .add_batch(&Owner::session("a"), vec![cap("search")])
            .unwrap();

        let err = registry
            .add_batch(&Owner::session("b"), vec![cap("fresh"), cap("search")])
            .unwrap_err();
        assert!(err.to_string().contains("'search'"));
        assert!(!registry.contains("fresh"));
        assert_eq!(registry.get("search").unwrap().owner, Owner::session("a"));

        // 같은 소유자의 재등록은 충돌이 아님
        assert!(registry
            .add_batch(&Owner::session("a"), vec![cap("search")])
            .is_ok());
    }

    #[test]
    fn test_owner_tag_is_applied() {
        let registry = CapabilityRegistry::default();
        registry
            .add_batch(&Owner::session("fs"), vec![cap("x")])
            .unwrap();
        assert_eq!(registry.names_for_session("fs"), vec!["x"]);
        assert!(registry.names_for_session("other").is_empty());
    }

    #[tokio::test]
    async fn test_events() {
        let registry = CapabilityRegistry::default();
        let mut rx = registry.subscribe();

        registry
            .add_batch(&Owner::session("a"), vec![cap("x")])
            .unwrap();
        registry
            .add_batch(&Owner::session("b"), vec![cap("x")])
            .unwrap();
        registry.remove_by_session("b");

        assert_eq!(
            rx.recv().await.unwrap(),
            RegistryEvent::Added {
                owner: Owner::session("a"),
                names: vec!["x".into()]
            }
        );
        assert!(matches!(rx.recv().await.unwrap(), RegistryEvent::Added { .. }));
        assert!(matches!(
            rx.recv().await.unwrap(),
            RegistryEvent::Replaced { previous, .. } if previous == Owner::session("a")
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            RegistryEvent::Removed { names, .. } if names == vec!["x".to_string()]
        ));
    }

    #[test]
    fn test_concurrent_readers_never_see_partial_batch() {
        let registry = Arc::new(CapabilityRegistry::default());
        let batch: Vec<String> = (0..50).map(|i| format!("cap_{}", i)).collect();

        let reader = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                for _ in 0..2000 {
                    let n = registry.list().len();
                    assert!(n == 0 || n == 50, "observed partial state: {}", n);
                }
            })
        };

        for _ in 0..50 {
            registry
                .add_batch(
                    &Owner::session("bulk"),
                    batch.iter().map(|n| cap(n)).collect(),
                )
                .unwrap();
            registry.remove_by_session("bulk");
        }
        reader.join().unwrap();
    }
}
