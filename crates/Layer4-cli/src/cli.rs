//! Non-interactive CLI mode

use orca_agent::{truncate, Agent, AgentEvent, CancellationToken, RunReport, StateProbeAugmentor};
use orca_core::{CapabilityRegistry, RegistryEvent, SessionInfo, SessionManager};
use orca_foundation::OrcaConfig;
use orca_provider::OpenAiReasoner;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

/// Run a single prompt until the agent finishes, is cancelled or runs out of steps
pub async fn run_once(config: &OrcaConfig, prompt: &str) -> anyhow::Result<RunReport> {
    let reasoner = Arc::new(OpenAiReasoner::from_config(&config.llm)?);
    info!("Using model: {}", reasoner.model());

    // Create event channel
    let (tx, mut rx) = mpsc::channel(100);
    let mut agent = Agent::create(config, reasoner, vec![]).await?.with_events(tx);
    if let Some(probe) = &config.agent.state_probe {
        info!("State probe: {} (watching {})", probe.probe, probe.watch.join(", "));
        let augmentor = StateProbeAugmentor::from_config(agent.dispatcher(), probe);
        agent = agent.with_augmentor(Arc::new(augmentor));
    }

    // Spawn event handler
    let event_handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                AgentEvent::Thinking { step } => {
                    eprintln!("── step {} ──", step);
                }
                AgentEvent::ContextInjected { summary } => {
                    eprintln!("[state] {}", one_line(&summary, 100));
                }
                AgentEvent::Decision { content, .. } if !content.trim().is_empty() => {
                    eprintln!("{}", content.trim());
                }
                AgentEvent::ToolStart { name, .. } => {
                    eprintln!("[{}] Running...", name);
                }
                AgentEvent::ToolComplete {
                    name,
                    success,
                    output,
                    ..
                } => {
                    let status = if success { "✓" } else { "✗" };
                    eprintln!("[{}] {} {}", name, status, one_line(&output, 100));
                }
                AgentEvent::Finished { .. } => break,
                _ => {}
            }
        }
    });

    // Ctrl-C는 토큰으로 실행 취소
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            on_signal.cancel();
        }
    });

    let report = agent.run(prompt, cancel).await;
    drop(agent);
    let _ = event_handle.await;

    if let Some(text) = report.final_text() {
        println!("{}", text);
    }
    eprintln!(
        "\n[{} after {} steps, {} tokens]",
        report.outcome,
        report.steps,
        report.usage.total()
    );

    Ok(report)
}

/// 설정된 세션에 연결해 상태와 capability를 출력하고 정리
pub async fn list_servers(config: &OrcaConfig) -> anyhow::Result<()> {
    config.validate()?;

    let servers = config.mcp.resolved();
    if servers.is_empty() {
        println!("No MCP servers configured.");
        return Ok(());
    }

    let registry = Arc::new(CapabilityRegistry::new(config.agent.on_conflict));
    let mut events = registry.subscribe();
    let sessions = SessionManager::new(registry);
    sessions.connect_all(servers).await;

    println!();
    for info in sessions.sessions() {
        print!("{}", describe_session(&info));
    }
    for line in overwrite_notes(&mut events) {
        println!("{}", line);
    }
    println!();

    sessions.disconnect_all().await;
    Ok(())
}

/// stdin에서 한 줄 읽기
pub async fn read_prompt() -> anyhow::Result<String> {
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(line.trim().to_string())
}

fn describe_session(info: &SessionInfo) -> String {
    let mut out = format!(
        "{:<16} {:<6} {:<13} {}\n",
        info.id,
        info.kind.to_string(),
        info.state.to_string(),
        info.target
    );
    if let Some(error) = &info.last_error {
        out.push_str(&format!("    error: {}\n", error));
    }
    for name in &info.capabilities {
        out.push_str(&format!("    - {}\n", name));
    }
    out
}

/// 연결 중에 생긴 이름 충돌 (나중에 연결된 세션이 이김)
fn overwrite_notes(events: &mut broadcast::Receiver<RegistryEvent>) -> Vec<String> {
    let mut notes = Vec::new();
    loop {
        match events.try_recv() {
            Ok(RegistryEvent::Replaced {
                name,
                previous,
                owner,
            }) => notes.push(format!("note: '{}' from {} replaced by {}", name, previous, owner)),
            Ok(_) => {}
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                warn!("Missed {} registry events", n);
            }
            Err(_) => break,
        }
    }
    notes
}

/// Truncate a string for display
fn one_line(s: &str, max_len: usize) -> String {
    truncate(&s.replace('\n', " "), max_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use orca_core::SessionState;
    use orca_foundation::TransportKind;

    #[test]
    fn test_describe_active_session() {
        let info = SessionInfo {
            id: "fs".to_string(),
            kind: TransportKind::Stdio,
            target: "mcp-server-fs /tmp".to_string(),
            state: SessionState::Active,
            capabilities: vec!["read_file".to_string(), "write_file".to_string()],
            last_error: None,
        };

        let text = describe_session(&info);
        assert!(text.starts_with("fs"));
        assert!(text.contains("active"));
        assert!(text.contains("    - read_file\n"));
        assert!(!text.contains("error:"));
    }

    #[test]
    fn test_describe_failed_session() {
        let info = SessionInfo {
            id: "web".to_string(),
            kind: TransportKind::Sse,
            target: "http://localhost:9000/sse".to_string(),
            state: SessionState::Failed,
            capabilities: vec![],
            last_error: Some("connection refused".to_string()),
        };

        let text = describe_session(&info);
        assert!(text.contains("failed"));
        assert!(text.contains("error: connection refused"));
    }

    #[test]
    fn test_overwrite_notes() {
        use orca_core::{Capability, Invoker, Owner};

        let cap = |name: &str| Capability {
            name: name.to_string(),
            description: String::new(),
            input_schema: serde_json::json!({"type": "object"}),
            owner: Owner::Local,
            invoker: Invoker::Remote {
                remote_name: name.to_string(),
            },
        };
        let registry = CapabilityRegistry::default();
        let mut events = registry.subscribe();
        registry
            .add_batch(&Owner::session("a"), vec![cap("search"), cap("fetch")])
            .unwrap();
        registry
            .add_batch(&Owner::session("b"), vec![cap("search")])
            .unwrap();

        assert_eq!(
            overwrite_notes(&mut events),
            vec!["note: 'search' from session:a replaced by session:b".to_string()]
        );
        assert!(overwrite_notes(&mut events).is_empty());
    }

    #[test]
    fn test_one_line() {
        assert_eq!(one_line("a\nb", 10), "a b");
        assert!(one_line(&"x".repeat(50), 10).starts_with("xxxxxxxxxx..."));
    }

    #[tokio::test]
    async fn test_list_servers_without_sessions() {
        let config = OrcaConfig::default();
        assert!(list_servers(&config).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_servers_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[[mcp.servers]]
id = "broken"
type = "stdio"
"#,
        )
        .unwrap();

        let config = OrcaConfig::load_file(&path).unwrap();
        let err = list_servers(&config).await.unwrap_err();
        assert!(err.to_string().contains("requires 'command'"));
    }
}
