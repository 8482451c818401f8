//! Run memory
//!
//! 한 번의 실행(run) 동안 쌓이는 메시지 목록. 추가만 가능하고 순서는 바뀌지 않습니다.

use orca_foundation::{Message, MessageRole, ToolCall};

/// Append-only message memory for a run
#[derive(Debug, Clone, Default)]
pub struct Memory {
    messages: Vec<Message>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// All messages in order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// 마지막 `n`개 (suffix view)
    pub fn recent(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Get the last assistant message
    pub fn last_assistant(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant)
    }

    /// 마지막 결정의 호출 중 아직 관찰이 없는 것들
    pub fn unanswered_calls(&self) -> Vec<ToolCall> {
        let Some(pos) = self
            .messages
            .iter()
            .rposition(|m| m.role == MessageRole::Assistant)
        else {
            return Vec::new();
        };
        let Some(calls) = &self.messages[pos].tool_calls else {
            return Vec::new();
        };

        let answered: Vec<&str> = self.messages[pos + 1..]
            .iter()
            .filter_map(|m| m.invocation.as_ref().map(|i| i.call_id.as_str()))
            .collect();

        calls
            .iter()
            .filter(|c| !answered.contains(&c.id.as_str()))
            .cloned()
            .collect()
    }
}
