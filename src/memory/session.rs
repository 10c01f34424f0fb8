//! 会话记忆：按 token 上限滚动的对话缓冲
//!
//! 每次 push 后若总 token 超过 max_tokens，则从最旧的消息开始淘汰；
//! 最新一条消息即使单独超限也会保留。内部用 Mutex 串行化同一运行内的并发写入
//! （工具结果写入与对话写入可能交错）。

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use crate::memory::{Message, TokenEstimator};

#[derive(Debug, Default)]
struct SessionBuffer {
    /// (消息, 估算 token 数)
    entries: VecDeque<(Message, usize)>,
    total_tokens: usize,
}

/// token 上限的滚动会话缓冲
#[derive(Debug)]
pub struct SessionMemory {
    buffer: Mutex<SessionBuffer>,
    max_tokens: usize,
}

impl SessionMemory {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            buffer: Mutex::new(SessionBuffer::default()),
            max_tokens,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionBuffer> {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 追加一条消息并按需淘汰最旧的消息
    pub fn push(&self, msg: Message) {
        let tokens = TokenEstimator::estimate(&msg.content);
        let mut buf = self.lock();
        buf.entries.push_back((msg, tokens));
        buf.total_tokens += tokens;
        while buf.total_tokens > self.max_tokens && buf.entries.len() > 1 {
            if let Some((_, evicted)) = buf.entries.pop_front() {
                buf.total_tokens -= evicted;
            }
        }
    }

    /// 当前保留的消息（从旧到新）
    pub fn messages(&self) -> Vec<Message> {
        self.lock().entries.iter().map(|(m, _)| m.clone()).collect()
    }

    pub fn total_tokens(&self) -> usize {
        self.lock().total_tokens
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn clear(&self) {
        let mut buf = self.lock();
        buf.entries.clear();
        buf.total_tokens = 0;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn contents(mem: &SessionMemory) -> Vec<String> {
        mem.messages().into_iter().map(|m| m.content).collect()
    }

    #[test]
    fn test_evicts_oldest_first() {
        let mem = SessionMemory::new(2);
        mem.push(Message::user("1111"));
        mem.push(Message::user("2222"));
        mem.push(Message::user("3333"));
        assert_eq!(contents(&mem), vec!["2222", "3333"]);
        assert_eq!(mem.total_tokens(), 2);
    }

    #[test]
    fn test_oversized_latest_message_is_kept() {
        let mem = SessionMemory::new(2);
        mem.push(Message::user("1111"));
        mem.push(Message::user("a much longer message than two tokens"));
        assert_eq!(mem.len(), 1);
        assert!(mem.total_tokens() > mem.max_tokens());
    }

    #[test]
    fn test_clear_resets_tokens() {
        let mem = SessionMemory::new(10);
        mem.push(Message::assistant("hello there"));
        mem.clear();
        assert!(mem.is_empty());
        assert_eq!(mem.total_tokens(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_serialized() {
        let mem = Arc::new(SessionMemory::new(1000));
        let mut handles = Vec::new();
        for i in 0..8 {
            let mem = mem.clone();
            handles.push(tokio::spawn(async move {
                mem.push(Message::tool("echo", format!("result {i}")));
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(mem.len(), 8);
        let sum: usize = mem
            .messages()
            .iter()
            .map(|m| TokenEstimator::estimate(&m.content))
            .sum();
        assert_eq!(sum, mem.total_tokens());
    }
}
