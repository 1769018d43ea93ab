// src/answer/memory.rs

//! Per-channel conversation memory.
//!
//! Best-effort, in-process, non-durable: a ring of at most 20 exchanges per
//! channel with a 30-minute inactivity TTL. One mutex guards the map; every
//! write sweeps expired channels first. Used to resolve references like
//! "that file" in follow-ups - never a source of truth.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const MAX_EXCHANGES: usize = 20;
pub const CHANNEL_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone)]
struct Exchange {
    role: &'static str,
    author_name: String,
    content: String,
}

#[derive(Debug)]
struct ChannelHistory {
    exchanges: Vec<Exchange>,
    last_activity: Instant,
}

impl ChannelHistory {
    fn new() -> Self {
        Self {
            exchanges: Vec::new(),
            last_activity: Instant::now(),
        }
    }

    fn push(&mut self, exchange: Exchange) {
        self.exchanges.push(exchange);
        if self.exchanges.len() > MAX_EXCHANGES {
            let excess = self.exchanges.len() - MAX_EXCHANGES;
            self.exchanges.drain(..excess);
        }
        self.last_activity = Instant::now();
    }

    fn expired(&self, ttl: Duration) -> bool {
        self.last_activity.elapsed() > ttl
    }
}

pub struct ConversationMemory {
    channels: Mutex<HashMap<i64, ChannelHistory>>,
    ttl: Duration,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::with_ttl(CHANNEL_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn record_user(&self, channel_id: i64, author_name: &str, content: &str) {
        self.record(channel_id, "user", author_name, content);
    }

    pub fn record_assistant(&self, channel_id: i64, content: &str) {
        self.record(channel_id, "assistant", "Assistant", content);
    }

    fn record(&self, channel_id: i64, role: &'static str, author_name: &str, content: &str) {
        let mut channels = self.channels.lock().expect("memory lock poisoned");
        channels.retain(|_, history| !history.expired(self.ttl));
        channels
            .entry(channel_id)
            .or_insert_with(ChannelHistory::new)
            .push(Exchange {
                role,
                author_name: author_name.to_string(),
                content: content.to_string(),
            });
    }

    /// Formatted recent context for a channel; empty string when nothing
    /// usable remains.
    pub fn context(&self, channel_id: i64, max_messages: usize) -> String {
        let mut channels = self.channels.lock().expect("memory lock poisoned");

        let Some(history) = channels.get(&channel_id) else {
            return String::new();
        };
        if history.expired(self.ttl) {
            channels.remove(&channel_id);
            return String::new();
        }

        let start = history.exchanges.len().saturating_sub(max_messages);
        history.exchanges[start..]
            .iter()
            .map(|e| {
                let prefix = if e.role == "user" { e.author_name.as_str() } else { "Assistant" };
                format!("{prefix}: {}", e.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn clear_channel(&self, channel_id: i64) {
        self.channels
            .lock()
            .expect("memory lock poisoned")
            .remove(&channel_id);
    }
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_formats_user_and_assistant_lines() {
        let memory = ConversationMemory::new();
        memory.record_user(1, "ada", "what about that file?");
        memory.record_assistant(1, "which file do you mean?");

        let context = memory.context(1, 10);
        assert_eq!(context, "ada: what about that file?\nAssistant: which file do you mean?");
    }

    #[test]
    fn ring_caps_at_twenty_exchanges() {
        let memory = ConversationMemory::new();
        for i in 0..30 {
            memory.record_user(1, "ada", &format!("message {i}"));
        }
        let context = memory.context(1, 100);
        assert_eq!(context.lines().count(), MAX_EXCHANGES);
        assert!(context.contains("message 29"));
        assert!(!context.contains("message 9\n"));
    }

    #[test]
    fn channels_are_independent() {
        let memory = ConversationMemory::new();
        memory.record_user(1, "ada", "channel one");
        memory.record_user(2, "lin", "channel two");

        assert!(memory.context(1, 10).contains("channel one"));
        assert!(!memory.context(1, 10).contains("channel two"));
    }

    #[test]
    fn expired_channels_are_swept() {
        let memory = ConversationMemory::with_ttl(Duration::from_millis(10));
        memory.record_user(1, "ada", "old news");
        std::thread::sleep(Duration::from_millis(30));

        assert_eq!(memory.context(1, 10), "");

        // A write to another channel sweeps the stale entry too.
        memory.record_user(2, "lin", "fresh");
        assert_eq!(memory.context(1, 10), "");
    }

    #[test]
    fn max_messages_trims_the_view_not_the_ring() {
        let memory = ConversationMemory::new();
        for i in 0..5 {
            memory.record_user(1, "ada", &format!("m{i}"));
        }
        let context = memory.context(1, 2);
        assert_eq!(context.lines().count(), 2);
        assert!(context.contains("m4"));
    }
}
