// src/ingest/sessionizer.rs

//! Time-based sessionizer (first pass).
//!
//! Walks messages in ascending time and opens a new session when the channel
//! changes, the gap since the previous message exceeds the configured
//! threshold, or a reply targets a message outside the active session's id
//! set. When a time break and a reply break both apply, the time break is the
//! recorded cause.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

pub const DEFAULT_GAP_MINUTES: i64 = 15;

/// Lightweight message view for sessionization.
#[derive(Debug, Clone)]
pub struct SessionMessage {
    pub id: i64,
    pub channel_id: i64,
    pub author_id: i64,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub reply_target_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct DraftSession {
    pub channel_id: i64,
    pub messages: Vec<SessionMessage>,
}

impl DraftSession {
    fn new(channel_id: i64) -> Self {
        Self {
            channel_id,
            messages: Vec::new(),
        }
    }

    pub fn message_ids(&self) -> Vec<i64> {
        self.messages.iter().map(|m| m.id).collect()
    }

    pub fn participant_ids(&self) -> Vec<i64> {
        let mut seen = HashSet::new();
        self.messages
            .iter()
            .filter(|m| seen.insert(m.author_id))
            .map(|m| m.author_id)
            .collect()
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.messages.first().map(|m| m.timestamp)
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.messages.last().map(|m| m.timestamp)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

fn should_break(
    current: &SessionMessage,
    previous: &SessionMessage,
    active_ids: &HashSet<i64>,
    gap: Duration,
) -> bool {
    // Time break takes precedence over a reply break.
    if current.timestamp - previous.timestamp > gap {
        return true;
    }

    // Replying to something outside the session is a topic shift.
    if let Some(target) = current.reply_target_id {
        if !active_ids.contains(&target) {
            return true;
        }
    }

    false
}

/// Group messages into draft sessions. Input order does not matter; output is
/// chronological and non-overlapping.
pub fn sessionize(messages: Vec<SessionMessage>, gap_minutes: i64) -> Vec<DraftSession> {
    if messages.is_empty() {
        return vec![];
    }

    let mut sorted = messages;
    sorted.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));

    let gap = Duration::minutes(gap_minutes);
    let mut sessions: Vec<DraftSession> = Vec::new();
    let mut current = DraftSession::new(sorted[0].channel_id);
    let mut active_ids: HashSet<i64> = HashSet::new();

    for (i, message) in sorted.iter().enumerate() {
        if i > 0 {
            let previous = &sorted[i - 1];
            let channel_changed = message.channel_id != current.channel_id;

            if channel_changed || should_break(message, previous, &active_ids, gap) {
                if !current.is_empty() {
                    sessions.push(current);
                }
                current = DraftSession::new(message.channel_id);
                active_ids.clear();
            }
        }

        current.messages.push(message.clone());
        active_ids.insert(message.id);
        if let Some(target) = message.reply_target_id {
            active_ids.insert(target);
        }
    }

    if !current.is_empty() {
        sessions.push(current);
    }

    sessions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: i64, channel: i64, minute: i64) -> SessionMessage {
        SessionMessage {
            id,
            channel_id: channel,
            author_id: 100 + id % 3,
            content: format!("message {id}"),
            timestamp: DateTime::from_timestamp(1_700_000_000 + minute * 60, 0).unwrap(),
            reply_target_id: None,
        }
    }

    fn reply(id: i64, channel: i64, minute: i64, target: i64) -> SessionMessage {
        SessionMessage {
            reply_target_id: Some(target),
            ..msg(id, channel, minute)
        }
    }

    #[test]
    fn gap_over_fifteen_minutes_breaks() {
        let sessions = sessionize(
            vec![msg(1, 1, 0), msg(2, 1, 5), msg(3, 1, 25)],
            DEFAULT_GAP_MINUTES,
        );
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].message_ids(), vec![1, 2]);
        assert_eq!(sessions[1].message_ids(), vec![3]);
    }

    #[test]
    fn gap_of_exactly_fifteen_minutes_stays() {
        let sessions = sessionize(vec![msg(1, 1, 0), msg(2, 1, 15)], DEFAULT_GAP_MINUTES);
        assert_eq!(sessions.len(), 1);
    }

    #[test]
    fn channel_change_always_breaks() {
        let sessions = sessionize(
            vec![msg(1, 1, 0), msg(2, 2, 1), msg(3, 1, 2)],
            DEFAULT_GAP_MINUTES,
        );
        assert_eq!(sessions.len(), 3);
        for session in &sessions {
            assert!(
                session
                    .messages
                    .iter()
                    .all(|m| m.channel_id == session.channel_id)
            );
        }
    }

    #[test]
    fn reply_to_outside_message_breaks() {
        let sessions = sessionize(
            vec![msg(1, 1, 0), msg(2, 1, 1), reply(3, 1, 2, 999)],
            DEFAULT_GAP_MINUTES,
        );
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[1].message_ids(), vec![3]);
    }

    #[test]
    fn reply_within_session_does_not_break() {
        let sessions = sessionize(
            vec![msg(1, 1, 0), msg(2, 1, 1), reply(3, 1, 2, 1)],
            DEFAULT_GAP_MINUTES,
        );
        assert_eq!(sessions.len(), 1);
    }

    #[test]
    fn output_is_chronological_even_for_shuffled_input() {
        let sessions = sessionize(
            vec![msg(3, 1, 2), msg(1, 1, 0), msg(2, 1, 1)],
            DEFAULT_GAP_MINUTES,
        );
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].message_ids(), vec![1, 2, 3]);
    }

    #[test]
    fn sessions_never_overlap() {
        let messages: Vec<SessionMessage> = (0..40).map(|i| msg(i, 1, i * 10)).collect();
        let sessions = sessionize(messages, DEFAULT_GAP_MINUTES);
        let mut seen = std::collections::HashSet::new();
        for session in &sessions {
            for id in session.message_ids() {
                assert!(seen.insert(id), "message {id} appears in two sessions");
            }
        }
    }
}
