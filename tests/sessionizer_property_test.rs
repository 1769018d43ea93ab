// tests/sessionizer_property_test.rs
// Sessionizer invariants over generated message streams: same-channel
// grouping, bounded time gaps, size bounds, chronological total order.

use chrono::{DateTime, Utc};
use hivemind::embeddings::{LocalEmbedder, TextEmbedder};
use hivemind::ingest::semantic::{HybridOptions, hybrid_sessionize};
use hivemind::ingest::sessionizer::{SessionMessage, sessionize};

fn at_minute(minute: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + minute * 60, 0).unwrap()
}

fn stream() -> Vec<SessionMessage> {
    // Three channels interleaved, irregular gaps, a few reply chains.
    let mut messages = Vec::new();
    let mut id = 0;
    for round in 0..20 {
        for channel in [1, 2, 3] {
            id += 1;
            messages.push(SessionMessage {
                id,
                channel_id: channel,
                author_id: 100 + (id % 4),
                content: format!("round {round} in channel {channel}"),
                timestamp: at_minute(round * 4 + channel),
                reply_target_id: if id > 3 && id % 7 == 0 { Some(id - 3) } else { None },
            });
        }
    }
    messages
}

#[test]
fn sessions_are_single_channel_and_chronological() {
    let sessions = sessionize(stream(), 15);

    for session in &sessions {
        assert!(
            session.messages.iter().all(|m| m.channel_id == session.channel_id),
            "session mixes channels"
        );
        for pair in session.messages.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp, "out of order");
            let gap = pair[1].timestamp - pair[0].timestamp;
            assert!(gap.num_minutes() <= 15, "gap of {} minutes", gap.num_minutes());
        }
    }
}

#[test]
fn every_message_lands_in_exactly_one_session() {
    let input = stream();
    let total = input.len();
    let sessions = sessionize(input, 15);

    let mut seen = std::collections::HashSet::new();
    for session in &sessions {
        for id in session.message_ids() {
            assert!(seen.insert(id), "message {id} duplicated across sessions");
        }
    }
    assert_eq!(seen.len(), total);
}

#[tokio::test]
async fn hybrid_enforces_size_bounds() {
    let embedder = TextEmbedder::Local(LocalEmbedder::new(64));

    // 31 messages in one tight burst: must hard-split.
    let burst: Vec<SessionMessage> = (0..31)
        .map(|i| SessionMessage {
            id: i,
            channel_id: 1,
            author_id: 100,
            content: format!("ongoing topic message {i}"),
            timestamp: at_minute(i / 4),
            reply_target_id: None,
        })
        .collect();

    let sessions = hybrid_sessionize(&embedder, burst, HybridOptions::default())
        .await
        .unwrap();
    assert!(sessions.len() >= 2, "31 messages must split");
    for session in &sessions {
        assert!((2..=30).contains(&session.len()), "session of {}", session.len());
    }
}

#[tokio::test]
async fn pair_is_kept_singleton_is_dropped() {
    let embedder = TextEmbedder::Local(LocalEmbedder::new(64));

    let pair = vec![
        SessionMessage {
            id: 1,
            channel_id: 1,
            author_id: 100,
            content: "first".into(),
            timestamp: at_minute(0),
            reply_target_id: None,
        },
        SessionMessage {
            id: 2,
            channel_id: 1,
            author_id: 101,
            content: "second".into(),
            timestamp: at_minute(1),
            reply_target_id: None,
        },
    ];
    let sessions = hybrid_sessionize(&embedder, pair, HybridOptions::default())
        .await
        .unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].len(), 2);

    let lone = vec![SessionMessage {
        id: 1,
        channel_id: 1,
        author_id: 100,
        content: "alone".into(),
        timestamp: at_minute(0),
        reply_target_id: None,
    }];
    let sessions = hybrid_sessionize(&embedder, lone, HybridOptions::default())
        .await
        .unwrap();
    assert!(sessions.is_empty(), "isolated singleton is dropped");
}
