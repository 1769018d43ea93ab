// src/ingest/enrich.rs

//! Metadata enrichment before embedding.
//!
//! Format: `[<author> in #<channel> @ <YYYY-MM-DD HH:MM>]: <content>`
//! Platform mention tokens are resolved to display names where possible so
//! embeddings capture who said what.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static USER_MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"<@!?(\d+)>").expect("valid regex"));
static ROLE_MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"<@&\d+>").expect("valid regex"));
static CHANNEL_MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"<#\d+>").expect("valid regex"));

/// Replace raw mention tokens with readable names. Unknown ids keep a
/// generic placeholder.
pub fn resolve_mentions(content: &str, names: &HashMap<i64, String>) -> String {
    let resolved = USER_MENTION.replace_all(content, |caps: &Captures| {
        let id: i64 = caps[1].parse().unwrap_or(0);
        match names.get(&id) {
            Some(name) => format!("@{name}"),
            None => format!("@member-{id}"),
        }
    });
    let resolved = ROLE_MENTION.replace_all(&resolved, "@role");
    CHANNEL_MENTION.replace_all(&resolved, "#channel").into_owned()
}

pub struct EnrichedLine<'a> {
    pub author_name: &'a str,
    pub content: &'a str,
    pub timestamp: DateTime<Utc>,
}

/// One enriched line. The channel is named on the first line of a session
/// rather than repeated per message.
pub fn enrich_message(
    author_name: &str,
    channel_name: Option<&str>,
    timestamp: DateTime<Utc>,
    content: &str,
) -> String {
    let time = timestamp.format("%Y-%m-%d %H:%M");
    match channel_name {
        Some(channel) => format!("[{author_name} in #{channel} @ {time}]: {content}"),
        None => format!("[{author_name} @ {time}]: {content}"),
    }
}

/// Compose a session's enriched text for embedding.
pub fn enrich_session(
    lines: &[EnrichedLine<'_>],
    channel_name: &str,
    mention_names: &HashMap<i64, String>,
) -> String {
    let mut out = String::new();
    if lines.len() > 1 {
        out.push_str(&format!("Conversation in #{channel_name}:\n"));
    }
    let rendered: Vec<String> = lines
        .iter()
        .map(|line| {
            let content = resolve_mentions(line.content, mention_names);
            enrich_message(
                line.author_name,
                if lines.len() == 1 { Some(channel_name) } else { None },
                line.timestamp,
                &content,
            )
        })
        .collect();
    out.push_str(&rendered.join("\n"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn mention_tokens_resolve_to_names() {
        let mut names = HashMap::new();
        names.insert(42, "ada".to_string());
        let out = resolve_mentions("hey <@42> and <@!42>, see <#123> <@&9>", &names);
        assert_eq!(out, "hey @ada and @ada, see #channel @role");
    }

    #[test]
    fn unknown_mentions_keep_placeholder() {
        let out = resolve_mentions("ping <@777>", &HashMap::new());
        assert_eq!(out, "ping @member-777");
    }

    #[test]
    fn session_header_only_for_multi_message() {
        let names = HashMap::new();
        let lines = vec![
            EnrichedLine { author_name: "ada", content: "first", timestamp: ts() },
            EnrichedLine { author_name: "lin", content: "second", timestamp: ts() },
        ];
        let text = enrich_session(&lines, "general", &names);
        assert!(text.starts_with("Conversation in #general:\n"));
        assert!(text.contains("[ada @ "));

        let single = vec![EnrichedLine { author_name: "ada", content: "only", timestamp: ts() }];
        let text = enrich_session(&single, "general", &names);
        assert!(text.starts_with("[ada in #general @ "));
    }
}
