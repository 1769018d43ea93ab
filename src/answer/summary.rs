// src/answer/summary.rs

//! Channel summaries over a time window: recent rows + LLM synthesis,
//! top keywords, participant count.

use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;
use sqlx::Row;

use crate::embeddings::sparse::tokenize;
use crate::error::Result;
use crate::llm::LlmClient;
use crate::store::Store;

const MAX_SUMMARY_MESSAGES: i64 = 200;
const TOP_KEYWORD_COUNT: usize = 8;

#[derive(Debug, Clone, Serialize)]
pub struct ChannelSummary {
    pub summary: String,
    pub top_keywords: Vec<String>,
    pub participant_count: usize,
    pub message_count: usize,
}

/// Most frequent tokens across the window's content.
pub fn top_keywords(contents: &[String], count: usize) -> Vec<String> {
    let mut frequency: HashMap<String, usize> = HashMap::new();
    for content in contents {
        for token in tokenize(content) {
            *frequency.entry(token).or_insert(0) += 1;
        }
    }
    let mut ranked: Vec<(String, usize)> = frequency.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(count).map(|(t, _)| t).collect()
}

pub async fn summarize_channel(
    store: &Store,
    llm: &LlmClient,
    tenant_id: i64,
    channel_id: i64,
    hours: i64,
) -> Result<ChannelSummary> {
    let since = Utc::now().timestamp() - hours * 3600;

    let rows = sqlx::query(
        "SELECT m.content, m.author_id, mb.username, mb.display_name
         FROM messages m
         LEFT JOIN members mb ON m.author_id = mb.id
         WHERE m.tenant_id = ? AND m.channel_id = ? AND m.deleted = 0
           AND m.authored_at >= ? AND LENGTH(m.content) > 0
         ORDER BY m.authored_at ASC
         LIMIT ?",
    )
    .bind(tenant_id)
    .bind(channel_id)
    .bind(since)
    .bind(MAX_SUMMARY_MESSAGES)
    .fetch_all(store.readonly_pool())
    .await?;

    if rows.is_empty() {
        return Ok(ChannelSummary {
            summary: format!("No activity in the last {hours} hours."),
            top_keywords: vec![],
            participant_count: 0,
            message_count: 0,
        });
    }

    let mut contents = Vec::new();
    let mut participants = std::collections::HashSet::new();
    let mut transcript_lines = Vec::new();
    for row in &rows {
        let content: String = row.get("content");
        let author_id: i64 = row.get("author_id");
        let display: Option<String> = row.get("display_name");
        let username: Option<String> = row.get("username");
        let name = display
            .or(username)
            .unwrap_or_else(|| format!("member-{author_id}"));
        participants.insert(author_id);
        transcript_lines.push(format!("{name}: {content}"));
        contents.push(content);
    }

    let keywords = top_keywords(&contents, TOP_KEYWORD_COUNT);

    let summary = if llm.is_available() {
        let transcript = transcript_lines.join("\n");
        let system = "You summarize community chat activity. Write a short, factual \
                      summary of the conversation below: main topics, notable decisions, \
                      and open questions. A few sentences, no preamble.";
        match llm.generate(system, &transcript).await {
            Ok(summary) => summary,
            Err(_) => fallback_summary(&keywords, rows.len(), participants.len(), hours),
        }
    } else {
        fallback_summary(&keywords, rows.len(), participants.len(), hours)
    };

    Ok(ChannelSummary {
        summary,
        top_keywords: keywords,
        participant_count: participants.len(),
        message_count: rows.len(),
    })
}

fn fallback_summary(keywords: &[String], messages: usize, participants: usize, hours: i64) -> String {
    format!(
        "{messages} messages from {participants} participants in the last {hours} hours. \
         Frequent terms: {}.",
        keywords.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_rank_by_frequency() {
        let contents = vec![
            "the deploy failed again".to_string(),
            "deploy pipeline deploy".to_string(),
            "pipeline looks fine now".to_string(),
        ];
        let keywords = top_keywords(&contents, 3);
        assert_eq!(keywords[0], "deploy");
        assert_eq!(keywords[1], "pipeline");
    }

    #[test]
    fn keyword_ties_break_alphabetically() {
        let contents = vec!["zebra apple".to_string()];
        assert_eq!(top_keywords(&contents, 2), vec!["apple", "zebra"]);
    }
}
