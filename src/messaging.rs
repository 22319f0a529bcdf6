//! Direct messaging: conversation grouping, inbox, threads, compose and reply
//!
//! Conversations are never stored. They are rebuilt from the flat message list
//! on every refetch by grouping on the counterpart.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::directory;
use crate::error::{Result, ZestyError};
use crate::live::{LiveCollection, LiveOptions, SyncSource};
use crate::metrics::MetricsCollector;
use crate::models::{initials, Conversation, Message, NewMessage, Profile, Table};
use crate::realtime::ChangeFeed;
use crate::repository::{Backend, MessageRepository, ProfileRepository};
use crate::validation::InputValidator;

/// Name shown when the counterpart has no readable profile
pub const UNKNOWN_COLLEAGUE: &str = "Unknown colleague";

/// Group `me`'s messages by counterpart.
///
/// Threads are oldest first with ties broken by id; conversations are most
/// recent first. Messages that do not involve `me` are ignored.
#[must_use]
pub fn group_conversations(messages: &[Message], me: Uuid) -> Vec<Conversation> {
    let mut by_counterpart: HashMap<Uuid, Vec<Message>> = HashMap::new();
    for message in messages.iter().filter(|m| m.involves(me)) {
        by_counterpart
            .entry(message.counterpart(me))
            .or_default()
            .push(message.clone());
    }

    let mut conversations: Vec<Conversation> = by_counterpart
        .into_iter()
        .map(|(counterpart, mut messages)| {
            messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
            Conversation { counterpart, messages }
        })
        .collect();

    conversations.sort_by(|a, b| {
        b.last_activity()
            .cmp(&a.last_activity())
            .then_with(|| a.counterpart.cmp(&b.counterpart))
    });
    conversations
}

/// One inbox row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationSummary {
    pub counterpart: Uuid,
    pub name: String,
    pub initials: String,
    /// Latest message, truncated
    pub preview: String,
    pub last_at: DateTime<Utc>,
    /// Whether the latest message was sent by us
    pub last_from_me: bool,
    pub message_count: usize,
}

/// A message as shown in a thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadMessage {
    pub id: Uuid,
    pub body: String,
    pub sent_at: DateTime<Utc>,
    pub is_sent: bool,
}

/// Cut `text` to `max` characters, marking the cut with an ellipsis
#[must_use]
pub fn preview(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        return flat;
    }
    let cut: String = flat.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", cut.trim_end())
}

/// Build inbox rows from grouped conversations and the profiles we can read
#[must_use]
pub fn summarize(conversations: &[Conversation], profiles: &[Profile], me: Uuid, preview_len: usize) -> Vec<ConversationSummary> {
    let names: HashMap<Uuid, &str> = profiles.iter().map(|p| (p.id, p.full_name.as_str())).collect();
    conversations
        .iter()
        .filter_map(|c| {
            let last = c.last_message()?;
            let name = names
                .get(&c.counterpart)
                .copied()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or(UNKNOWN_COLLEAGUE);
            Some(ConversationSummary {
                counterpart: c.counterpart,
                name: name.to_string(),
                initials: initials(name),
                preview: preview(&last.content, preview_len),
                last_at: last.created_at,
                last_from_me: last.sender_id == me,
                message_count: c.messages.len(),
            })
        })
        .collect()
}

/// Inbox rows whose colleague name contains `query`, ignoring case.
/// A blank query keeps every row.
#[must_use]
pub fn filter_summaries(rows: &[ConversationSummary], query: &str) -> Vec<ConversationSummary> {
    let needle = query.trim().to_lowercase();
    rows.iter()
        .filter(|row| needle.is_empty() || row.name.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}

/// The thread with `counterpart`, oldest first
#[must_use]
pub fn thread(messages: &[Message], me: Uuid, counterpart: Uuid) -> Vec<ThreadMessage> {
    group_conversations(messages, me)
        .into_iter()
        .find(|c| c.counterpart == counterpart)
        .map(|c| {
            c.messages
                .into_iter()
                .map(|m| ThreadMessage {
                    id: m.id,
                    is_sent: m.sender_id == me,
                    body: m.content,
                    sent_at: m.created_at,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Inbox, thread and compose operations for the signed-in user
#[derive(Clone)]
pub struct MessagingService {
    messages: Arc<dyn MessageRepository>,
    profiles: Arc<dyn ProfileRepository>,
    changes: Arc<dyn ChangeFeed>,
    poll_interval: Duration,
    fetch_timeout: Duration,
    max_message_length: usize,
    preview_length: usize,
    metrics: MetricsCollector,
}

impl MessagingService {
    #[must_use]
    pub fn new(backend: &Backend, config: &AppConfig) -> Self {
        Self::from_parts(backend.messages.clone(), backend.profiles.clone(), backend.changes.clone(), config)
    }

    #[must_use]
    pub fn from_parts(
        messages: Arc<dyn MessageRepository>,
        profiles: Arc<dyn ProfileRepository>,
        changes: Arc<dyn ChangeFeed>,
        config: &AppConfig,
    ) -> Self {
        Self {
            messages,
            profiles,
            changes,
            poll_interval: config.messaging_poll_interval(),
            fetch_timeout: config.fetch_timeout(),
            max_message_length: config.messaging.max_message_length,
            preview_length: config.messaging.preview_length,
            metrics: MetricsCollector::default(),
        }
    }

    /// Write one message from `me` to `to`
    #[instrument(skip(self, body))]
    pub async fn send(&self, me: Uuid, to: Uuid, body: &str) -> Result<Message> {
        let content = match Self::check(me, to, body, self.max_message_length) {
            Ok(content) => content,
            Err(e) => {
                self.metrics.record_validation_failure("message");
                return Err(e);
            },
        };
        let message = self
            .messages
            .insert_message(&NewMessage {
                sender_id: me,
                receiver_id: to,
                content,
                created_at: Utc::now(),
            })
            .await?;
        info!(message_id = %message.id, "Message sent");
        Ok(message)
    }

    /// Reply inside an open conversation
    pub async fn reply(&self, me: Uuid, conversation: &Conversation, body: &str) -> Result<Message> {
        self.send(me, conversation.counterpart, body).await
    }

    fn check(me: Uuid, to: Uuid, body: &str, max: usize) -> Result<String> {
        if to.is_nil() {
            return Err(ZestyError::Validation("Please choose a recipient".to_string()));
        }
        if to == me {
            return Err(ZestyError::Validation("You cannot message yourself".to_string()));
        }
        InputValidator::validate_message_body(body, max)
    }

    pub async fn conversations(&self, me: Uuid) -> Result<Vec<Conversation>> {
        let messages = self.messages.list_messages_for(me).await?;
        Ok(group_conversations(&messages, me))
    }

    /// Inbox rows, most recent conversation first
    pub async fn inbox(&self, me: Uuid) -> Result<Vec<ConversationSummary>> {
        let (messages, profiles) = tokio::try_join!(self.messages.list_messages_for(me), self.profiles.list_profiles())?;
        let conversations = group_conversations(&messages, me);
        debug!(conversations = conversations.len(), "Inbox loaded");
        Ok(summarize(&conversations, &profiles, me, self.preview_length))
    }

    /// Summaries for an already-fetched message list
    pub async fn summarize_snapshot(&self, me: Uuid, messages: &[Message]) -> Result<Vec<ConversationSummary>> {
        let profiles = self.profiles.list_profiles().await?;
        Ok(summarize(&group_conversations(messages, me), &profiles, me, self.preview_length))
    }

    pub async fn thread(&self, me: Uuid, counterpart: Uuid) -> Result<Vec<ThreadMessage>> {
        let messages = self.messages.list_messages_for(me).await?;
        Ok(thread(&messages, me, counterpart))
    }

    /// Recipient picker for the compose dialog
    pub async fn search_recipients(&self, me: Uuid, query: &str) -> Result<Vec<Profile>> {
        let profiles = self.profiles.list_profiles().await?;
        Ok(directory::search(&profiles, Some(me), query))
    }

    /// Every message involving `me`, kept fresh by notifications and polling
    #[must_use]
    pub fn live_messages(&self, me: Uuid) -> LiveCollection<Message> {
        let repo = self.messages.clone();
        let fetch = move || {
            let repo = repo.clone();
            async move { repo.list_messages_for(me).await }
        };
        LiveCollection::spawn(
            "messages",
            fetch,
            SyncSource::Push {
                feed: self.changes.clone(),
                table: Table::Messages,
                fallback_poll: Some(self.poll_interval),
            },
            |m: &Message| m.id.to_string(),
            LiveOptions {
                fetch_timeout: self.fetch_timeout,
                metrics: self.metrics.clone(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBackend;
    use crate::repository::{MockMessageRepository, MockProfileRepository};
    use chrono::Duration as ChronoDuration;

    fn msg(from: Uuid, to: Uuid, body: &str, minutes_ago: i64) -> Message {
        Message {
            id: Uuid::new_v4(),
            sender_id: from,
            receiver_id: to,
            content: body.into(),
            created_at: Utc::now() - ChronoDuration::minutes(minutes_ago),
        }
    }

    #[test]
    fn grouping_by_counterpart_and_recency() {
        let (me, sam, kim, other) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let messages = vec![
            msg(me, sam, "first", 30),
            msg(kim, me, "hello", 20),
            msg(sam, me, "second", 10),
            msg(sam, other, "not mine", 1),
        ];
        let conversations = group_conversations(&messages, me);
        assert_eq!(conversations.len(), 2);
        assert_eq!(conversations[0].counterpart, sam);
        assert_eq!(conversations[0].messages.len(), 2);
        assert_eq!(conversations[0].last_message().unwrap().content, "second");
        assert_eq!(conversations[1].counterpart, kim);
    }

    #[test]
    fn summaries_fall_back_to_unknown_colleague() {
        let (me, sam) = (Uuid::new_v4(), Uuid::new_v4());
        let conversations = group_conversations(&[msg(me, sam, "Can you check the aviary netting today?", 1)], me);
        let rows = summarize(&conversations, &[], me, 12);
        assert_eq!(rows[0].name, UNKNOWN_COLLEAGUE);
        assert_eq!(rows[0].initials, "UC");
        assert_eq!(rows[0].preview.chars().count(), 12);
        assert!(rows[0].preview.ends_with('…'));
        assert!(rows[0].last_from_me);
    }

    #[test]
    fn inbox_filter_matches_names_ignoring_case() {
        let (me, sam, kim) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let conversations = group_conversations(&[msg(sam, me, "gate", 2), msg(kim, me, "bins", 1)], me);
        let rows = summarize(
            &conversations,
            &[Profile::new(sam, "Sarah Johnson"), Profile::new(kim, "Mike Chen")],
            me,
            80,
        );

        let found = filter_summaries(&rows, "  SARAH ");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].counterpart, sam);
        assert_eq!(filter_summaries(&rows, "").len(), 2);
        assert!(filter_summaries(&rows, "lisa").is_empty());
    }

    #[test]
    fn preview_flattens_whitespace() {
        assert_eq!(preview("gate\n\nis  open", 80), "gate is open");
    }

    #[test]
    fn thread_marks_direction() {
        let (me, sam) = (Uuid::new_v4(), Uuid::new_v4());
        let messages = vec![msg(sam, me, "ping", 2), msg(me, sam, "pong", 1)];
        let rows = thread(&messages, me, sam);
        assert_eq!(rows.iter().map(|r| r.is_sent).collect::<Vec<_>>(), vec![false, true]);
        assert!(thread(&messages, me, Uuid::new_v4()).is_empty());
    }

    fn service(messages: MockMessageRepository) -> MessagingService {
        MessagingService::from_parts(
            Arc::new(messages),
            Arc::new(MockProfileRepository::new()),
            Arc::new(InMemoryBackend::new()),
            &AppConfig::default(),
        )
    }

    #[tokio::test]
    async fn send_rejects_bad_input_without_writing() {
        let mut repo = MockMessageRepository::new();
        repo.expect_insert_message().times(0);
        let svc = service(repo);
        let me = Uuid::new_v4();

        assert!(svc.send(me, Uuid::new_v4(), "   ").await.unwrap_err().is_validation());
        assert!(svc.send(me, me, "hi").await.unwrap_err().is_validation());
        assert!(svc.send(me, Uuid::nil(), "hi").await.unwrap_err().is_validation());
        let long = "x".repeat(2001);
        assert!(svc.send(me, Uuid::new_v4(), &long).await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn send_writes_one_row_with_both_parties() {
        let (me, to) = (Uuid::new_v4(), Uuid::new_v4());
        let mut repo = MockMessageRepository::new();
        repo.expect_insert_message()
            .withf(move |m| m.sender_id == me && m.receiver_id == to && m.content == "Fence fixed")
            .times(1)
            .returning(|m| {
                Ok(Message {
                    id: Uuid::new_v4(),
                    sender_id: m.sender_id,
                    receiver_id: m.receiver_id,
                    content: m.content.clone(),
                    created_at: m.created_at,
                })
            });

        let sent = service(repo).send(me, to, "  Fence fixed \n").await.unwrap();
        assert_eq!(sent.content, "Fence fixed");
    }
}
