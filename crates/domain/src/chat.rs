use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::conversation::{Conversation, ConversationDirectory, PartyRole};
use crate::error::DomainError;
use crate::ports::chat::MessageRepository;
use crate::ports::identity::IdentityDirectory;
use crate::profanity::{CensorEngine, CensorSnapshot};
use crate::util::now_ms;

pub const MAX_BODY_CHARS: usize = 2_000;
pub const MAX_HISTORY_TAKE: usize = 100;

/// A stored message. The sender is recorded as a canonical side, never a raw
/// id, so ordering and addressing stay independent of who issued the request.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub message_id: i64,
    pub conversation_id: i64,
    pub sender_is_party_low: bool,
    pub body: String,
    pub sent_at_ms: i64,
    pub is_read: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageAppend {
    pub conversation_id: i64,
    pub sender_is_party_low: bool,
    pub body: String,
    pub sent_at_ms: i64,
}

/// Cursor selection for history retrieval. When several are present the
/// priority is: before cursor, explicit latest, after cursor, default latest.
///
/// Cursors are the `(sent_at_ms, message_id)` ordering key of a boundary
/// message. Without the id the comparison degrades to strict timestamp
/// inequality and rows tied on the boundary timestamp become unreachable, so
/// clients paging exactly should pass both halves.
#[derive(Clone, Copy, Debug, Default)]
pub struct HistoryQuery {
    pub before_ms: Option<i64>,
    pub before_id: Option<i64>,
    pub after_ms: Option<i64>,
    pub after_id: Option<i64>,
    pub latest: bool,
    pub take: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HistoryMode {
    Before(i64, i64),
    Latest,
    After(i64, i64),
}

fn select_mode(query: &HistoryQuery) -> HistoryMode {
    if let Some(cursor) = query.before_ms {
        HistoryMode::Before(cursor, query.before_id.unwrap_or(i64::MIN))
    } else if query.latest {
        HistoryMode::Latest
    } else if let Some(cursor) = query.after_ms {
        HistoryMode::After(cursor, query.after_id.unwrap_or(i64::MAX))
    } else {
        HistoryMode::Latest
    }
}

/// A message framed for one viewer: sender/receiver translated from the
/// canonical sides, body already censored.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryItem {
    pub message_id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub content: String,
    pub sent_at_ms: i64,
    pub is_mine: bool,
    pub is_read: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerPreview {
    pub peer_id: i64,
    pub last_content: Option<String>,
    pub last_sent_at_ms: Option<i64>,
    pub unread: usize,
}

#[derive(Clone)]
pub struct ChatService {
    conversations: ConversationDirectory,
    messages: Arc<dyn MessageRepository>,
    identities: Arc<dyn IdentityDirectory>,
    censor: Arc<CensorEngine>,
    default_take: usize,
}

impl ChatService {
    pub fn new(
        conversations: ConversationDirectory,
        messages: Arc<dyn MessageRepository>,
        identities: Arc<dyn IdentityDirectory>,
        censor: Arc<CensorEngine>,
        default_take: usize,
    ) -> Self {
        Self {
            conversations,
            messages,
            identities,
            censor,
            default_take,
        }
    }

    pub async fn send_message(
        &self,
        viewer_id: i64,
        other_id: i64,
        body: &str,
    ) -> DomainResult<Message> {
        let body = body.trim();
        if body.is_empty() {
            return Err(DomainError::Validation("body is required".into()));
        }
        if body.chars().count() > MAX_BODY_CHARS {
            return Err(DomainError::Validation(format!(
                "body exceeds max length of {MAX_BODY_CHARS}"
            )));
        }
        self.assert_participants_exist(viewer_id, other_id).await?;

        let conversation = self
            .conversations
            .find_conversation(viewer_id, other_id)
            .await?
            .ok_or(DomainError::NotFound)?;
        let role = ConversationDirectory::resolve_role(&conversation, viewer_id)?;

        self.messages
            .append(&MessageAppend {
                conversation_id: conversation.conversation_id,
                sender_is_party_low: role.is_party_low(),
                body: body.to_string(),
                sent_at_ms: now_ms(),
            })
            .await
    }

    /// Bidirectional cursor history. Every page comes back oldest→newest
    /// regardless of mode, so clients prepend before-pages and append
    /// after-pages. A never-contacted peer yields an empty page, not an
    /// error.
    pub async fn history(
        &self,
        viewer_id: i64,
        other_id: i64,
        query: HistoryQuery,
    ) -> DomainResult<Vec<HistoryItem>> {
        self.assert_participants_exist(viewer_id, other_id).await?;
        let take = query
            .take
            .unwrap_or(self.default_take)
            .clamp(1, MAX_HISTORY_TAKE);

        let Some(conversation) = self
            .conversations
            .find_conversation(viewer_id, other_id)
            .await?
        else {
            return Ok(Vec::new());
        };
        let role = ConversationDirectory::resolve_role(&conversation, viewer_id)?;

        let rows = match select_mode(&query) {
            HistoryMode::Before(cursor_ms, cursor_id) => {
                let mut rows = self
                    .messages
                    .query_before(conversation.conversation_id, cursor_ms, cursor_id, take)
                    .await?;
                rows.reverse();
                rows
            }
            HistoryMode::Latest => {
                let mut rows = self
                    .messages
                    .query_latest(conversation.conversation_id, take)
                    .await?;
                rows.reverse();
                rows
            }
            HistoryMode::After(cursor_ms, cursor_id) => {
                self.messages
                    .query_after(conversation.conversation_id, cursor_ms, cursor_id, take)
                    .await?
            }
        };

        let snapshot = self.censor.snapshot();
        Ok(rows
            .into_iter()
            .map(|message| frame_for_viewer(&conversation, role, &snapshot, message))
            .collect())
    }

    /// Per-peer previews for the viewer's inbox: latest censored message and
    /// the unread count of messages the peer sent. Ordered by last message
    /// time descending; peers without messages sort last.
    pub async fn peers_latest(
        &self,
        viewer_id: i64,
        peer_filter: Option<&HashSet<i64>>,
    ) -> DomainResult<Vec<PeerPreview>> {
        if !self.identities.user_exists(viewer_id).await? {
            return Err(DomainError::NotFound);
        }
        let conversations = self.conversations.list_for_party(viewer_id).await?;
        let snapshot = self.censor.snapshot();

        let mut previews = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let role = ConversationDirectory::resolve_role(&conversation, viewer_id)?;
            let peer_id = conversation.peer_id(role);
            if let Some(filter) = peer_filter {
                if !filter.contains(&peer_id) {
                    continue;
                }
            }

            let latest = self
                .messages
                .latest_message(conversation.conversation_id)
                .await?;
            let unread = self
                .messages
                .unread_count(conversation.conversation_id, !role.is_party_low())
                .await?;
            previews.push(PeerPreview {
                peer_id,
                last_content: latest.as_ref().map(|message| snapshot.censor(&message.body)),
                last_sent_at_ms: latest.map(|message| message.sent_at_ms),
                unread,
            });
        }

        // None sorts below every Some, putting message-less peers last
        previews.sort_by(|a, b| {
            b.last_sent_at_ms
                .cmp(&a.last_sent_at_ms)
                .then_with(|| a.peer_id.cmp(&b.peer_id))
        });
        Ok(previews)
    }

    /// Marks every message the other party sent as read. Idempotent; returns
    /// how many flags flipped. No conversation means nothing to mark.
    pub async fn mark_read(&self, viewer_id: i64, other_id: i64) -> DomainResult<usize> {
        self.assert_participants_exist(viewer_id, other_id).await?;
        let Some(conversation) = self
            .conversations
            .find_conversation(viewer_id, other_id)
            .await?
        else {
            return Ok(0);
        };
        let role = ConversationDirectory::resolve_role(&conversation, viewer_id)?;
        self.messages
            .mark_read(conversation.conversation_id, !role.is_party_low())
            .await
    }

    async fn assert_participants_exist(&self, viewer_id: i64, other_id: i64) -> DomainResult<()> {
        if viewer_id == other_id {
            return Err(DomainError::Validation(
                "requester and peer must differ".into(),
            ));
        }
        if !self.identities.user_exists(viewer_id).await?
            || !self.identities.user_exists(other_id).await?
        {
            return Err(DomainError::NotFound);
        }
        Ok(())
    }
}

fn frame_for_viewer(
    conversation: &Conversation,
    viewer_role: PartyRole,
    snapshot: &CensorSnapshot,
    message: Message,
) -> HistoryItem {
    let sender_role = if message.sender_is_party_low {
        PartyRole::Low
    } else {
        PartyRole::High
    };
    HistoryItem {
        message_id: message.message_id,
        sender_id: conversation.party_id(sender_role),
        receiver_id: conversation.peer_id(sender_role),
        content: snapshot.censor(&message.body),
        sent_at_ms: message.sent_at_ms,
        is_mine: sender_role == viewer_role,
        is_read: message.is_read,
    }
}
