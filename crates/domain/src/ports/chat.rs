use crate::DomainResult;
use crate::chat::{Message, MessageAppend};

/// Append-only message log. Every query is scoped to one conversation and
/// ordered by `(sent_at_ms, message_id)`; the store-assigned id is the stable
/// tie-break so cursor pages never duplicate or skip rows.
pub trait MessageRepository: Send + Sync {
    /// Single atomic insert; assigns the message id.
    fn append(&self, message: &MessageAppend)
    -> crate::ports::BoxFuture<'_, DomainResult<Message>>;

    /// Up to `limit` messages with ordering key strictly below
    /// `(cursor_ms, cursor_id)`, newest first. The composite comparison keeps
    /// rows sharing the boundary timestamp reachable across pages.
    fn query_before(
        &self,
        conversation_id: i64,
        cursor_ms: i64,
        cursor_id: i64,
        limit: usize,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Vec<Message>>>;

    /// Up to `limit` messages with ordering key strictly above
    /// `(cursor_ms, cursor_id)`, oldest first.
    fn query_after(
        &self,
        conversation_id: i64,
        cursor_ms: i64,
        cursor_id: i64,
        limit: usize,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Vec<Message>>>;

    /// The `limit` most recent messages, newest first.
    fn query_latest(
        &self,
        conversation_id: i64,
        limit: usize,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Vec<Message>>>;

    fn latest_message(
        &self,
        conversation_id: i64,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<Message>>>;

    /// Count of unread messages authored by the given canonical side.
    fn unread_count(
        &self,
        conversation_id: i64,
        sender_is_party_low: bool,
    ) -> crate::ports::BoxFuture<'_, DomainResult<usize>>;

    /// Flips unread messages authored by the given canonical side to read.
    /// Returns how many rows changed; repeat calls converge to zero.
    fn mark_read(
        &self,
        conversation_id: i64,
        sender_is_party_low: bool,
    ) -> crate::ports::BoxFuture<'_, DomainResult<usize>>;
}
