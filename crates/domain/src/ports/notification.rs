use crate::DomainResult;
use crate::notification::{NotificationRecord, RecipientIdentity};

pub trait NotificationRepository: Send + Sync {
    fn source_exists(&self, source_id: i64) -> crate::ports::BoxFuture<'_, DomainResult<bool>>;

    fn action_exists(&self, action_id: i64) -> crate::ports::BoxFuture<'_, DomainResult<bool>>;

    /// Transaction boundary of the dispatcher: the notification row and its
    /// recipient rows are persisted as one unit or not at all. Returns the
    /// assigned notification id.
    fn create_with_recipients(
        &self,
        notification: &NotificationRecord,
        recipients: &[RecipientIdentity],
    ) -> crate::ports::BoxFuture<'_, DomainResult<i64>>;

    /// Sets the per-recipient read timestamp; at most once. Returns whether
    /// the row changed.
    fn mark_recipient_read(
        &self,
        notification_id: i64,
        recipient: RecipientIdentity,
        read_at_ms: i64,
    ) -> crate::ports::BoxFuture<'_, DomainResult<bool>>;
}
