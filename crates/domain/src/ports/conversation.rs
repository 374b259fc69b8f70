use crate::DomainResult;
use crate::conversation::Conversation;

/// Conversations are provisioned by an external collaborator; this port is
/// read-only. Lookups are always by the canonical `(low, high)` pair and the
/// staff flag, since staff conversations live in a disjoint namespace.
pub trait ConversationRepository: Send + Sync {
    fn find_by_pair(
        &self,
        party_low_id: i64,
        party_high_id: i64,
        staff_initiated: bool,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<Conversation>>>;

    fn list_for_party(
        &self,
        party_id: i64,
        staff_initiated: bool,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Vec<Conversation>>>;
}
