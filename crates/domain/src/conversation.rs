use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::error::DomainError;
use crate::ports::conversation::ConversationRepository;

/// One-to-one conversation addressed by its canonical pair: the participant
/// ids sorted numerically, so `(a, b)` and `(b, a)` land on the same record.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub conversation_id: i64,
    pub party_low_id: i64,
    pub party_high_id: i64,
    pub staff_initiated: bool,
    pub created_at_ms: i64,
}

impl Conversation {
    pub fn party_id(&self, role: PartyRole) -> i64 {
        match role {
            PartyRole::Low => self.party_low_id,
            PartyRole::High => self.party_high_id,
        }
    }

    pub fn peer_id(&self, role: PartyRole) -> i64 {
        self.party_id(role.other())
    }
}

/// Which canonical side of a conversation a participant occupies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartyRole {
    Low,
    High,
}

impl PartyRole {
    pub fn is_party_low(self) -> bool {
        matches!(self, Self::Low)
    }

    pub fn other(self) -> Self {
        match self {
            Self::Low => Self::High,
            Self::High => Self::Low,
        }
    }
}

/// Normalizes an unordered participant pair to `(min, max)`. Every reader and
/// writer goes through this function; raw from/to ids are never stored at the
/// conversation level.
pub fn canonical_pair(a: i64, b: i64) -> DomainResult<(i64, i64)> {
    if a == b {
        return Err(DomainError::Validation(
            "conversation parties must differ".into(),
        ));
    }
    Ok((a.min(b), a.max(b)))
}

#[derive(Clone)]
pub struct ConversationDirectory {
    repository: Arc<dyn ConversationRepository>,
}

impl ConversationDirectory {
    pub fn new(repository: Arc<dyn ConversationRepository>) -> Self {
        Self { repository }
    }

    /// Looks up the peer conversation for an unordered pair. Staff-initiated
    /// conversations are excluded; absence is `Ok(None)`, never an error, and
    /// nothing is auto-created.
    pub async fn find_conversation(&self, a: i64, b: i64) -> DomainResult<Option<Conversation>> {
        let (low, high) = canonical_pair(a, b)?;
        self.repository.find_by_pair(low, high, false).await
    }

    pub async fn list_for_party(&self, party_id: i64) -> DomainResult<Vec<Conversation>> {
        self.repository.list_for_party(party_id, false).await
    }

    pub fn resolve_role(conversation: &Conversation, viewer_id: i64) -> DomainResult<PartyRole> {
        if viewer_id == conversation.party_low_id {
            Ok(PartyRole::Low)
        } else if viewer_id == conversation.party_high_id {
            Ok(PartyRole::High)
        } else {
            Err(DomainError::Validation(
                "viewer is not a participant of this conversation".into(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::BoxFuture;
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    #[derive(Default)]
    struct MockConversationRepo {
        by_pair: RwLock<HashMap<(i64, i64, bool), Conversation>>,
    }

    impl MockConversationRepo {
        async fn insert(&self, conversation: Conversation) {
            let key = (
                conversation.party_low_id,
                conversation.party_high_id,
                conversation.staff_initiated,
            );
            self.by_pair.write().await.insert(key, conversation);
        }
    }

    impl ConversationRepository for MockConversationRepo {
        fn find_by_pair(
            &self,
            party_low_id: i64,
            party_high_id: i64,
            staff_initiated: bool,
        ) -> BoxFuture<'_, DomainResult<Option<Conversation>>> {
            Box::pin(async move {
                let by_pair = self.by_pair.read().await;
                Ok(by_pair
                    .get(&(party_low_id, party_high_id, staff_initiated))
                    .cloned())
            })
        }

        fn list_for_party(
            &self,
            party_id: i64,
            staff_initiated: bool,
        ) -> BoxFuture<'_, DomainResult<Vec<Conversation>>> {
            Box::pin(async move {
                let by_pair = self.by_pair.read().await;
                Ok(by_pair
                    .values()
                    .filter(|conversation| {
                        conversation.staff_initiated == staff_initiated
                            && (conversation.party_low_id == party_id
                                || conversation.party_high_id == party_id)
                    })
                    .cloned()
                    .collect())
            })
        }
    }

    fn conversation(id: i64, low: i64, high: i64, staff: bool) -> Conversation {
        Conversation {
            conversation_id: id,
            party_low_id: low,
            party_high_id: high,
            staff_initiated: staff,
            created_at_ms: 1_000,
        }
    }

    #[test]
    fn canonical_pair_orders_and_rejects_self() {
        assert_eq!(canonical_pair(9, 4).expect("pair"), (4, 9));
        assert_eq!(canonical_pair(4, 9).expect("pair"), (4, 9));
        assert!(canonical_pair(7, 7).is_err());
    }

    #[tokio::test]
    async fn find_conversation_is_symmetric() {
        let repo = Arc::new(MockConversationRepo::default());
        repo.insert(conversation(1, 100, 200, false)).await;
        let directory = ConversationDirectory::new(repo);

        let forward = directory.find_conversation(100, 200).await.expect("find");
        let reverse = directory.find_conversation(200, 100).await.expect("find");
        assert_eq!(forward, reverse);
        assert_eq!(forward.expect("present").conversation_id, 1);
    }

    #[tokio::test]
    async fn find_conversation_excludes_staff_namespace() {
        let repo = Arc::new(MockConversationRepo::default());
        repo.insert(conversation(1, 100, 200, true)).await;
        let directory = ConversationDirectory::new(repo);

        let found = directory.find_conversation(100, 200).await.expect("find");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn missing_conversation_is_none_not_error() {
        let repo = Arc::new(MockConversationRepo::default());
        let directory = ConversationDirectory::new(repo);
        let found = directory.find_conversation(1, 2).await.expect("find");
        assert!(found.is_none());
    }

    #[test]
    fn resolve_role_maps_both_sides() {
        let conversation = conversation(1, 100, 200, false);
        assert_eq!(
            ConversationDirectory::resolve_role(&conversation, 100).expect("low"),
            PartyRole::Low
        );
        assert_eq!(
            ConversationDirectory::resolve_role(&conversation, 200).expect("high"),
            PartyRole::High
        );
        assert!(ConversationDirectory::resolve_role(&conversation, 300).is_err());
        assert_eq!(conversation.peer_id(PartyRole::Low), 200);
    }
}
