use std::collections::HashSet;
use std::sync::Arc;

use ludus_domain::DomainResult;
use ludus_domain::chat::{Message, MessageAppend};
use ludus_domain::conversation::Conversation;
use ludus_domain::notification::{NotificationRecipient, NotificationRecord, RecipientIdentity};
use ludus_domain::ports::BoxFuture;
use ludus_domain::ports::chat::MessageRepository;
use ludus_domain::ports::conversation::ConversationRepository;
use ludus_domain::ports::identity::IdentityDirectory;
use ludus_domain::ports::notification::NotificationRepository;
use ludus_domain::ports::profanity::CensorRuleSource;
use ludus_domain::profanity::CensorRule;
use ludus_domain::util::now_ms;
use metrics::counter;
use tokio::sync::RwLock;

const NOTIFICATIONS_PERSISTED_TOTAL: &str = "ludus_notifications_persisted_total";

fn ordering_key(message: &Message) -> (i64, i64) {
    (message.sent_at_ms, message.message_id)
}

#[derive(Default)]
pub struct InMemoryIdentityDirectory {
    users: Arc<RwLock<HashSet<i64>>>,
    managers: Arc<RwLock<HashSet<i64>>>,
}

impl InMemoryIdentityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user_id: i64) {
        self.users.write().await.insert(user_id);
    }

    pub async fn insert_manager(&self, manager_id: i64) {
        self.managers.write().await.insert(manager_id);
    }
}

impl IdentityDirectory for InMemoryIdentityDirectory {
    fn user_exists(&self, user_id: i64) -> BoxFuture<'_, DomainResult<bool>> {
        let users = self.users.clone();
        Box::pin(async move { Ok(users.read().await.contains(&user_id)) })
    }

    fn manager_exists(&self, manager_id: i64) -> BoxFuture<'_, DomainResult<bool>> {
        let managers = self.managers.clone();
        Box::pin(async move { Ok(managers.read().await.contains(&manager_id)) })
    }
}

#[derive(Default)]
pub struct InMemoryConversationRepository {
    store: Arc<RwLock<Vec<Conversation>>>,
}

impl InMemoryConversationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a conversation for a canonical pair if one is not already
    /// present, returning it either way. Seeding hook standing in for the
    /// external collaborator that owns conversation rows.
    pub async fn provision(
        &self,
        party_low_id: i64,
        party_high_id: i64,
        staff_initiated: bool,
    ) -> Conversation {
        let mut store = self.store.write().await;
        if let Some(existing) = store.iter().find(|conversation| {
            conversation.party_low_id == party_low_id
                && conversation.party_high_id == party_high_id
                && conversation.staff_initiated == staff_initiated
        }) {
            return existing.clone();
        }
        let conversation = Conversation {
            conversation_id: store.len() as i64 + 1,
            party_low_id,
            party_high_id,
            staff_initiated,
            created_at_ms: now_ms(),
        };
        store.push(conversation.clone());
        conversation
    }
}

impl ConversationRepository for InMemoryConversationRepository {
    fn find_by_pair(
        &self,
        party_low_id: i64,
        party_high_id: i64,
        staff_initiated: bool,
    ) -> BoxFuture<'_, DomainResult<Option<Conversation>>> {
        let store = self.store.clone();
        Box::pin(async move {
            let store = store.read().await;
            Ok(store
                .iter()
                .find(|conversation| {
                    conversation.party_low_id == party_low_id
                        && conversation.party_high_id == party_high_id
                        && conversation.staff_initiated == staff_initiated
                })
                .cloned())
        })
    }

    fn list_for_party(
        &self,
        party_id: i64,
        staff_initiated: bool,
    ) -> BoxFuture<'_, DomainResult<Vec<Conversation>>> {
        let store = self.store.clone();
        Box::pin(async move {
            let store = store.read().await;
            Ok(store
                .iter()
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

#[derive(Default)]
pub struct InMemoryMessageRepository {
    store: Arc<RwLock<(Vec<Message>, i64)>>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageRepository for InMemoryMessageRepository {
    fn append(&self, message: &MessageAppend) -> BoxFuture<'_, DomainResult<Message>> {
        let append = message.clone();
        let store = self.store.clone();
        Box::pin(async move {
            let mut store = store.write().await;
            store.1 += 1;
            let message = Message {
                message_id: store.1,
                conversation_id: append.conversation_id,
                sender_is_party_low: append.sender_is_party_low,
                body: append.body,
                sent_at_ms: append.sent_at_ms,
                is_read: false,
            };
            store.0.push(message.clone());
            Ok(message)
        })
    }

    fn query_before(
        &self,
        conversation_id: i64,
        cursor_ms: i64,
        cursor_id: i64,
        limit: usize,
    ) -> BoxFuture<'_, DomainResult<Vec<Message>>> {
        let store = self.store.clone();
        Box::pin(async move {
            let store = store.read().await;
            let mut page: Vec<Message> = store
                .0
                .iter()
                .filter(|message| {
                    message.conversation_id == conversation_id
                        && ordering_key(message) < (cursor_ms, cursor_id)
                })
                .cloned()
                .collect();
            page.sort_by_key(|message| std::cmp::Reverse(ordering_key(message)));
            page.truncate(limit);
            Ok(page)
        })
    }

    fn query_after(
        &self,
        conversation_id: i64,
        cursor_ms: i64,
        cursor_id: i64,
        limit: usize,
    ) -> BoxFuture<'_, DomainResult<Vec<Message>>> {
        let store = self.store.clone();
        Box::pin(async move {
            let store = store.read().await;
            let mut page: Vec<Message> = store
                .0
                .iter()
                .filter(|message| {
                    message.conversation_id == conversation_id
                        && ordering_key(message) > (cursor_ms, cursor_id)
                })
                .cloned()
                .collect();
            page.sort_by_key(ordering_key);
            page.truncate(limit);
            Ok(page)
        })
    }

    fn query_latest(
        &self,
        conversation_id: i64,
        limit: usize,
    ) -> BoxFuture<'_, DomainResult<Vec<Message>>> {
        let store = self.store.clone();
        Box::pin(async move {
            let store = store.read().await;
            let mut page: Vec<Message> = store
                .0
                .iter()
                .filter(|message| message.conversation_id == conversation_id)
                .cloned()
                .collect();
            page.sort_by_key(|message| std::cmp::Reverse(ordering_key(message)));
            page.truncate(limit);
            Ok(page)
        })
    }

    fn latest_message(
        &self,
        conversation_id: i64,
    ) -> BoxFuture<'_, DomainResult<Option<Message>>> {
        let store = self.store.clone();
        Box::pin(async move {
            let store = store.read().await;
            Ok(store
                .0
                .iter()
                .filter(|message| message.conversation_id == conversation_id)
                .max_by_key(|message| ordering_key(message))
                .cloned())
        })
    }

    fn unread_count(
        &self,
        conversation_id: i64,
        sender_is_party_low: bool,
    ) -> BoxFuture<'_, DomainResult<usize>> {
        let store = self.store.clone();
        Box::pin(async move {
            let store = store.read().await;
            Ok(store
                .0
                .iter()
                .filter(|message| {
                    message.conversation_id == conversation_id
                        && message.sender_is_party_low == sender_is_party_low
                        && !message.is_read
                })
                .count())
        })
    }

    fn mark_read(
        &self,
        conversation_id: i64,
        sender_is_party_low: bool,
    ) -> BoxFuture<'_, DomainResult<usize>> {
        let store = self.store.clone();
        Box::pin(async move {
            let mut store = store.write().await;
            let mut changed = 0;
            for message in store.0.iter_mut() {
                if message.conversation_id == conversation_id
                    && message.sender_is_party_low == sender_is_party_low
                    && !message.is_read
                {
                    message.is_read = true;
                    changed += 1;
                }
            }
            Ok(changed)
        })
    }
}

#[derive(Default)]
pub struct InMemoryNotificationRepository {
    sources: Arc<RwLock<HashSet<i64>>>,
    actions: Arc<RwLock<HashSet<i64>>>,
    store: Arc<RwLock<(Vec<(i64, NotificationRecord)>, Vec<NotificationRecipient>)>>,
}

impl InMemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_source(&self, source_id: i64) {
        self.sources.write().await.insert(source_id);
    }

    pub async fn register_action(&self, action_id: i64) {
        self.actions.write().await.insert(action_id);
    }

    pub async fn notification_count(&self) -> usize {
        self.store.read().await.0.len()
    }

    pub async fn recipient_count(&self) -> usize {
        self.store.read().await.1.len()
    }
}

impl NotificationRepository for InMemoryNotificationRepository {
    fn source_exists(&self, source_id: i64) -> BoxFuture<'_, DomainResult<bool>> {
        let sources = self.sources.clone();
        Box::pin(async move { Ok(sources.read().await.contains(&source_id)) })
    }

    fn action_exists(&self, action_id: i64) -> BoxFuture<'_, DomainResult<bool>> {
        let actions = self.actions.clone();
        Box::pin(async move { Ok(actions.read().await.contains(&action_id)) })
    }

    fn create_with_recipients(
        &self,
        notification: &NotificationRecord,
        recipients: &[RecipientIdentity],
    ) -> BoxFuture<'_, DomainResult<i64>> {
        let notification = notification.clone();
        let recipients = recipients.to_vec();
        let store = self.store.clone();
        Box::pin(async move {
            let mut store = store.write().await;
            let notification_id = store.0.len() as i64 + 1;
            store.0.push((notification_id, notification));
            for recipient in recipients {
                store.1.push(NotificationRecipient {
                    notification_id,
                    recipient,
                    read_at_ms: None,
                });
            }
            counter!(NOTIFICATIONS_PERSISTED_TOTAL).increment(1);
            Ok(notification_id)
        })
    }

    fn mark_recipient_read(
        &self,
        notification_id: i64,
        recipient: RecipientIdentity,
        read_at_ms: i64,
    ) -> BoxFuture<'_, DomainResult<bool>> {
        let store = self.store.clone();
        Box::pin(async move {
            let mut store = store.write().await;
            for row in store.1.iter_mut() {
                if row.notification_id == notification_id
                    && row.recipient == recipient
                    && row.read_at_ms.is_none()
                {
                    row.read_at_ms = Some(read_at_ms);
                    return Ok(true);
                }
            }
            Ok(false)
        })
    }
}

#[derive(Default)]
pub struct InMemoryCensorRuleSource {
    rules: Arc<RwLock<Vec<CensorRule>>>,
}

impl InMemoryCensorRuleSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn replace_rules(&self, rules: Vec<CensorRule>) {
        *self.rules.write().await = rules;
    }
}

impl CensorRuleSource for InMemoryCensorRuleSource {
    fn load_rules(&self) -> BoxFuture<'_, DomainResult<Vec<CensorRule>>> {
        let rules = self.rules.clone();
        Box::pin(async move { Ok(rules.read().await.clone()) })
    }
}

#[cfg(test)]
mod memory_repository_tests {
    use super::*;
    use ludus_domain::notification::NotificationSender;

    fn append(conversation_id: i64, sent_at_ms: i64) -> MessageAppend {
        MessageAppend {
            conversation_id,
            sender_is_party_low: true,
            body: "m".to_string(),
            sent_at_ms,
        }
    }

    #[tokio::test]
    async fn provision_is_idempotent_per_pair() {
        let repo = InMemoryConversationRepository::new();
        let first = repo.provision(10, 20, false).await;
        let second = repo.provision(10, 20, false).await;
        assert_eq!(first.conversation_id, second.conversation_id);

        let staff = repo.provision(10, 20, true).await;
        assert_ne!(first.conversation_id, staff.conversation_id);
    }

    #[tokio::test]
    async fn equal_timestamps_order_by_assigned_id() {
        let repo = InMemoryMessageRepository::new();
        for _ in 0..3 {
            repo.append(&append(1, 500)).await.expect("append");
        }

        let newest_first = repo.query_latest(1, 10).await.expect("query");
        let ids: Vec<i64> = newest_first.iter().map(|message| message.message_id).collect();
        assert_eq!(ids, vec![3, 2, 1]);

        let latest = repo.latest_message(1).await.expect("query").expect("row");
        assert_eq!(latest.message_id, 3);
    }

    #[tokio::test]
    async fn cursor_queries_are_strict_and_scoped() {
        let repo = InMemoryMessageRepository::new();
        repo.append(&append(1, 10)).await.expect("append");
        repo.append(&append(1, 20)).await.expect("append");
        repo.append(&append(2, 15)).await.expect("append");

        let before = repo.query_before(1, 20, i64::MIN, 10).await.expect("query");
        assert_eq!(before.len(), 1);
        assert_eq!(before[0].sent_at_ms, 10);

        let after = repo.query_after(1, 10, i64::MAX, 10).await.expect("query");
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].sent_at_ms, 20);
    }

    #[tokio::test]
    async fn composite_cursor_splits_tied_timestamps() {
        let repo = InMemoryMessageRepository::new();
        for _ in 0..4 {
            repo.append(&append(1, 500)).await.expect("append");
        }

        let before = repo.query_before(1, 500, 3, 10).await.expect("query");
        let ids: Vec<i64> = before.iter().map(|message| message.message_id).collect();
        assert_eq!(ids, vec![2, 1]);

        let after = repo.query_after(1, 500, 2, 10).await.expect("query");
        let ids: Vec<i64> = after.iter().map(|message| message.message_id).collect();
        assert_eq!(ids, vec![3, 4]);
    }

    #[tokio::test]
    async fn notification_insert_writes_all_rows_together() {
        let repo = InMemoryNotificationRepository::new();
        let record = NotificationRecord {
            source_id: 1,
            action_id: 2,
            sender: NotificationSender::System,
            title: None,
            message: None,
            group_id: None,
            created_at_ms: 0,
        };
        let recipients = [
            RecipientIdentity::User(10),
            RecipientIdentity::Manager(30_000_001),
        ];

        let id = repo
            .create_with_recipients(&record, &recipients)
            .await
            .expect("create");
        assert_eq!(repo.notification_count().await, 1);
        assert_eq!(repo.recipient_count().await, 2);

        assert!(
            repo.mark_recipient_read(id, RecipientIdentity::User(10), 99)
                .await
                .expect("mark")
        );
        assert!(
            !repo
                .mark_recipient_read(id, RecipientIdentity::User(10), 100)
                .await
                .expect("mark")
        );
    }
}
