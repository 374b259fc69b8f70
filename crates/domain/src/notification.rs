use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::ports::identity::IdentityDirectory;
use crate::ports::notification::NotificationRepository;
use crate::util::{now_ms, truncate_chars};

pub const TITLE_MAX_CHARS: usize = 100;
pub const MESSAGE_MAX_CHARS: usize = 1_000;

/// Who a notification is from. Exactly one of the three; the doubly-populated
/// request shape is rejected before any write.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum NotificationSender {
    System,
    User(i64),
    Staff(i64),
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RecipientIdentity {
    User(i64),
    Manager(i64),
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum SendError {
    UnknownSourceId,
    UnknownActionId,
    InvalidSenderUser,
    InvalidSenderManager,
    AmbiguousSender,
    NoRecipient,
    NoValidRecipient,
    DbFailure,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum SendWarning {
    TitleTruncated,
    MessageTruncated,
    InvalidRecipientUser,
    InvalidRecipientManager,
}

#[derive(Clone, Debug, Default)]
pub struct SendInput {
    pub source_id: i64,
    pub action_id: i64,
    pub to_user_id: Option<i64>,
    pub to_manager_id: Option<i64>,
    pub sender_user_id: Option<i64>,
    pub sender_manager_id: Option<i64>,
    pub title: Option<String>,
    pub message: Option<String>,
    pub group_id: Option<i64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendOutcome {
    pub success: bool,
    pub notification_id: Option<i64>,
    pub recipients_added: usize,
    pub warnings: Vec<SendWarning>,
    pub errors: Vec<SendError>,
}

impl SendOutcome {
    fn failed(errors: Vec<SendError>, warnings: Vec<SendWarning>) -> Self {
        Self {
            success: false,
            notification_id: None,
            recipients_added: 0,
            warnings,
            errors,
        }
    }
}

/// The row handed to the repository. Title/message are already truncated.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationRecord {
    pub source_id: i64,
    pub action_id: i64,
    pub sender: NotificationSender,
    pub title: Option<String>,
    pub message: Option<String>,
    pub group_id: Option<i64>,
    pub created_at_ms: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationRecipient {
    pub notification_id: i64,
    pub recipient: RecipientIdentity,
    pub read_at_ms: Option<i64>,
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    repository: Arc<dyn NotificationRepository>,
    identities: Arc<dyn IdentityDirectory>,
}

impl NotificationDispatcher {
    pub fn new(
        repository: Arc<dyn NotificationRepository>,
        identities: Arc<dyn IdentityDirectory>,
    ) -> Self {
        Self {
            repository,
            identities,
        }
    }

    /// Validation pipeline, fail fast with no partial writes: source, action,
    /// sender resolution, recipient resolution, truncation, then one atomic
    /// persistence call. Truncation and dropped recipients are warnings on a
    /// successful send; everything else is an error with nothing written.
    pub async fn send(&self, input: SendInput) -> DomainResult<SendOutcome> {
        if !self.repository.source_exists(input.source_id).await? {
            return Ok(SendOutcome::failed(
                vec![SendError::UnknownSourceId],
                Vec::new(),
            ));
        }
        if !self.repository.action_exists(input.action_id).await? {
            return Ok(SendOutcome::failed(
                vec![SendError::UnknownActionId],
                Vec::new(),
            ));
        }

        let sender = match self.resolve_sender(&input).await? {
            Ok(sender) => sender,
            Err(code) => return Ok(SendOutcome::failed(vec![code], Vec::new())),
        };

        if input.to_user_id.is_none() && input.to_manager_id.is_none() {
            return Ok(SendOutcome::failed(vec![SendError::NoRecipient], Vec::new()));
        }

        let mut warnings = Vec::new();
        let mut recipients = Vec::new();
        if let Some(user_id) = input.to_user_id {
            if self.identities.user_exists(user_id).await? {
                recipients.push(RecipientIdentity::User(user_id));
            } else {
                warnings.push(SendWarning::InvalidRecipientUser);
            }
        }
        if let Some(manager_id) = input.to_manager_id {
            if self.identities.manager_exists(manager_id).await? {
                recipients.push(RecipientIdentity::Manager(manager_id));
            } else {
                warnings.push(SendWarning::InvalidRecipientManager);
            }
        }
        if recipients.is_empty() {
            return Ok(SendOutcome::failed(
                vec![SendError::NoValidRecipient],
                warnings,
            ));
        }

        let title = input.title.map(|title| {
            if title.chars().count() > TITLE_MAX_CHARS {
                warnings.push(SendWarning::TitleTruncated);
                truncate_chars(&title, TITLE_MAX_CHARS)
            } else {
                title
            }
        });
        let message = input.message.map(|message| {
            if message.chars().count() > MESSAGE_MAX_CHARS {
                warnings.push(SendWarning::MessageTruncated);
                truncate_chars(&message, MESSAGE_MAX_CHARS)
            } else {
                message
            }
        });

        let record = NotificationRecord {
            source_id: input.source_id,
            action_id: input.action_id,
            sender,
            title,
            message,
            group_id: input.group_id,
            created_at_ms: now_ms(),
        };

        match self
            .repository
            .create_with_recipients(&record, &recipients)
            .await
        {
            Ok(notification_id) => Ok(SendOutcome {
                success: true,
                notification_id: Some(notification_id),
                recipients_added: recipients.len(),
                warnings,
                errors: Vec::new(),
            }),
            Err(err) => {
                tracing::error!(error = %err, source_id = input.source_id, "notification persist failed");
                Ok(SendOutcome::failed(vec![SendError::DbFailure], warnings))
            }
        }
    }

    /// Marks a recipient row as read; at most once, owner only. A repeat call
    /// reports `false` and changes nothing.
    pub async fn mark_read(
        &self,
        notification_id: i64,
        recipient: RecipientIdentity,
    ) -> DomainResult<bool> {
        self.repository
            .mark_recipient_read(notification_id, recipient, now_ms())
            .await
    }

    async fn resolve_sender(
        &self,
        input: &SendInput,
    ) -> DomainResult<Result<NotificationSender, SendError>> {
        match (input.sender_user_id, input.sender_manager_id) {
            (Some(_), Some(_)) => Ok(Err(SendError::AmbiguousSender)),
            (None, None) => Ok(Ok(NotificationSender::System)),
            (Some(user_id), None) => {
                if self.identities.user_exists(user_id).await? {
                    Ok(Ok(NotificationSender::User(user_id)))
                } else {
                    Ok(Err(SendError::InvalidSenderUser))
                }
            }
            (None, Some(manager_id)) => {
                if self.identities.manager_exists(manager_id).await? {
                    Ok(Ok(NotificationSender::Staff(manager_id)))
                } else {
                    Ok(Err(SendError::InvalidSenderManager))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DomainError;
    use crate::ports::BoxFuture;
    use std::collections::HashSet;
    use tokio::sync::RwLock;

    #[derive(Default)]
    struct MockStore {
        sources: HashSet<i64>,
        actions: HashSet<i64>,
        users: HashSet<i64>,
        managers: HashSet<i64>,
        fail_persist: bool,
        rows: RwLock<(Vec<(i64, NotificationRecord)>, Vec<NotificationRecipient>)>,
    }

    impl MockStore {
        async fn notification_count(&self) -> usize {
            self.rows.read().await.0.len()
        }

        async fn recipient_count(&self) -> usize {
            self.rows.read().await.1.len()
        }

        async fn last_record(&self) -> NotificationRecord {
            self.rows
                .read()
                .await
                .0
                .last()
                .map(|(_, record)| record.clone())
                .expect("stored record")
        }
    }

    impl NotificationRepository for MockStore {
        fn source_exists(&self, source_id: i64) -> BoxFuture<'_, DomainResult<bool>> {
            Box::pin(async move { Ok(self.sources.contains(&source_id)) })
        }

        fn action_exists(&self, action_id: i64) -> BoxFuture<'_, DomainResult<bool>> {
            Box::pin(async move { Ok(self.actions.contains(&action_id)) })
        }

        fn create_with_recipients(
            &self,
            notification: &NotificationRecord,
            recipients: &[RecipientIdentity],
        ) -> BoxFuture<'_, DomainResult<i64>> {
            let notification = notification.clone();
            let recipients = recipients.to_vec();
            Box::pin(async move {
                if self.fail_persist {
                    return Err(DomainError::Db("simulated outage".into()));
                }
                let mut rows = self.rows.write().await;
                let notification_id = rows.0.len() as i64 + 1;
                rows.0.push((notification_id, notification));
                for recipient in recipients {
                    rows.1.push(NotificationRecipient {
                        notification_id,
                        recipient,
                        read_at_ms: None,
                    });
                }
                Ok(notification_id)
            })
        }

        fn mark_recipient_read(
            &self,
            notification_id: i64,
            recipient: RecipientIdentity,
            read_at_ms: i64,
        ) -> BoxFuture<'_, DomainResult<bool>> {
            Box::pin(async move {
                let mut rows = self.rows.write().await;
                for row in rows.1.iter_mut() {
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

    impl IdentityDirectory for MockStore {
        fn user_exists(&self, user_id: i64) -> BoxFuture<'_, DomainResult<bool>> {
            Box::pin(async move { Ok(self.users.contains(&user_id)) })
        }

        fn manager_exists(&self, manager_id: i64) -> BoxFuture<'_, DomainResult<bool>> {
            Box::pin(async move { Ok(self.managers.contains(&manager_id)) })
        }
    }

    fn store() -> Arc<MockStore> {
        Arc::new(MockStore {
            sources: [1, 2].into_iter().collect(),
            actions: [3, 4].into_iter().collect(),
            users: [10, 11].into_iter().collect(),
            managers: [30_000_001, 30_000_100].into_iter().collect(),
            fail_persist: false,
            rows: RwLock::default(),
        })
    }

    fn dispatcher(store: Arc<MockStore>) -> NotificationDispatcher {
        NotificationDispatcher::new(store.clone(), store)
    }

    fn base_input() -> SendInput {
        SendInput {
            source_id: 2,
            action_id: 4,
            to_user_id: Some(10),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn system_sender_fans_out_to_both_recipients() {
        let store = store();
        let outcome = dispatcher(store.clone())
            .send(SendInput {
                to_manager_id: Some(30_000_100),
                ..base_input()
            })
            .await
            .expect("send");

        assert!(outcome.success);
        assert_eq!(outcome.recipients_added, 2);
        assert!(outcome.warnings.is_empty());
        assert_eq!(store.last_record().await.sender, NotificationSender::System);
        assert_eq!(store.recipient_count().await, 2);
    }

    #[tokio::test]
    async fn ambiguous_sender_writes_nothing() {
        let store = store();
        let outcome = dispatcher(store.clone())
            .send(SendInput {
                sender_user_id: Some(10),
                sender_manager_id: Some(30_000_001),
                ..base_input()
            })
            .await
            .expect("send");

        assert!(!outcome.success);
        assert_eq!(outcome.errors, vec![SendError::AmbiguousSender]);
        assert_eq!(store.notification_count().await, 0);
        assert_eq!(store.recipient_count().await, 0);
    }

    #[tokio::test]
    async fn unknown_reference_rows_fail_fast() {
        let store = store();
        let outcome = dispatcher(store.clone())
            .send(SendInput {
                source_id: 99,
                ..base_input()
            })
            .await
            .expect("send");
        assert_eq!(outcome.errors, vec![SendError::UnknownSourceId]);

        let outcome = dispatcher(store.clone())
            .send(SendInput {
                action_id: 99,
                ..base_input()
            })
            .await
            .expect("send");
        assert_eq!(outcome.errors, vec![SendError::UnknownActionId]);
        assert_eq!(store.notification_count().await, 0);
    }

    #[tokio::test]
    async fn invalid_single_sender_is_rejected() {
        let store = store();
        let outcome = dispatcher(store.clone())
            .send(SendInput {
                sender_user_id: Some(404),
                ..base_input()
            })
            .await
            .expect("send");
        assert_eq!(outcome.errors, vec![SendError::InvalidSenderUser]);

        let outcome = dispatcher(store)
            .send(SendInput {
                sender_manager_id: Some(404),
                ..base_input()
            })
            .await
            .expect("send");
        assert_eq!(outcome.errors, vec![SendError::InvalidSenderManager]);
    }

    #[tokio::test]
    async fn missing_and_invalid_recipients() {
        let store = store();
        let outcome = dispatcher(store.clone())
            .send(SendInput {
                to_user_id: None,
                ..base_input()
            })
            .await
            .expect("send");
        assert_eq!(outcome.errors, vec![SendError::NoRecipient]);

        let outcome = dispatcher(store.clone())
            .send(SendInput {
                to_user_id: Some(404),
                to_manager_id: Some(404),
                ..base_input()
            })
            .await
            .expect("send");
        assert_eq!(outcome.errors, vec![SendError::NoValidRecipient]);
        assert_eq!(
            outcome.warnings,
            vec![
                SendWarning::InvalidRecipientUser,
                SendWarning::InvalidRecipientManager
            ]
        );
        assert_eq!(store.notification_count().await, 0);
    }

    #[tokio::test]
    async fn one_invalid_recipient_is_dropped_with_warning() {
        let store = store();
        let outcome = dispatcher(store.clone())
            .send(SendInput {
                to_manager_id: Some(404),
                ..base_input()
            })
            .await
            .expect("send");

        assert!(outcome.success);
        assert_eq!(outcome.recipients_added, 1);
        assert_eq!(outcome.warnings, vec![SendWarning::InvalidRecipientManager]);
        assert_eq!(store.recipient_count().await, 1);
    }

    #[tokio::test]
    async fn oversized_title_truncates_with_warning() {
        let store = store();
        // mirrors the canonical producer call shape: staff sender, staff recipient
        let outcome = dispatcher(store.clone())
            .send(SendInput {
                source_id: 2,
                action_id: 4,
                to_manager_id: Some(30_000_100),
                sender_manager_id: Some(30_000_001),
                title: Some("x".repeat(500)),
                ..Default::default()
            })
            .await
            .expect("send");

        assert!(outcome.success);
        assert_eq!(outcome.recipients_added, 1);
        assert!(outcome.warnings.contains(&SendWarning::TitleTruncated));

        let record = store.last_record().await;
        assert_eq!(
            record.title.as_ref().map(|title| title.chars().count()),
            Some(TITLE_MAX_CHARS)
        );
        assert_eq!(record.sender, NotificationSender::Staff(30_000_001));
    }

    #[tokio::test]
    async fn oversized_message_truncates_independently() {
        let store = store();
        let outcome = dispatcher(store.clone())
            .send(SendInput {
                title: Some("short".to_string()),
                message: Some("y".repeat(MESSAGE_MAX_CHARS + 1)),
                ..base_input()
            })
            .await
            .expect("send");

        assert!(outcome.success);
        assert_eq!(outcome.warnings, vec![SendWarning::MessageTruncated]);
        let record = store.last_record().await;
        assert_eq!(record.title.as_deref(), Some("short"));
        assert_eq!(
            record.message.as_ref().map(|message| message.chars().count()),
            Some(MESSAGE_MAX_CHARS)
        );
    }

    #[tokio::test]
    async fn persistence_failure_surfaces_as_db_failure() {
        let store = Arc::new(MockStore {
            sources: [2].into_iter().collect(),
            actions: [4].into_iter().collect(),
            users: [10].into_iter().collect(),
            fail_persist: true,
            ..Default::default()
        });
        let outcome = dispatcher(store.clone())
            .send(base_input())
            .await
            .expect("send");

        assert!(!outcome.success);
        assert_eq!(outcome.errors, vec![SendError::DbFailure]);
        assert_eq!(store.notification_count().await, 0);
        assert_eq!(store.recipient_count().await, 0);
    }

    #[tokio::test]
    async fn recipient_read_is_set_once() {
        let store = store();
        let dispatcher = dispatcher(store.clone());
        let outcome = dispatcher.send(base_input()).await.expect("send");
        let notification_id = outcome.notification_id.expect("id");

        assert!(
            dispatcher
                .mark_read(notification_id, RecipientIdentity::User(10))
                .await
                .expect("mark")
        );
        assert!(
            !dispatcher
                .mark_read(notification_id, RecipientIdentity::User(10))
                .await
                .expect("mark")
        );
    }
}
