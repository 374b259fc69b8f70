use std::sync::Arc;

use ludus_domain::chat::ChatService;
use ludus_domain::conversation::ConversationDirectory;
use ludus_domain::notification::NotificationDispatcher;
use ludus_domain::profanity::CensorEngine;
use ludus_infra::config::AppConfig;
use ludus_infra::repositories::{
    InMemoryCensorRuleSource, InMemoryConversationRepository, InMemoryIdentityDirectory,
    InMemoryMessageRepository, InMemoryNotificationRepository,
};

/// The concrete repository handles stay visible so startup code and tests can
/// seed identities, conversations, and rules; the services only see the ports.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub chat: ChatService,
    pub dispatcher: NotificationDispatcher,
    pub censor: Arc<CensorEngine>,
    pub identities: Arc<InMemoryIdentityDirectory>,
    pub conversations: Arc<InMemoryConversationRepository>,
    pub notifications: Arc<InMemoryNotificationRepository>,
    pub censor_rules: Arc<InMemoryCensorRuleSource>,
}

impl AppState {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let identities = Arc::new(InMemoryIdentityDirectory::new());
        let conversations = Arc::new(InMemoryConversationRepository::new());
        let messages = Arc::new(InMemoryMessageRepository::new());
        let notifications = Arc::new(InMemoryNotificationRepository::new());
        let censor_rules = Arc::new(InMemoryCensorRuleSource::new());

        let censor = Arc::new(CensorEngine::new(censor_rules.clone()));
        censor.reload().await?;

        let chat = ChatService::new(
            ConversationDirectory::new(conversations.clone()),
            messages,
            identities.clone(),
            censor.clone(),
            config.history_default_take,
        );
        let dispatcher = NotificationDispatcher::new(notifications.clone(), identities.clone());

        Ok(Self {
            config,
            chat,
            dispatcher,
            censor,
            identities,
            conversations,
            notifications,
            censor_rules,
        })
    }
}
