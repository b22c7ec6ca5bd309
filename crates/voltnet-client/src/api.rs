use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use voltnet_types::api::{
    ConversationResponse, ConversationSummary, CreateConversationRequest, ErrorBody,
    MarkAllReadResponse, NotificationResponse, SendMessageRequest, UnreadCountResponse,
};
use voltnet_types::models::{Message, Profile};

use crate::error::SyncError;

/// Everything the synchronization client needs from the server. Tests swap
/// in a scripted implementation; production uses [`HttpApi`].
#[allow(async_fn_in_trait)]
pub trait ServerApi {
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, SyncError>;
    async fn create_conversation(
        &self,
        participant_id: Uuid,
    ) -> Result<ConversationResponse, SyncError>;
    async fn list_messages(
        &self,
        conversation_id: Uuid,
        limit: Option<u32>,
    ) -> Result<Vec<Message>, SyncError>;
    async fn send_message(&self, conversation_id: Uuid, body: &str) -> Result<Message, SyncError>;
    async fn mark_message_read(&self, message_id: Uuid) -> Result<Message, SyncError>;
    async fn unread_message_count(&self) -> Result<u64, SyncError>;
    async fn list_notifications(&self) -> Result<Vec<NotificationResponse>, SyncError>;
    async fn mark_notification_read(&self, notification_id: Uuid) -> Result<(), SyncError>;
    async fn mark_all_notifications_read(&self) -> Result<u64, SyncError>;
    async fn unread_notification_count(&self) -> Result<u64, SyncError>;
    async fn fetch_profile(&self, user_id: Uuid) -> Result<Profile, SyncError>;
}

/// reqwest-backed transport against the voltnet-server routes.
pub struct HttpApi {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpApi {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SyncError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(SyncError::transport)?;
        decode_response(response).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, SyncError> {
        let mut request = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(SyncError::transport)?;
        decode_response(response).await
    }
}

async fn decode_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, SyncError> {
    let status = response.status();
    if status.is_success() {
        return response.json::<T>().await.map_err(SyncError::transport);
    }

    let message = response
        .json::<ErrorBody>()
        .await
        .map(|b| b.error)
        .unwrap_or_else(|_| status.to_string());

    Err(SyncError::Server {
        status: status.as_u16(),
        message,
    })
}

impl ServerApi for HttpApi {
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, SyncError> {
        self.get_json("/conversations").await
    }

    async fn create_conversation(
        &self,
        participant_id: Uuid,
    ) -> Result<ConversationResponse, SyncError> {
        self.post_json("/conversations", Some(&CreateConversationRequest { participant_id }))
            .await
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        limit: Option<u32>,
    ) -> Result<Vec<Message>, SyncError> {
        let path = match limit {
            Some(n) => format!("/conversations/{}/messages?limit={}", conversation_id, n),
            None => format!("/conversations/{}/messages", conversation_id),
        };
        self.get_json(&path).await
    }

    async fn send_message(&self, conversation_id: Uuid, body: &str) -> Result<Message, SyncError> {
        self.post_json(
            &format!("/conversations/{}/messages", conversation_id),
            Some(&SendMessageRequest { body: body.to_string() }),
        )
        .await
    }

    async fn mark_message_read(&self, message_id: Uuid) -> Result<Message, SyncError> {
        self.post_json::<(), Message>(&format!("/messages/{}/read", message_id), None)
            .await
    }

    async fn unread_message_count(&self) -> Result<u64, SyncError> {
        let response: UnreadCountResponse = self.get_json("/messages/unread-count").await?;
        Ok(response.count)
    }

    async fn list_notifications(&self) -> Result<Vec<NotificationResponse>, SyncError> {
        self.get_json("/notifications").await
    }

    async fn mark_notification_read(&self, notification_id: Uuid) -> Result<(), SyncError> {
        let _: serde_json::Value = self
            .post_json::<(), _>(&format!("/notifications/{}/read", notification_id), None)
            .await?;
        Ok(())
    }

    async fn mark_all_notifications_read(&self) -> Result<u64, SyncError> {
        let response: MarkAllReadResponse =
            self.post_json::<(), _>("/notifications/read-all", None).await?;
        Ok(response.marked)
    }

    async fn unread_notification_count(&self) -> Result<u64, SyncError> {
        let response: UnreadCountResponse = self.get_json("/notifications/unread-count").await?;
        Ok(response.count)
    }

    async fn fetch_profile(&self, user_id: Uuid) -> Result<Profile, SyncError> {
        self.get_json(&format!("/users/{}/profile", user_id)).await
    }
}
