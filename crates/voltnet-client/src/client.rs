use std::collections::HashMap;

use tracing::{debug, warn};
use uuid::Uuid;

use voltnet_types::api::{ConversationSummary, NotificationResponse};
use voltnet_types::models::{Message, Profile};

use crate::api::ServerApi;
use crate::error::SyncError;
use crate::profiles::ProfileCache;
use crate::query::TrackedQuery;
use crate::SyncConfig;

/// The polling/caching layer reconciling local optimistic state with the
/// server. One instance per signed-in user; queries suspend individually
/// while their requests are in flight.
///
/// Every mutating operation follows the same shape: overlay the optimistic
/// change, dispatch the request, then either refetch the authoritative
/// snapshot (success) or roll the overlay back and surface the error
/// (failure, manual retry only). Refetches always start a fresh generation,
/// so a poll response that lost the race is discarded on arrival.
pub struct SyncClient<A: ServerApi> {
    api: A,
    config: SyncConfig,
    current_user: Uuid,
    pub conversations: TrackedQuery<Vec<ConversationSummary>>,
    pub notifications: TrackedQuery<Vec<NotificationResponse>>,
    pub unread_messages: TrackedQuery<u64>,
    pub unread_notifications: TrackedQuery<u64>,
    messages: HashMap<Uuid, TrackedQuery<Vec<Message>>>,
    profiles: ProfileCache,
}

impl<A: ServerApi> SyncClient<A> {
    pub fn new(api: A, current_user: Uuid, config: SyncConfig) -> Self {
        let profiles = ProfileCache::new(config.profile_cache_capacity);
        Self {
            api,
            config,
            current_user,
            conversations: TrackedQuery::new(),
            notifications: TrackedQuery::new(),
            unread_messages: TrackedQuery::new(),
            unread_notifications: TrackedQuery::new(),
            messages: HashMap::new(),
            profiles,
        }
    }

    pub fn current_user(&self) -> Uuid {
        self.current_user
    }

    /// Rendered message view for a conversation, if one has been opened.
    pub fn messages_view(&self, conversation_id: Uuid) -> Option<Vec<Message>> {
        self.messages.get(&conversation_id)?.view()
    }

    /// Resolve a display identity through the shared read-through cache.
    pub async fn profile(&self, user_id: Uuid) -> Result<Profile, SyncError> {
        self.profiles.resolve(&self.api, user_id).await
    }

    // -- Fetch paths --

    pub async fn refresh_conversations(&mut self) -> Result<(), SyncError> {
        let generation = self.conversations.begin_fetch();
        let result = self.api.list_conversations().await;
        finish(self.conversations.settle(generation, result.clone()), result)
    }

    /// Fetch (or re-fetch) a conversation's full message history.
    pub async fn open_conversation(&mut self, conversation_id: Uuid) -> Result<(), SyncError> {
        let query = self.messages.entry(conversation_id).or_default();
        let generation = query.begin_fetch();
        let result = self.api.list_messages(conversation_id, None).await;
        finish(query.settle(generation, result.clone()), result)
    }

    pub async fn refresh_notifications(&mut self) -> Result<(), SyncError> {
        let generation = self.notifications.begin_fetch();
        let result = self.api.list_notifications().await;
        finish(self.notifications.settle(generation, result.clone()), result)
    }

    pub async fn refresh_unread_counts(&mut self) -> Result<(), SyncError> {
        let generation = self.unread_messages.begin_fetch();
        let result = self.api.unread_message_count().await;
        finish(self.unread_messages.settle(generation, result.clone()), result)?;

        let generation = self.unread_notifications.begin_fetch();
        let result = self.api.unread_notification_count().await;
        finish(self.unread_notifications.settle(generation, result.clone()), result)
    }

    /// One background poll cycle: notifications and unread counters. This is
    /// what catches server-side changes the local client did not cause (the
    /// counterpart's messages, fan-out from post/like/comment events).
    pub async fn poll_tick(&mut self) -> Result<(), SyncError> {
        self.refresh_notifications().await?;
        self.refresh_unread_counts().await
    }

    /// Drive the poll cadence forever. The interval comes from the explicit
    /// [`SyncConfig`]; poll failures are logged and retried next tick.
    pub async fn run(&mut self) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.poll_tick().await {
                warn!("background poll failed: {}", e);
            } else {
                debug!("background poll complete");
            }
        }
    }

    // -- Mutation paths --

    /// Send a message with an optimistic local echo. On rejection the echo
    /// disappears and the error is returned for the caller to surface.
    pub async fn send_message(
        &mut self,
        conversation_id: Uuid,
        body: &str,
    ) -> Result<Message, SyncError> {
        let provisional = Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id: self.current_user,
            body: body.trim().to_string(),
            is_read: false,
            read_at: None,
            created_at: chrono::Utc::now(),
        };

        let ticket = self.messages.entry(conversation_id).or_default().apply_optimistic({
            let provisional = provisional.clone();
            move |view: &mut Vec<Message>| view.push(provisional.clone())
        });

        let result = self.api.send_message(conversation_id, body).await;
        match result {
            Ok(message) => {
                // Authoritative ordering comes from the store; replace the
                // echo with a fresh snapshot.
                if let Err(e) = self.open_conversation(conversation_id).await {
                    warn!("refetch after send failed: {}", e);
                }
                Ok(message)
            }
            Err(e) => {
                if let (Some(ticket), Some(query)) = (ticket, self.messages.get_mut(&conversation_id)) {
                    query.rollback(ticket);
                }
                Err(e)
            }
        }
    }

    /// Mark a counterpart's message read. Optimistically flips the flag and
    /// decrements the viewer's unread badge; a server rejection restores
    /// both. Server-side the transition is idempotent, so duplicate calls
    /// from overlapping poll cycles are harmless.
    pub async fn mark_message_read(
        &mut self,
        conversation_id: Uuid,
        message_id: Uuid,
    ) -> Result<(), SyncError> {
        let message_ticket = self
            .messages
            .get_mut(&conversation_id)
            .and_then(|q| {
                q.apply_optimistic(move |view: &mut Vec<Message>| {
                    if let Some(m) = view.iter_mut().find(|m| m.id == message_id) {
                        m.is_read = true;
                    }
                })
            });
        let badge_ticket = self
            .unread_messages
            .apply_optimistic(|count: &mut u64| *count = count.saturating_sub(1));

        let result = self.api.mark_message_read(message_id).await;
        match result {
            Ok(_) => {
                if let Err(e) = self.refresh_unread_counts().await {
                    warn!("unread refetch after read receipt failed: {}", e);
                }
                Ok(())
            }
            Err(e) => {
                if let (Some(ticket), Some(query)) =
                    (message_ticket, self.messages.get_mut(&conversation_id))
                {
                    query.rollback(ticket);
                }
                if let Some(ticket) = badge_ticket {
                    self.unread_messages.rollback(ticket);
                }
                Err(e)
            }
        }
    }

    /// Bulk notification read with an optimistic badge reset.
    pub async fn mark_all_notifications_read(&mut self) -> Result<u64, SyncError> {
        let list_ticket = self.notifications.apply_optimistic(|view: &mut Vec<NotificationResponse>| {
            for n in view.iter_mut() {
                n.is_read = true;
            }
        });
        let badge_ticket = self.unread_notifications.apply_optimistic(|count: &mut u64| *count = 0);

        let result = self.api.mark_all_notifications_read().await;
        match result {
            Ok(marked) => {
                if let Err(e) = self.refresh_notifications().await {
                    warn!("notification refetch after read-all failed: {}", e);
                }
                if let Err(e) = self.refresh_unread_counts().await {
                    warn!("unread refetch after read-all failed: {}", e);
                }
                Ok(marked)
            }
            Err(e) => {
                if let Some(ticket) = list_ticket {
                    self.notifications.rollback(ticket);
                }
                if let Some(ticket) = badge_ticket {
                    self.unread_notifications.rollback(ticket);
                }
                Err(e)
            }
        }
    }

    /// Start (or rejoin) a conversation with `participant_id`. The server
    /// resolves duplicate pairs to the existing row, so this is safe to call
    /// from both sides at once.
    pub async fn start_conversation(&mut self, participant_id: Uuid) -> Result<Uuid, SyncError> {
        let response = self.api.create_conversation(participant_id).await?;
        if let Err(e) = self.refresh_conversations().await {
            warn!("conversation refetch after create failed: {}", e);
        }
        Ok(response.id)
    }
}

/// A settle that reports false means a fresher request superseded this one;
/// the caller treats it as success because the newer fetch owns the outcome.
fn finish<T>(applied: bool, result: Result<T, SyncError>) -> Result<(), SyncError> {
    if !applied {
        debug!("stale response discarded (superseded by a newer fetch)");
        return Ok(());
    }
    result.map(|_| ())
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use uuid::Uuid;

    use voltnet_types::api::{ConversationResponse, ConversationSummary, NotificationResponse};
    use voltnet_types::models::{Message, NotificationKind, Profile};

    use super::SyncClient;
    use crate::api::ServerApi;
    use crate::error::SyncError;
    use crate::SyncConfig;

    #[derive(Default)]
    struct Script {
        list_messages: VecDeque<Result<Vec<Message>, SyncError>>,
        send_message: VecDeque<Result<Message, SyncError>>,
        mark_message_read: VecDeque<Result<Message, SyncError>>,
        unread_messages: VecDeque<Result<u64, SyncError>>,
        list_notifications: VecDeque<Result<Vec<NotificationResponse>, SyncError>>,
        mark_all: VecDeque<Result<u64, SyncError>>,
        unread_notifications: VecDeque<Result<u64, SyncError>>,
    }

    /// Each call pops the next scripted response; an unscripted call is a
    /// test bug and panics.
    #[derive(Clone, Default)]
    struct ScriptedApi {
        script: Arc<Mutex<Script>>,
    }

    impl ScriptedApi {
        fn push<T>(&self, pick: impl FnOnce(&mut Script) -> &mut VecDeque<T>, value: T) {
            pick(&mut self.script.lock().unwrap()).push_back(value);
        }

        fn pop<T>(&self, pick: impl FnOnce(&mut Script) -> &mut VecDeque<T>, what: &str) -> T {
            pick(&mut self.script.lock().unwrap())
                .pop_front()
                .unwrap_or_else(|| panic!("unscripted call: {}", what))
        }
    }

    impl ServerApi for ScriptedApi {
        async fn list_messages(
            &self,
            _conversation_id: Uuid,
            _limit: Option<u32>,
        ) -> Result<Vec<Message>, SyncError> {
            self.pop(|s| &mut s.list_messages, "list_messages")
        }

        async fn send_message(&self, _: Uuid, _: &str) -> Result<Message, SyncError> {
            self.pop(|s| &mut s.send_message, "send_message")
        }

        async fn mark_message_read(&self, _: Uuid) -> Result<Message, SyncError> {
            self.pop(|s| &mut s.mark_message_read, "mark_message_read")
        }

        async fn unread_message_count(&self) -> Result<u64, SyncError> {
            self.pop(|s| &mut s.unread_messages, "unread_message_count")
        }

        async fn list_notifications(&self) -> Result<Vec<NotificationResponse>, SyncError> {
            self.pop(|s| &mut s.list_notifications, "list_notifications")
        }

        async fn mark_all_notifications_read(&self) -> Result<u64, SyncError> {
            self.pop(|s| &mut s.mark_all, "mark_all_notifications_read")
        }

        async fn unread_notification_count(&self) -> Result<u64, SyncError> {
            self.pop(|s| &mut s.unread_notifications, "unread_notification_count")
        }

        async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, SyncError> {
            unimplemented!()
        }
        async fn create_conversation(&self, _: Uuid) -> Result<ConversationResponse, SyncError> {
            unimplemented!()
        }
        async fn mark_notification_read(&self, _: Uuid) -> Result<(), SyncError> {
            unimplemented!()
        }
        async fn fetch_profile(&self, _: Uuid) -> Result<Profile, SyncError> {
            unimplemented!()
        }
    }

    fn client(api: &ScriptedApi) -> SyncClient<ScriptedApi> {
        SyncClient::new(api.clone(), Uuid::new_v4(), SyncConfig::default())
    }

    fn message(conversation_id: Uuid, sender_id: Uuid, body: &str) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            body: body.to_string(),
            is_read: false,
            read_at: None,
            created_at: chrono::Utc::now(),
        }
    }

    fn notification(is_read: bool) -> NotificationResponse {
        NotificationResponse {
            id: Uuid::new_v4(),
            kind: NotificationKind::PostLiked,
            actor: None,
            target_type: Some("post".into()),
            target_id: Some(Uuid::new_v4()),
            is_read,
            created_at: chrono::Utc::now(),
        }
    }

    fn transport_down() -> SyncError {
        SyncError::Transport("connection refused".into())
    }

    #[tokio::test]
    async fn send_message_commits_via_authoritative_refetch() {
        let api = ScriptedApi::default();
        let mut client = client(&api);
        let conv = Uuid::new_v4();

        api.push(|s| &mut s.list_messages, Ok(vec![]));
        client.open_conversation(conv).await.unwrap();

        let stored = message(conv, client.current_user(), "see you at the charger");
        api.push(|s| &mut s.send_message, Ok(stored.clone()));
        api.push(|s| &mut s.list_messages, Ok(vec![stored.clone()]));

        let sent = client.send_message(conv, "see you at the charger").await.unwrap();
        assert_eq!(sent.id, stored.id);

        let view = client.messages_view(conv).unwrap();
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].id, stored.id);
    }

    #[tokio::test]
    async fn rejected_send_rolls_the_echo_back() {
        let api = ScriptedApi::default();
        let mut client = client(&api);
        let conv = Uuid::new_v4();

        let existing = message(conv, Uuid::new_v4(), "hello");
        api.push(|s| &mut s.list_messages, Ok(vec![existing.clone()]));
        client.open_conversation(conv).await.unwrap();

        api.push(|s| &mut s.send_message, Err(transport_down()));
        let err = client.send_message(conv, "did you get this?").await.unwrap_err();
        assert_eq!(err, transport_down());

        // The optimistic echo is gone; the view equals the pre-mutation snapshot.
        let view = client.messages_view(conv).unwrap();
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].id, existing.id);
    }

    #[tokio::test]
    async fn read_receipt_failure_restores_flag_and_badge() {
        let api = ScriptedApi::default();
        let mut client = client(&api);
        let conv = Uuid::new_v4();

        let incoming = message(conv, Uuid::new_v4(), "charge report attached");
        api.push(|s| &mut s.list_messages, Ok(vec![incoming.clone()]));
        client.open_conversation(conv).await.unwrap();

        api.push(|s| &mut s.unread_messages, Ok(1));
        api.push(|s| &mut s.unread_notifications, Ok(0));
        client.refresh_unread_counts().await.unwrap();

        api.push(|s| &mut s.mark_message_read, Err(transport_down()));
        let err = client.mark_message_read(conv, incoming.id).await.unwrap_err();
        assert_eq!(err, transport_down());

        assert!(!client.messages_view(conv).unwrap()[0].is_read);
        assert_eq!(client.unread_messages.view(), Some(1));
    }

    #[tokio::test]
    async fn read_receipt_success_refetches_the_badge() {
        let api = ScriptedApi::default();
        let mut client = client(&api);
        let conv = Uuid::new_v4();

        let incoming = message(conv, Uuid::new_v4(), "spotted a free stall");
        api.push(|s| &mut s.list_messages, Ok(vec![incoming.clone()]));
        client.open_conversation(conv).await.unwrap();

        api.push(|s| &mut s.unread_messages, Ok(1));
        api.push(|s| &mut s.unread_notifications, Ok(0));
        client.refresh_unread_counts().await.unwrap();

        let mut acked = incoming.clone();
        acked.is_read = true;
        api.push(|s| &mut s.mark_message_read, Ok(acked));
        api.push(|s| &mut s.unread_messages, Ok(0));
        api.push(|s| &mut s.unread_notifications, Ok(0));

        client.mark_message_read(conv, incoming.id).await.unwrap();

        assert!(client.messages_view(conv).unwrap()[0].is_read);
        assert_eq!(client.unread_messages.view(), Some(0));
    }

    #[tokio::test]
    async fn mark_all_notifications_rolls_back_on_failure() {
        let api = ScriptedApi::default();
        let mut client = client(&api);

        api.push(
            |s| &mut s.list_notifications,
            Ok(vec![notification(false), notification(false)]),
        );
        client.refresh_notifications().await.unwrap();

        api.push(|s| &mut s.unread_messages, Ok(0));
        api.push(|s| &mut s.unread_notifications, Ok(2));
        client.refresh_unread_counts().await.unwrap();

        api.push(|s| &mut s.mark_all, Err(transport_down()));
        assert!(client.mark_all_notifications_read().await.is_err());

        let view = client.notifications.view().unwrap();
        assert!(view.iter().all(|n| !n.is_read));
        assert_eq!(client.unread_notifications.view(), Some(2));
    }

    #[tokio::test]
    async fn mark_all_notifications_settles_to_zero_unread() {
        let api = ScriptedApi::default();
        let mut client = client(&api);

        api.push(
            |s| &mut s.list_notifications,
            Ok(vec![notification(false), notification(false), notification(true)]),
        );
        client.refresh_notifications().await.unwrap();

        api.push(|s| &mut s.mark_all, Ok(2));
        api.push(
            |s| &mut s.list_notifications,
            Ok(vec![notification(true), notification(true), notification(true)]),
        );
        api.push(|s| &mut s.unread_messages, Ok(0));
        api.push(|s| &mut s.unread_notifications, Ok(0));

        let marked = client.mark_all_notifications_read().await.unwrap();
        assert_eq!(marked, 2);

        let view = client.notifications.view().unwrap();
        assert!(view.iter().all(|n| n.is_read));
        assert_eq!(client.unread_notifications.view(), Some(0));
    }

    #[tokio::test]
    async fn superseded_poll_payload_never_lands() {
        let api = ScriptedApi::default();
        let mut client = client(&api);

        // A poll goes out, then a user-triggered refresh starts before the
        // poll's response arrives.
        let stale_poll = client.notifications.begin_fetch();

        api.push(|s| &mut s.list_notifications, Ok(vec![notification(true)]));
        client.refresh_notifications().await.unwrap();

        // The poll's late payload is discarded; the refresh result stands.
        let applied = client
            .notifications
            .settle(stale_poll, Ok(vec![notification(false), notification(false)]));
        assert!(!applied);
        assert_eq!(client.notifications.view().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn poll_tick_fetches_notifications_and_counters() {
        let api = ScriptedApi::default();
        let mut client = client(&api);

        api.push(|s| &mut s.list_notifications, Ok(vec![notification(false)]));
        api.push(|s| &mut s.unread_messages, Ok(3));
        api.push(|s| &mut s.unread_notifications, Ok(1));

        client.poll_tick().await.unwrap();

        assert_eq!(client.notifications.view().unwrap().len(), 1);
        assert_eq!(client.unread_messages.view(), Some(3));
        assert_eq!(client.unread_notifications.view(), Some(1));
    }
}
