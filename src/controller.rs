//! The conversation controller owns the transcript and the UI flags, submits user
//! messages and reconciles them with the backend by polling.
//!
//! All state sits behind `RefCell`s on a single thread. Every mutation is written
//! through to the session repository and then announced to the listener. Poll loops
//! remember the session epoch they started in and drop their results once it moves on.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures_util::FutureExt;
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::errors::AppError;
use crate::gateway::Gateway;
use crate::models::{now_millis, DeliveryStatus, Message, MessageResolution, UiFlags};
use crate::poll::{run_poll, PollOutcome, Scheduler};
use crate::storage::SessionRepository;

/// Sent on the user's behalf when a session starts with an empty transcript.
pub const GREETING: &str = "Hello Poke! Tell me what you've discovered about me.";
pub const RESEARCH_PLACEHOLDER: &str = "Let me research you real quick... 🔍";
pub const ANALYSIS_FALLBACK: &str = "I'm still analyzing your data. This might take a moment as I research your Gmail and web presence thoroughly.";
pub const ERROR_NOTICE: &str = "Sorry, I encountered an error processing your message.";

/// Everything the presentation layer renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatSnapshot {
    pub user_id: Option<String>,
    pub messages: Vec<Message>,
    pub flags: UiFlags,
}

impl ChatSnapshot {
    fn mark(&mut self, local_id: &str, status: DeliveryStatus) {
        match self.messages.iter_mut().find(|m| m.id == local_id) {
            Some(msg) => {
                if !msg.transition(status) {
                    warn!("Refused {status:?} for message {local_id} in state {:?}", msg.status);
                }
            }
            None => warn!("Message {local_id} vanished before it could be marked {status:?}"),
        }
    }
}

type Listener = Box<dyn Fn(&ChatSnapshot)>;

struct Inner {
    gateway: Rc<dyn Gateway>,
    scheduler: Rc<dyn Scheduler>,
    repository: SessionRepository,
    config: ClientConfig,
    state: RefCell<ChatSnapshot>,
    epoch: Cell<u64>,
    listener: RefCell<Option<Listener>>,
}

#[derive(Clone)]
pub struct ConversationController {
    inner: Rc<Inner>,
}

impl ConversationController {
    pub fn new(
        gateway: Rc<dyn Gateway>,
        scheduler: Rc<dyn Scheduler>,
        repository: SessionRepository,
        config: ClientConfig,
    ) -> Self {
        Self {
            inner: Rc::new(Inner {
                gateway,
                scheduler,
                repository,
                config,
                state: RefCell::new(ChatSnapshot::default()),
                epoch: Cell::new(0),
                listener: RefCell::new(None),
            }),
        }
    }

    /// Registers the single observer notified after every state change.
    pub fn set_listener(&self, listener: impl Fn(&ChatSnapshot) + 'static) {
        *self.inner.listener.borrow_mut() = Some(Box::new(listener));
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        self.inner.state.borrow().clone()
    }

    pub fn user_id(&self) -> Option<String> {
        self.inner.state.borrow().user_id.clone()
    }

    /// Brings back the session stored by a previous page load, if any.
    ///
    /// An in-flight submit cannot survive a reload, so `is_loading` always restarts false.
    pub fn restore(&self) -> Option<String> {
        let persisted = self.inner.repository.load();
        let user_id = persisted.session.user_id?;
        let messages = persisted.messages.unwrap_or_default();
        let needs_greeting = messages.is_empty();

        self.next_epoch();
        info!("Restoring session {user_id} with {} message(s)", messages.len());
        self.apply(true, |s| {
            s.user_id = Some(user_id.clone());
            s.messages = messages;
            s.flags = UiFlags { is_typing: persisted.flags.is_typing, is_loading: false };
        });
        if needs_greeting {
            self.start_greeting(user_id.clone());
        }
        Some(user_id)
    }

    /// Starts a fresh session for a user that just finished connection setup.
    pub fn establish(&self, user_id: &str) {
        self.next_epoch();
        info!("Session established for {user_id}");
        if let Err(e) = self.inner.repository.clear_conversation() {
            error!("Failed to clear stored conversation: {e}");
        }
        if let Err(e) = self.inner.repository.save_user_id(user_id) {
            error!("Failed to store user id: {e}");
        }
        self.apply(true, |s| {
            *s = ChatSnapshot { user_id: Some(user_id.to_string()), ..ChatSnapshot::default() };
        });
        self.start_greeting(user_id.to_string());
    }

    /// Forgets the session, its transcript and flags, in memory and in storage.
    pub fn disconnect(&self) {
        self.next_epoch();
        info!("Disconnecting session {:?}", self.user_id());
        if let Err(e) = self.inner.repository.clear_all() {
            error!("Failed to clear stored session: {e}");
        }
        self.apply(false, |s| *s = ChatSnapshot::default());
    }

    /// Appends `content` as a `sending` message and submits it.
    ///
    /// Returns the backend id of the exchange; its reply is polled in the background.
    pub async fn send_message(&self, content: &str) -> Result<String, AppError> {
        let user_id = self.user_id().ok_or(AppError::NoSession)?;
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::empty_field("message"));
        }

        let epoch = self.inner.epoch.get();
        let outgoing = Message::outgoing(content);
        let local_id = outgoing.id.clone();
        self.apply(true, |s| {
            s.messages.push(outgoing);
            s.flags.is_loading = true;
        });

        match self.inner.gateway.send_message(&user_id, content).await {
            Ok(sent) => {
                debug!("Message {local_id} accepted as {}", sent.message_id);
                let live = self.apply_if(epoch, |s| {
                    s.mark(&local_id, DeliveryStatus::Sent);
                    s.flags.is_typing = true;
                    s.flags.is_loading = false;
                });
                if live {
                    let this = self.clone();
                    let message_id = sent.message_id.clone();
                    self.inner
                        .scheduler
                        .spawn(async move { this.watch_reply(message_id, epoch).await }.boxed_local());
                }
                Ok(sent.message_id)
            }
            Err(e) => {
                error!("Failed to send message {local_id}: {e}");
                self.apply_if(epoch, |s| {
                    s.mark(&local_id, DeliveryStatus::Failed);
                    s.flags.is_loading = false;
                });
                Err(e)
            }
        }
    }

    fn start_greeting(&self, user_id: String) {
        let epoch = self.inner.epoch.get();
        self.apply(true, |s| {
            s.messages = vec![Message::agent(RESEARCH_PLACEHOLDER)];
            s.flags.is_typing = true;
        });
        let this = self.clone();
        self.inner
            .scheduler
            .spawn(async move { this.greet_and_watch(user_id, epoch).await }.boxed_local());
    }

    async fn greet_and_watch(&self, user_id: String, epoch: u64) {
        if !self.is_current(epoch) {
            return;
        }
        if let Err(e) = self.inner.gateway.send_message(&user_id, GREETING).await {
            error!("Failed to send greeting for {user_id}: {e}");
            self.apply_if(epoch, |s| {
                s.messages.push(Message::agent(ERROR_NOTICE));
                s.flags.is_typing = false;
            });
            return;
        }

        let outcome = run_poll(
            "conversation",
            self.inner.config.conversation_poll(),
            &*self.inner.scheduler,
            || self.is_current(epoch),
            || {
                let gateway = &self.inner.gateway;
                let user_id = user_id.as_str();
                async move {
                    gateway
                        .get_user_conversations(user_id)
                        .await
                        .map(|fetched| (!fetched.conversations.is_empty()).then_some(fetched.conversations))
                }
            },
        )
        .await;

        match outcome {
            PollOutcome::Succeeded(entries) => {
                let fetched_at = now_millis();
                let messages: Vec<Message> = entries
                    .iter()
                    .enumerate()
                    .map(|(index, entry)| Message::from_entry(index, entry, fetched_at))
                    .collect();
                info!("Loaded {} message(s) of research for {user_id}", messages.len());
                self.apply_if(epoch, |s| {
                    s.messages = messages;
                    s.flags.is_typing = false;
                });
            }
            PollOutcome::TimedOut { attempts } => {
                warn!("No research for {user_id} after {attempts} attempt(s)");
                self.apply_if(epoch, |s| {
                    s.messages.push(Message::agent(ANALYSIS_FALLBACK));
                    s.flags.is_typing = false;
                });
            }
            PollOutcome::Cancelled => {}
        }
    }

    async fn watch_reply(&self, message_id: String, epoch: u64) {
        let outcome = run_poll(
            "message",
            self.inner.config.message_poll(),
            &*self.inner.scheduler,
            || self.is_current(epoch),
            || {
                let gateway = &self.inner.gateway;
                let message_id = message_id.as_str();
                async move {
                    gateway
                        .get_message_response(message_id)
                        .await
                        .map(|response| response.resolution())
                }
            },
        )
        .await;

        match outcome {
            PollOutcome::Succeeded(MessageResolution::Completed(text)) => {
                self.apply_if(epoch, |s| {
                    s.messages.push(Message::agent(text));
                    s.flags.is_typing = false;
                });
            }
            PollOutcome::Succeeded(MessageResolution::Failed) => {
                warn!("Backend failed to answer message {message_id}");
                self.apply_if(epoch, |s| {
                    s.messages.push(Message::agent(ERROR_NOTICE));
                    s.flags.is_typing = false;
                });
            }
            PollOutcome::TimedOut { .. } => {
                self.apply_if(epoch, |s| s.flags.is_typing = false);
            }
            PollOutcome::Cancelled => {}
        }
    }

    fn next_epoch(&self) {
        self.inner.epoch.set(self.inner.epoch.get() + 1);
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.inner.epoch.get() == epoch
    }

    /// Like `apply`, but only while the session that started the work is still active.
    fn apply_if(&self, epoch: u64, f: impl FnOnce(&mut ChatSnapshot)) -> bool {
        if !self.is_current(epoch) {
            debug!("Dropping update from a stale session");
            return false;
        }
        self.apply(true, f);
        true
    }

    fn apply(&self, persist: bool, f: impl FnOnce(&mut ChatSnapshot)) {
        let snapshot = {
            let mut state = self.inner.state.borrow_mut();
            f(&mut state);
            state.clone()
        };
        if persist {
            self.persist(&snapshot);
        }
        if let Some(listener) = self.inner.listener.borrow().as_ref() {
            listener(&snapshot);
        }
    }

    fn persist(&self, snapshot: &ChatSnapshot) {
        let repository = &self.inner.repository;
        if let Err(e) = repository.save_transcript(&snapshot.messages) {
            error!("Failed to store transcript: {e}");
        }
        if let Err(e) = repository.save_flags(snapshot.flags) {
            error!("Failed to store UI flags: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::models::Sender;
    use crate::storage::{KeyValueStore, MemoryStore, IS_LOADING_KEY, IS_TYPING_KEY, MESSAGES_KEY, USER_ID_KEY};
    use crate::testing::{conversation, offline, response, sent, ManualScheduler, ScriptedGateway};

    struct Harness {
        gateway: Rc<ScriptedGateway>,
        scheduler: Rc<ManualScheduler>,
        store: Rc<MemoryStore>,
        controller: ConversationController,
        history: Rc<RefCell<Vec<ChatSnapshot>>>,
    }

    fn harness() -> Harness {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("poke_chat=debug"))
            .with_test_writer()
            .try_init();

        let gateway = Rc::new(ScriptedGateway::new());
        let scheduler = Rc::new(ManualScheduler::new());
        let store = Rc::new(MemoryStore::new());
        let config = ClientConfig {
            conversation_poll_attempts: 4,
            message_poll_attempts: 5,
            ..ClientConfig::default()
        };
        let controller = ConversationController::new(
            gateway.clone(),
            scheduler.clone(),
            SessionRepository::new(store.clone()),
            config,
        );
        let history = Rc::new(RefCell::new(Vec::new()));
        let sink = history.clone();
        controller.set_listener(move |snapshot| sink.borrow_mut().push(snapshot.clone()));
        Harness { gateway, scheduler, store, controller, history }
    }

    /// A harness whose session was restored with one earlier agent message.
    fn harness_with_session() -> Harness {
        let h = harness();
        let earlier = vec![Message::agent("Welcome back")];
        h.store.set(USER_ID_KEY, "user_1").unwrap();
        h.store.set(MESSAGES_KEY, &serde_json::to_string(&earlier).unwrap()).unwrap();
        assert_eq!(h.controller.restore().as_deref(), Some("user_1"));
        assert_eq!(h.scheduler.pending_tasks(), 0);
        h
    }

    fn last(h: &Harness) -> Message {
        h.controller.snapshot().messages.last().cloned().expect("transcript is empty")
    }

    #[tokio::test]
    async fn reply_is_appended_once_it_completes() {
        let h = harness_with_session();
        h.gateway.send.borrow_mut().push_back(sent("m1"));
        h.gateway
            .responses
            .borrow_mut()
            .push_back(response("completed", Some("Found 3 relevant emails.")));

        let id = h.controller.send_message("What did you find?").await.unwrap();
        assert_eq!(id, "m1");

        // The optimistic entry was published before the gateway answered.
        let first = h.history.borrow()[1].clone();
        let pending = first.messages.last().unwrap();
        assert_eq!(pending.content, "What did you find?");
        assert_eq!(pending.status, Some(DeliveryStatus::Sending));
        assert!(first.flags.is_loading);

        let snap = h.controller.snapshot();
        assert_eq!(snap.messages.len(), 2);
        assert_eq!(last(&h).status, Some(DeliveryStatus::Sent));
        assert!(snap.flags.is_typing);
        assert!(!snap.flags.is_loading);

        h.scheduler.run_until_idle().await;
        let snap = h.controller.snapshot();
        assert_eq!(snap.messages.len(), 3);
        let reply = last(&h);
        assert_eq!(reply.sender, Sender::Agent);
        assert_eq!(reply.content, "Found 3 relevant emails.");
        assert_eq!(reply.status, None);
        assert!(!snap.flags.is_typing);
        assert_eq!(h.gateway.calls_to("get_message_response:m1"), 1);
        assert!(h.scheduler.sleeps().is_empty());
    }

    #[tokio::test]
    async fn failed_send_is_terminal_and_keeps_typing_untouched() {
        let h = harness_with_session();
        h.gateway.send.borrow_mut().push_back(Err(offline()));

        let err = h.controller.send_message("hello").await.unwrap_err();
        assert!(err.is_gateway());

        let snap = h.controller.snapshot();
        assert_eq!(last(&h).status, Some(DeliveryStatus::Failed));
        assert!(!snap.flags.is_typing);
        assert!(!snap.flags.is_loading);
        assert_eq!(h.scheduler.pending_tasks(), 0);

        // A later exchange leaves the failed entry alone.
        h.gateway.send.borrow_mut().push_back(sent("m2"));
        h.gateway.responses.borrow_mut().push_back(response("completed", Some("ok")));
        h.controller.send_message("hello again").await.unwrap();
        h.scheduler.run_until_idle().await;
        let statuses: Vec<_> = h.controller.snapshot().messages.iter().map(|m| m.status).collect();
        assert_eq!(
            statuses,
            vec![None, Some(DeliveryStatus::Failed), Some(DeliveryStatus::Sent), None]
        );
    }

    #[tokio::test]
    async fn rejects_blank_input_and_missing_session() {
        let h = harness();
        assert!(matches!(h.controller.send_message("hi").await, Err(AppError::NoSession)));

        let h = harness_with_session();
        let err = h.controller.send_message("  \n ").await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(h.controller.snapshot().messages.len(), 1);
        assert_eq!(h.gateway.calls_to("send_message"), 0);
    }

    #[tokio::test]
    async fn content_is_trimmed_before_sending() {
        let h = harness_with_session();
        h.controller.send_message("  spaced out  ").await.unwrap();
        assert_eq!(last(&h).content, "spaced out");
        assert_eq!(h.gateway.calls_to("send_message:user_1:spaced out"), 1);
    }

    #[tokio::test]
    async fn backend_error_becomes_an_error_notice() {
        let h = harness_with_session();
        h.gateway.responses.borrow_mut().push_back(response("processing", None));
        h.gateway.responses.borrow_mut().push_back(response("error", None));

        h.controller.send_message("hello").await.unwrap();
        h.scheduler.run_until_idle().await;

        assert_eq!(last(&h).content, ERROR_NOTICE);
        assert!(!h.controller.snapshot().flags.is_typing);
        assert_eq!(h.gateway.calls_to("get_message_response"), 2);
    }

    #[tokio::test]
    async fn reply_poll_survives_transient_failures() {
        let h = harness_with_session();
        h.gateway.responses.borrow_mut().push_back(Err(offline()));
        h.gateway.responses.borrow_mut().push_back(Err(offline()));
        h.gateway.responses.borrow_mut().push_back(response("completed", Some("done")));

        h.controller.send_message("hello").await.unwrap();
        h.scheduler.run_until_idle().await;

        let replies: Vec<_> =
            h.controller.snapshot().messages.into_iter().filter(|m| m.content == "done").collect();
        assert_eq!(replies.len(), 1);
        assert_eq!(h.gateway.calls_to("get_message_response"), 3);
        assert_eq!(h.scheduler.sleeps(), vec![Duration::from_secs(5); 2]);
    }

    #[tokio::test]
    async fn reply_poll_gives_up_quietly() {
        let h = harness_with_session();
        h.controller.send_message("hello").await.unwrap();
        h.scheduler.run_until_idle().await;

        let snap = h.controller.snapshot();
        assert_eq!(snap.messages.len(), 2);
        assert!(!snap.flags.is_typing);
        assert_eq!(h.gateway.calls_to("get_message_response"), 5);
    }

    #[tokio::test]
    async fn greeting_is_replaced_by_the_backend_conversation() {
        let h = harness();
        h.gateway.conversations.borrow_mut().push_back(conversation(&[]));
        h.gateway.conversations.borrow_mut().push_back(Err(offline()));
        h.gateway.conversations.borrow_mut().push_back(conversation(&[
            ("user", GREETING),
            ("agent", "You get a lot of newsletters."),
        ]));

        h.controller.establish("user_9");
        let snap = h.controller.snapshot();
        assert_eq!(snap.user_id.as_deref(), Some("user_9"));
        assert_eq!(snap.messages.len(), 1);
        assert_eq!(snap.messages[0].content, RESEARCH_PLACEHOLDER);
        assert!(snap.flags.is_typing);
        assert_eq!(h.store.get(USER_ID_KEY).unwrap().as_deref(), Some("user_9"));

        h.scheduler.run_until_idle().await;
        let snap = h.controller.snapshot();
        let contents: Vec<_> = snap.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec![GREETING, "You get a lot of newsletters."]);
        assert_eq!(snap.messages[0].id, "msg_0");
        assert_eq!(snap.messages[0].sender, Sender::User);
        assert!(snap.messages.iter().all(|m| m.status.is_none()));
        assert!(!snap.flags.is_typing);
        assert_eq!(h.gateway.calls_to(&format!("send_message:user_9:{GREETING}")), 1);
        assert_eq!(h.gateway.calls_to("get_user_conversations:user_9"), 3);
    }

    #[tokio::test]
    async fn greeting_falls_back_when_research_never_arrives() {
        let h = harness();
        h.controller.establish("user_9");
        h.scheduler.run_until_idle().await;

        let snap = h.controller.snapshot();
        let fallbacks = snap.messages.iter().filter(|m| m.content == ANALYSIS_FALLBACK).count();
        assert_eq!(fallbacks, 1);
        assert_eq!(last(&h).sender, Sender::Agent);
        assert!(!snap.flags.is_typing);
        assert_eq!(h.gateway.calls_to("get_user_conversations"), 4);
    }

    #[tokio::test]
    async fn failed_greeting_stops_typing() {
        let h = harness();
        h.gateway.send.borrow_mut().push_back(Err(offline()));
        h.controller.establish("user_9");
        h.scheduler.run_until_idle().await;

        assert_eq!(last(&h).content, ERROR_NOTICE);
        assert!(!h.controller.snapshot().flags.is_typing);
        assert_eq!(h.gateway.calls_to("get_user_conversations"), 0);
    }

    #[tokio::test]
    async fn disconnect_retires_in_flight_polls() {
        let h = harness_with_session();
        h.gateway.responses.borrow_mut().push_back(response("completed", Some("too late")));
        h.controller.send_message("hello").await.unwrap();
        assert_eq!(h.scheduler.pending_tasks(), 1);

        h.controller.disconnect();
        h.scheduler.run_until_idle().await;

        assert_eq!(h.controller.snapshot(), ChatSnapshot::default());
        assert_eq!(h.gateway.calls_to("get_message_response"), 0);
        for key in [USER_ID_KEY, MESSAGES_KEY, IS_TYPING_KEY, IS_LOADING_KEY] {
            assert_eq!(h.store.get(key).unwrap(), None, "{key} survived disconnect");
        }
    }

    #[tokio::test]
    async fn reconnect_starts_from_an_empty_transcript() {
        let h = harness_with_session();
        h.controller.send_message("old question").await.unwrap();
        h.controller.disconnect();

        h.controller.establish("user_2");
        let snap = h.controller.snapshot();
        assert_eq!(snap.messages.len(), 1);
        assert_eq!(snap.messages[0].content, RESEARCH_PLACEHOLDER);

        h.scheduler.run_until_idle().await;
        assert!(h.controller.snapshot().messages.iter().all(|m| m.content != "old question"));
        assert_eq!(h.gateway.calls_to("get_message_response"), 0);
    }

    #[tokio::test]
    async fn restore_brings_back_the_stored_conversation() {
        let h = harness();
        let mut question = Message::outgoing("Any receipts?");
        question.transition(DeliveryStatus::Sent);
        let transcript = vec![Message::agent("Hi!"), question];
        h.store.set(USER_ID_KEY, "user_5").unwrap();
        h.store.set(MESSAGES_KEY, &serde_json::to_string(&transcript).unwrap()).unwrap();
        h.store.set(IS_TYPING_KEY, "true").unwrap();
        h.store.set(IS_LOADING_KEY, "true").unwrap();

        assert_eq!(h.controller.restore().as_deref(), Some("user_5"));
        let snap = h.controller.snapshot();
        assert_eq!(snap.messages, transcript);
        assert!(snap.flags.is_typing);
        assert!(!snap.flags.is_loading);
        assert_eq!(h.scheduler.pending_tasks(), 0);
    }

    #[tokio::test]
    async fn restore_greets_when_the_transcript_is_empty() {
        let h = harness();
        h.store.set(USER_ID_KEY, "user_5").unwrap();
        h.store.set(MESSAGES_KEY, "[]").unwrap();

        h.controller.restore();
        assert_eq!(h.controller.snapshot().messages[0].content, RESEARCH_PLACEHOLDER);
        assert_eq!(h.scheduler.pending_tasks(), 1);
    }

    #[tokio::test]
    async fn nothing_to_restore_without_a_user() {
        let h = harness();
        assert_eq!(h.controller.restore(), None);
        assert_eq!(h.controller.snapshot(), ChatSnapshot::default());
        assert!(h.history.borrow().is_empty());
    }

    #[tokio::test]
    async fn storage_mirrors_the_transcript() {
        let h = harness_with_session();
        h.gateway.responses.borrow_mut().push_back(response("completed", Some("Found it.")));
        h.controller.send_message("Find my flight").await.unwrap();
        h.scheduler.run_until_idle().await;

        let raw = h.store.get(MESSAGES_KEY).unwrap().unwrap();
        let stored: Vec<Message> = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored, h.controller.snapshot().messages);
        assert_eq!(h.store.get(IS_TYPING_KEY).unwrap().as_deref(), Some("false"));
    }
}
