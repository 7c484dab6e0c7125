//! Test doubles: a scheduler that never waits and a gateway that replays scripted replies.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::{self, FutureExt, LocalBoxFuture};

use crate::errors::AppError;
use crate::gateway::Gateway;
use crate::models::{
    ConnectionInitiation, ConnectionStatus, ConversationEntry, MessageResponse, SentMessage,
    UserConversations,
};
use crate::poll::Scheduler;

/// Sleeps complete immediately; spawned tasks queue up until `run_until_idle`.
#[derive(Default)]
pub struct ManualScheduler {
    sleeps: RefCell<Vec<Duration>>,
    tasks: RefCell<VecDeque<LocalBoxFuture<'static, ()>>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }

    pub fn pending_tasks(&self) -> usize {
        self.tasks.borrow().len()
    }

    /// Runs queued tasks, including ones they spawn, until none are left.
    pub async fn run_until_idle(&self) {
        loop {
            let next = self.tasks.borrow_mut().pop_front();
            match next {
                Some(task) => task.await,
                None => break,
            }
        }
    }
}

impl Scheduler for ManualScheduler {
    fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
        self.sleeps.borrow_mut().push(duration);
        future::ready(()).boxed_local()
    }

    fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
        self.tasks.borrow_mut().push_back(task);
    }
}

/// Replays queued results per operation and records every call.
/// An empty queue falls back to a benign default.
#[derive(Default)]
pub struct ScriptedGateway {
    calls: RefCell<Vec<String>>,
    pub create_user: RefCell<VecDeque<Result<(), AppError>>>,
    pub initiate: RefCell<VecDeque<Result<ConnectionInitiation, AppError>>>,
    pub status: RefCell<VecDeque<Result<ConnectionStatus, AppError>>>,
    pub send: RefCell<VecDeque<Result<SentMessage, AppError>>>,
    pub responses: RefCell<VecDeque<Result<MessageResponse, AppError>>>,
    pub conversations: RefCell<VecDeque<Result<UserConversations, AppError>>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn calls_to(&self, op: &str) -> usize {
        self.calls.borrow().iter().filter(|c| c.starts_with(op)).count()
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

pub fn sent(message_id: &str) -> Result<SentMessage, AppError> {
    Ok(SentMessage { message_id: message_id.to_string() })
}

pub fn response(status: &str, text: Option<&str>) -> Result<MessageResponse, AppError> {
    Ok(MessageResponse { status: status.to_string(), response: text.map(str::to_string) })
}

pub fn conversation(entries: &[(&str, &str)]) -> Result<UserConversations, AppError> {
    Ok(UserConversations {
        conversations: entries
            .iter()
            .map(|(kind, message)| ConversationEntry {
                message: message.to_string(),
                kind: kind.to_string(),
                timestamp: Some("2024-05-01T09:30:00.250".to_string()),
            })
            .collect(),
    })
}

pub fn offline() -> AppError {
    AppError::Network("connection refused".to_string())
}

#[async_trait(?Send)]
impl Gateway for ScriptedGateway {
    async fn create_user(&self, user_id: &str, display_name: &str) -> Result<(), AppError> {
        self.record(format!("create_user:{user_id}:{display_name}"));
        self.create_user.borrow_mut().pop_front().unwrap_or(Ok(()))
    }

    async fn initiate_connection(&self, user_id: &str) -> Result<ConnectionInitiation, AppError> {
        self.record(format!("initiate_connection:{user_id}"));
        self.initiate.borrow_mut().pop_front().unwrap_or_else(|| Ok(ConnectionInitiation::default()))
    }

    async fn check_connection_status(&self, connection_id: &str) -> Result<ConnectionStatus, AppError> {
        self.record(format!("check_connection_status:{connection_id}"));
        self.status
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Ok(ConnectionStatus { status: "ACTIVE".to_string() }))
    }

    async fn send_message(&self, user_id: &str, content: &str) -> Result<SentMessage, AppError> {
        self.record(format!("send_message:{user_id}:{content}"));
        self.send.borrow_mut().pop_front().unwrap_or_else(|| sent("m-default"))
    }

    async fn get_message_response(&self, message_id: &str) -> Result<MessageResponse, AppError> {
        self.record(format!("get_message_response:{message_id}"));
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| response("processing", None))
    }

    async fn get_user_conversations(&self, user_id: &str) -> Result<UserConversations, AppError> {
        self.record(format!("get_user_conversations:{user_id}"));
        self.conversations
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Ok(UserConversations::default()))
    }
}
