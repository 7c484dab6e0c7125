//! The backend the client talks to.
//!
//! Every operation is a single request/response exchange; there is no streaming.
//! Implementations run on a single-threaded executor, so futures are not `Send`.

use async_trait::async_trait;

use crate::errors::AppError;
use crate::models::{ConnectionInitiation, ConnectionStatus, MessageResponse, SentMessage, UserConversations};

#[async_trait(?Send)]
pub trait Gateway {
    async fn create_user(&self, user_id: &str, display_name: &str) -> Result<(), AppError>;

    async fn initiate_connection(&self, user_id: &str) -> Result<ConnectionInitiation, AppError>;

    async fn check_connection_status(&self, connection_id: &str) -> Result<ConnectionStatus, AppError>;

    /// Queues `content` for the assistant and returns the id its reply is tracked under.
    async fn send_message(&self, user_id: &str, content: &str) -> Result<SentMessage, AppError>;

    async fn get_message_response(&self, message_id: &str) -> Result<MessageResponse, AppError>;

    async fn get_user_conversations(&self, user_id: &str) -> Result<UserConversations, AppError>;
}
