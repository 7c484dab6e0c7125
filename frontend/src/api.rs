use async_trait::async_trait;
use gloo_net::http::{Request, Response};
use serde::de::DeserializeOwned;

use poke_chat::errors::AppError;
use poke_chat::models::{
    ConnectionInitiation, ConnectionStatus, CreateUserRequest, InitiateConnectionRequest,
    MessageResponse, SendMessageRequest, SentMessage, UserConversations,
};
use poke_chat::Gateway;

/// Talks to the Poke backend over JSON/HTTP.
pub struct HttpGateway {
    base: String,
}

impl HttpGateway {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }
}

fn network(e: gloo_net::Error) -> AppError {
    AppError::Network(e.to_string())
}

async fn ensure_ok(resp: Response) -> Result<Response, AppError> {
    if resp.ok() {
        return Ok(resp);
    }
    let status = resp.status();
    let message = resp.text().await.unwrap_or_else(|_| resp.status_text());
    log::warn!("Gateway answered {status} for {}", resp.url());
    Err(AppError::Server { status, message })
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, AppError> {
    ensure_ok(resp)
        .await?
        .json::<T>()
        .await
        .map_err(|e| AppError::Decode(e.to_string()))
}

#[async_trait(?Send)]
impl Gateway for HttpGateway {
    async fn create_user(&self, user_id: &str, display_name: &str) -> Result<(), AppError> {
        let body = CreateUserRequest {
            user_id: user_id.to_string(),
            name: display_name.to_string(),
        };
        let resp = Request::post(&self.url("/users"))
            .json(&body)
            .map_err(network)?
            .send()
            .await
            .map_err(network)?;
        ensure_ok(resp).await.map(|_| ())
    }

    async fn initiate_connection(&self, user_id: &str) -> Result<ConnectionInitiation, AppError> {
        let body = InitiateConnectionRequest { user_id: user_id.to_string() };
        let resp = Request::post(&self.url("/connections/initiate"))
            .json(&body)
            .map_err(network)?
            .send()
            .await
            .map_err(network)?;
        decode(resp).await
    }

    async fn check_connection_status(&self, connection_id: &str) -> Result<ConnectionStatus, AppError> {
        let resp = Request::get(&self.url(&format!("/connections/{connection_id}/status")))
            .send()
            .await
            .map_err(network)?;
        decode(resp).await
    }

    async fn send_message(&self, user_id: &str, content: &str) -> Result<SentMessage, AppError> {
        let body = SendMessageRequest {
            user_id: user_id.to_string(),
            message: content.to_string(),
        };
        let resp = Request::post(&self.url("/messages"))
            .json(&body)
            .map_err(network)?
            .send()
            .await
            .map_err(network)?;
        decode(resp).await
    }

    async fn get_message_response(&self, message_id: &str) -> Result<MessageResponse, AppError> {
        let resp = Request::get(&self.url(&format!("/messages/{message_id}/response")))
            .send()
            .await
            .map_err(network)?;
        decode(resp).await
    }

    async fn get_user_conversations(&self, user_id: &str) -> Result<UserConversations, AppError> {
        let resp = Request::get(&self.url(&format!("/users/{user_id}/conversations")))
            .send()
            .await
            .map_err(network)?;
        decode(resp).await
    }
}
