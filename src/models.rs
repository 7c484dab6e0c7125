use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Current time truncated to millisecond precision, the resolution of the persisted form.
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Agent,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Agent => "agent",
        }
    }
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery state of a message the user submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sending,
    Sent,
    Failed,
}

/// One entry of the transcript.
///
/// `status` is only ever set on user messages; `None` means the message is delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub content: String,
    pub sender: Sender,
    #[serde(with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DeliveryStatus>,
}

impl Message {
    /// A user message that has not reached the backend yet.
    pub fn outgoing(content: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            content: content.into(),
            sender: Sender::User,
            timestamp: now_millis(),
            status: Some(DeliveryStatus::Sending),
        }
    }

    pub fn agent(content: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            content: content.into(),
            sender: Sender::Agent,
            timestamp: now_millis(),
            status: None,
        }
    }

    /// Maps the `index`-th entry of a fetched conversation onto a transcript message.
    pub fn from_entry(index: usize, entry: &ConversationEntry, fetched_at: DateTime<Utc>) -> Self {
        let sender = if entry.kind == "user" { Sender::User } else { Sender::Agent };
        let timestamp = entry
            .timestamp
            .as_deref()
            .and_then(parse_backend_timestamp)
            .unwrap_or(fetched_at);
        Self {
            id: format!("msg_{index}"),
            content: entry.message.clone(),
            sender,
            timestamp,
            status: None,
        }
    }

    /// Applies a delivery transition. Only `sending → sent` and `sending → failed`
    /// are accepted; anything else leaves the message untouched and returns `false`.
    pub fn transition(&mut self, next: DeliveryStatus) -> bool {
        let allowed = self.sender == Sender::User
            && self.status == Some(DeliveryStatus::Sending)
            && next != DeliveryStatus::Sending;
        if allowed {
            self.status = Some(next);
        }
        allowed
    }
}

fn new_message_id() -> String {
    format!("msg_{}", uuid::Uuid::new_v4().simple())
}

/// Accepts RFC 3339 and the naive ISO-8601 form the backend emits (read as UTC).
pub fn parse_backend_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc).trunc_subsecs(3));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc().trunc_subsecs(3))
}

mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Association between the running client and one backend user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UiFlags {
    pub is_typing: bool,
    pub is_loading: bool,
}

/// State of an in-progress account link, alive only during connection setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionAttempt {
    pub user_id: String,
    pub redirect_url: Option<String>,
    pub connection_id: Option<String>,
}

// ── Gateway wire types ──────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize)]
pub struct CreateUserRequest {
    pub user_id: String,
    pub name: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct InitiateConnectionRequest {
    pub user_id: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct ConnectionInitiation {
    #[serde(default)]
    pub redirect_url: Option<String>,
    #[serde(default)]
    pub connection_id: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub status: String,
}

impl ConnectionStatus {
    pub fn is_active(&self) -> bool {
        self.status == "ACTIVE" || self.status == "connected"
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct SendMessageRequest {
    pub user_id: String,
    pub message: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct SentMessage {
    pub message_id: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct MessageResponse {
    pub status: String,
    #[serde(default)]
    pub response: Option<String>,
}

/// Terminal state of a backend exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageResolution {
    Completed(String),
    Failed,
}

impl MessageResponse {
    /// `None` while the backend is still processing.
    pub fn resolution(&self) -> Option<MessageResolution> {
        match self.status.as_str() {
            "completed" => Some(MessageResolution::Completed(
                self.response.clone().unwrap_or_default(),
            )),
            "error" => Some(MessageResolution::Failed),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ConversationEntry {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct UserConversations {
    #[serde(default)]
    pub conversations: Vec<ConversationEntry>,
}
