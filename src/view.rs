//! Presentation model: what each chat bubble shows, independent of any UI toolkit.

use chrono::{DateTime, TimeZone};

use crate::models::{DeliveryStatus, Message, Sender, UiFlags};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Start,
    End,
}

/// Delivery marker drawn under a user bubble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusIcon {
    Clock,
    Check,
    DoubleCheck,
    FailedDot,
}

impl StatusIcon {
    pub fn glyph(&self) -> &'static str {
        match self {
            StatusIcon::Clock => "🕓",
            StatusIcon::Check => "✓",
            StatusIcon::DoubleCheck => "✓✓",
            StatusIcon::FailedDot => "●",
        }
    }

    pub fn css_class(&self) -> &'static str {
        match self {
            StatusIcon::Clock => "status sending",
            StatusIcon::Check => "status sent",
            StatusIcon::DoubleCheck => "status delivered",
            StatusIcon::FailedDot => "status failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BubbleView {
    pub id: String,
    pub content: String,
    pub from_user: bool,
    pub alignment: Alignment,
    pub time_label: String,
    pub status_icon: Option<StatusIcon>,
}

pub fn status_icon(message: &Message) -> Option<StatusIcon> {
    if message.sender != Sender::User {
        return None;
    }
    Some(match message.status {
        Some(DeliveryStatus::Sending) => StatusIcon::Clock,
        Some(DeliveryStatus::Sent) => StatusIcon::Check,
        Some(DeliveryStatus::Failed) => StatusIcon::FailedDot,
        None => StatusIcon::DoubleCheck,
    })
}

/// "9:05 AM" style label in `tz`.
pub fn time_label<Tz: TimeZone>(timestamp: &DateTime<chrono::Utc>, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    timestamp.with_timezone(tz).format("%-I:%M %p").to_string()
}

/// Bubbles in transcript order. Append order is kept as-is, never sorted by time.
pub fn bubbles<Tz: TimeZone>(messages: &[Message], tz: &Tz) -> Vec<BubbleView>
where
    Tz::Offset: std::fmt::Display,
{
    messages
        .iter()
        .map(|message| {
            let from_user = message.sender == Sender::User;
            BubbleView {
                id: message.id.clone(),
                content: message.content.clone(),
                from_user,
                alignment: if from_user { Alignment::End } else { Alignment::Start },
                time_label: time_label(&message.timestamp, tz),
                status_icon: status_icon(message),
            }
        })
        .collect()
}

pub fn show_typing(flags: &UiFlags) -> bool {
    flags.is_typing
}

pub fn input_disabled(flags: &UiFlags) -> bool {
    flags.is_loading
}
