use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Per-guild settings row. Created lazily on the first configuration write;
/// reset by overwrite, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GuildConfig {
    pub guild_id: i64,
    pub support_channel: Option<i64>,
    pub ticket_parent: Option<i64>,
    pub staff_role: Option<i64>,
    pub panel_title: Option<String>,
    pub panel_description: Option<String>,
    pub contact_name: Option<String>,
    pub allow_user_close: bool,
}

impl GuildConfig {
    pub fn empty(guild_id: i64) -> Self {
        Self {
            guild_id,
            support_channel: None,
            ticket_parent: None,
            staff_role: None,
            panel_title: None,
            panel_description: None,
            contact_name: None,
            allow_user_close: false,
        }
    }
}

/// An admin-defined intake category. Display order follows `position`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub guild_id: i64,
    pub name: String,
    pub placeholder: Option<String>,
    pub position: i64,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
pub enum FieldStyle {
    SingleLine,
    MultiLine,
}

/// A configurable submission-form input belonging to a category.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FieldDef {
    pub guild_id: i64,
    pub category_name: String,
    pub name: String,
    pub label: String,
    pub required: bool,
    pub style: FieldStyle,
    pub min_len: Option<i64>,
    pub max_len: Option<i64>,
    pub position: i64,
}

/// Input for `ConfigStore::add_field`.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub label: String,
    pub required: bool,
    pub style: FieldStyle,
    pub min_len: Option<i64>,
    pub max_len: Option<i64>,
}

impl FieldSpec {
    pub fn required_single_line(name: &str, label: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            required: true,
            style: FieldStyle::SingleLine,
            min_len: None,
            max_len: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    Solved,
    Closed,
}

impl TicketStatus {
    /// Solved tickets still count as open everywhere except the
    /// confirm-close guard: they hold their slot, appear in open listings
    /// and keep logging messages.
    pub fn is_open(self) -> bool {
        !matches!(self, TicketStatus::Closed)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
pub enum TicketPriority {
    Low,
    Normal,
    High,
    Urgent,
}

impl fmt::Display for TicketPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TicketPriority::Low => "Low",
            TicketPriority::Normal => "Normal",
            TicketPriority::High => "High",
            TicketPriority::Urgent => "Urgent",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: i64,
    pub guild_id: i64,
    pub channel_id: i64,
    pub opener_id: i64,
    /// Snapshot of the category name at creation time; deleting the category
    /// later does not touch the ticket.
    pub category_name: String,
    /// Display slot, dense per guild (see `SlotAllocator`).
    pub number: i64,
    pub priority: TicketPriority,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub closed_by: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketMessage {
    pub id: i64,
    pub ticket_id: i64,
    pub platform_message_id: Option<i64>,
    pub author_id: i64,
    /// Raw text, except for a ticket's first message which holds the
    /// serialized field-name to value map of the submission.
    pub content: String,
    pub attachments: sqlx::types::JsonValue,
    pub created_at: DateTime<Utc>,
}

/// Input for `TicketRepository::create`.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub guild_id: i64,
    pub channel_id: i64,
    pub opener_id: i64,
    pub category_name: String,
    pub number: i64,
    pub priority: TicketPriority,
}

/// Input for `TicketRepository::append_message`.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub platform_message_id: Option<i64>,
    pub author_id: i64,
    pub content: String,
    pub attachments: sqlx::types::JsonValue,
}

impl NewMessage {
    pub fn text(author_id: i64, content: &str) -> Self {
        Self {
            platform_message_id: None,
            author_id,
            content: content.to_string(),
            attachments: sqlx::types::JsonValue::Array(Vec::new()),
        }
    }
}

/// Caller identity as resolved by the transport layer. Authorization never
/// reaches past these platform primitives.
#[derive(Debug, Clone)]
pub struct Member {
    pub user_id: i64,
    pub display_name: Option<String>,
    pub is_guild_owner: bool,
    pub can_manage_guild: bool,
    pub role_ids: Vec<i64>,
}

impl Member {
    pub fn user(user_id: i64) -> Self {
        Self {
            user_id,
            display_name: None,
            is_guild_owner: false,
            can_manage_guild: false,
            role_ids: Vec::new(),
        }
    }

    pub fn with_role(user_id: i64, role_id: i64) -> Self {
        Self {
            role_ids: vec![role_id],
            ..Self::user(user_id)
        }
    }
}

/// Full configuration snapshot for one guild, as returned by
/// `ConfigStore::full_config`.
#[derive(Debug, Clone)]
pub struct FullConfig {
    pub config: GuildConfig,
    pub categories: Vec<(Category, Vec<FieldDef>)>,
}
