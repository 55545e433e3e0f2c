use async_trait::async_trait;

use crate::models::TicketPriority;
use crate::panel::PanelView;
use crate::Result;

/// Platform-side effects the engine needs. The chat transport (command
/// delivery, UI rendering) implements this; the core never talks to the
/// platform directly, which keeps the lifecycle logic testable offline.
///
/// Failures map to `TicketError::Platform`, except a missing channel which
/// maps to `TicketError::NotFound` so duplicate deletions degrade to no-ops.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Creates the private ticket channel with scoped access: opener and
    /// staff role may view/send, everyone else is denied.
    async fn create_ticket_channel(&self, guild_id: i64, request: &ChannelRequest) -> Result<i64>;

    async fn delete_channel(&self, channel_id: i64) -> Result<()>;

    async fn channel_exists(&self, channel_id: i64) -> Result<bool>;

    /// Updates the channel's human-readable status surface.
    async fn set_topic(&self, channel_id: i64, topic: &str) -> Result<()>;

    /// Drops the view/send grant a role holds on a ticket channel.
    async fn revoke_role_access(&self, channel_id: i64, role_id: i64) -> Result<()>;

    async fn send_message(&self, channel_id: i64, content: &str) -> Result<()>;

    /// Posts the category-selection panel, returning the message id.
    async fn post_panel(&self, channel_id: i64, panel: &PanelView) -> Result<i64>;

    /// Posts a ticket's initial detail message with its action controls.
    async fn post_ticket_controls(&self, channel_id: i64, intro: &TicketIntro) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct ChannelRequest {
    pub name: String,
    pub topic: String,
    pub parent: Option<i64>,
    pub opener_id: i64,
    pub staff_role: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct TicketIntro {
    pub title: String,
    pub intro: String,
    pub opener_id: i64,
    pub priority: TicketPriority,
    /// Serialized submission field map, rendered by the transport.
    pub fields: sqlx::types::JsonValue,
    pub controls: TicketControls,
}

/// Custom id of the persistent panel dropdown.
pub const PANEL_SELECT_ID: &str = "panel:select";

/// Ticket action controls. Identities derive from the persisted channel id
/// alone, so a restarted process can rebind them without any in-memory state
/// from creation time.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ControlAction {
    MarkSolved,
    Unsolve,
    ConfirmClose,
    SetPriority,
}

impl ControlAction {
    pub const ALL: [ControlAction; 4] = [
        ControlAction::MarkSolved,
        ControlAction::Unsolve,
        ControlAction::ConfirmClose,
        ControlAction::SetPriority,
    ];

    fn key(self) -> &'static str {
        match self {
            ControlAction::MarkSolved => "solve",
            ControlAction::Unsolve => "unsolve",
            ControlAction::ConfirmClose => "close",
            ControlAction::SetPriority => "priority",
        }
    }

    pub fn custom_id(self, channel_id: i64) -> String {
        format!("ticket:{}:{}", self.key(), channel_id)
    }

    /// Inverse of `custom_id`; `None` for ids this crate did not mint.
    pub fn parse(custom_id: &str) -> Option<(ControlAction, i64)> {
        let mut parts = custom_id.splitn(3, ':');
        if parts.next()? != "ticket" {
            return None;
        }
        let action = match parts.next()? {
            "solve" => ControlAction::MarkSolved,
            "unsolve" => ControlAction::Unsolve,
            "close" => ControlAction::ConfirmClose,
            "priority" => ControlAction::SetPriority,
            _ => return None,
        };
        let channel_id = parts.next()?.parse().ok()?;
        Some((action, channel_id))
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TicketControls {
    pub mark_solved: String,
    pub unsolve: String,
    pub confirm_close: String,
    pub set_priority: String,
}

impl TicketControls {
    pub fn for_channel(channel_id: i64) -> Self {
        Self {
            mark_solved: ControlAction::MarkSolved.custom_id(channel_id),
            unsolve: ControlAction::Unsolve.custom_id(channel_id),
            confirm_close: ControlAction::ConfirmClose.custom_id(channel_id),
            set_priority: ControlAction::SetPriority.custom_id(channel_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_ids_round_trip() {
        for action in ControlAction::ALL {
            let id = action.custom_id(987654321);
            assert_eq!(ControlAction::parse(&id), Some((action, 987654321)));
        }
    }

    #[test]
    fn foreign_custom_ids_are_rejected() {
        assert_eq!(ControlAction::parse("panel:select"), None);
        assert_eq!(ControlAction::parse("ticket:archive:12"), None);
        assert_eq!(ControlAction::parse("ticket:close:notanumber"), None);
        assert_eq!(ControlAction::parse("close:12"), None);
    }
}
