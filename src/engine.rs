use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::alloc::SlotAllocator;
use crate::config::{ConfigStore, EnvDefaults};
use crate::gateway::{ChannelRequest, ChatGateway, TicketControls, TicketIntro};
use crate::models::{
    Category, GuildConfig, Member, NewMessage, NewTicket, Ticket, TicketMessage, TicketPriority,
    TicketStatus,
};
use crate::repository::TicketRepository;
use crate::{Result, TicketError};

/// How long a closure announcement stays readable before the channel goes
/// away.
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_secs(10);

const INTRO_TEXT: &str = "Thanks for reaching out! A staff member will respond as soon as \
    possible.\nUse 'Set Priority' to change urgency, or 'Mark as Solved' if resolved. \
    Staff will confirm closing.";

#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions {
    /// Close in storage any ticket whose channel no longer exists.
    pub repair_drift: bool,
    /// Force-close every currently open ticket.
    pub close_all: bool,
    /// With `close_all`, also delete the ticket channels.
    pub delete_channels: bool,
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct ReconcileReport {
    pub drift_closed: usize,
    pub force_closed: usize,
    pub channels_deleted: usize,
}

/// The ticket lifecycle state machine: `Open -> Solved -> Closed`, with
/// `Solved -> Open` reachable through an explicit unsolve. Closed is
/// terminal; entering it schedules channel deletion after a grace period.
pub struct TicketEngine {
    repo: TicketRepository,
    config: ConfigStore,
    gateway: Arc<dyn ChatGateway>,
    allocator: SlotAllocator,
    close_grace: Duration,
    close_timers: Mutex<HashMap<i64, JoinHandle<()>>>,
}

impl TicketEngine {
    pub fn new(pool: SqlitePool, gateway: Arc<dyn ChatGateway>, defaults: EnvDefaults) -> Self {
        Self {
            repo: TicketRepository::new(pool.clone()),
            config: ConfigStore::new(pool, defaults),
            gateway,
            allocator: SlotAllocator::new(),
            close_grace: DEFAULT_CLOSE_GRACE,
            close_timers: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_close_grace(mut self, grace: Duration) -> Self {
        self.close_grace = grace;
        self
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn repository(&self) -> &TicketRepository {
        &self.repo
    }

    pub fn gateway(&self) -> &Arc<dyn ChatGateway> {
        &self.gateway
    }

    /// The shared staff predicate: guild owner, manage-guild permission, or
    /// the configured staff role.
    pub fn is_staff(config: &GuildConfig, member: &Member) -> bool {
        if member.is_guild_owner || member.can_manage_guild {
            return true;
        }
        match config.staff_role {
            Some(role) => member.role_ids.contains(&role),
            None => false,
        }
    }

    /// Gate for admin-plane and staff-only operations. Denied attempts are
    /// logged as audit events.
    pub async fn authorize_staff(&self, guild_id: i64, member: &Member) -> Result<()> {
        let config = self.config.guild_config(guild_id).await?;
        if Self::is_staff(&config, member) {
            Ok(())
        } else {
            tracing::warn!(
                guild_id,
                user_id = member.user_id,
                "denied staff-gated operation"
            );
            Err(TicketError::Forbidden)
        }
    }

    /// Create transition: allocates a slot and a private channel, persists
    /// the ticket with its submission as the first message, and posts the
    /// action controls. The guild's allocation guard is held across the
    /// whole count-then-insert sequence.
    pub async fn open_ticket(
        &self,
        guild_id: i64,
        opener: &Member,
        category: &Category,
        content: serde_json::Value,
    ) -> Result<Ticket> {
        self.config.category(guild_id, &category.name).await?;
        let config = self.config.guild_config(guild_id).await?;
        let priority = TicketPriority::Low;

        let guard = self.allocator.guard(guild_id).await;
        let taken = self.repo.open_slots(guild_id).await?;
        let number = SlotAllocator::next_slot(&taken);

        let slug = slugify(opener.display_name.as_deref().unwrap_or_default());
        let request = ChannelRequest {
            name: format!("ticket-{number:04}-{slug}"),
            topic: topic(number, priority),
            parent: config.ticket_parent,
            opener_id: opener.user_id,
            staff_role: config.staff_role,
        };
        let channel_id = self.gateway.create_ticket_channel(guild_id, &request).await?;

        let created = self
            .repo
            .create(
                &NewTicket {
                    guild_id,
                    channel_id,
                    opener_id: opener.user_id,
                    category_name: category.name.clone(),
                    number,
                    priority,
                },
                &NewMessage {
                    platform_message_id: None,
                    author_id: opener.user_id,
                    content: content.to_string(),
                    attachments: serde_json::Value::Array(Vec::new()),
                },
            )
            .await;
        let ticket = match created {
            Ok(ticket) => ticket,
            Err(e) => {
                // No stored ticket points at the channel, so reconcile would
                // never find it. Drop it before surfacing the failure.
                match self.gateway.delete_channel(channel_id).await {
                    Ok(()) | Err(TicketError::NotFound(_)) => {}
                    Err(del) => {
                        tracing::warn!(channel_id, "failed to delete unpersisted ticket channel: {}", del);
                    }
                }
                return Err(e);
            }
        };
        drop(guard);

        let intro = TicketIntro {
            title: format!("Ticket #{number:04} - {}", category.name),
            intro: INTRO_TEXT.to_string(),
            opener_id: opener.user_id,
            priority,
            fields: content,
            controls: TicketControls::for_channel(channel_id),
        };
        if let Err(e) = self.gateway.post_ticket_controls(channel_id, &intro).await {
            tracing::warn!("failed to post ticket controls: {}", e);
        }
        tracing::info!(guild_id, channel_id, number, "ticket opened");
        Ok(ticket)
    }

    /// Opener or staff, while the ticket is not closed.
    pub async fn set_priority(
        &self,
        guild_id: i64,
        channel_id: i64,
        caller: &Member,
        priority: TicketPriority,
    ) -> Result<Ticket> {
        let ticket = self.repo.get(guild_id, channel_id).await?;
        let config = self.config.guild_config(guild_id).await?;
        if caller.user_id != ticket.opener_id && !Self::is_staff(&config, caller) {
            tracing::warn!(guild_id, user_id = caller.user_id, "denied priority change");
            return Err(TicketError::Forbidden);
        }
        if !ticket.status.is_open() {
            return Err(TicketError::InvalidState("ticket is closed".into()));
        }
        self.repo.set_priority(ticket.id, priority).await?;
        if let Err(e) = self
            .gateway
            .set_topic(channel_id, &topic(ticket.number, priority))
            .await
        {
            tracing::warn!("failed to update channel topic: {}", e);
        }
        self.announce(channel_id, &format!("Priority set to {priority}."))
            .await;
        self.repo.get_by_id(ticket.id).await
    }

    /// Opener only, while open.
    pub async fn mark_solved(
        &self,
        guild_id: i64,
        channel_id: i64,
        caller: &Member,
    ) -> Result<Ticket> {
        let ticket = self.repo.get(guild_id, channel_id).await?;
        if caller.user_id != ticket.opener_id {
            tracing::warn!(guild_id, user_id = caller.user_id, "denied solve attempt");
            return Err(TicketError::Forbidden);
        }
        match ticket.status {
            TicketStatus::Open => {}
            TicketStatus::Solved => {
                return Err(TicketError::InvalidState("already marked solved".into()))
            }
            TicketStatus::Closed => {
                return Err(TicketError::InvalidState("ticket already closed".into()))
            }
        }
        self.repo.mark_solved(ticket.id).await?;
        self.announce(
            channel_id,
            "Marked as solved. A staff member can now confirm closing.",
        )
        .await;
        self.repo.get_by_id(ticket.id).await
    }

    /// The `Solved -> Open` reversal, available to the opener or staff.
    pub async fn unmark_solved(
        &self,
        guild_id: i64,
        channel_id: i64,
        caller: &Member,
    ) -> Result<Ticket> {
        let ticket = self.repo.get(guild_id, channel_id).await?;
        let config = self.config.guild_config(guild_id).await?;
        if caller.user_id != ticket.opener_id && !Self::is_staff(&config, caller) {
            tracing::warn!(guild_id, user_id = caller.user_id, "denied unsolve attempt");
            return Err(TicketError::Forbidden);
        }
        if ticket.status != TicketStatus::Solved {
            return Err(TicketError::InvalidState("ticket is not marked solved".into()));
        }
        self.repo.unmark_solved(ticket.id).await?;
        self.announce(channel_id, "Reopened; no longer marked as solved.")
            .await;
        self.repo.get_by_id(ticket.id).await
    }

    /// Staff-only (or the opener, when the guild allows user close), while
    /// open or solved. Persists the closure, announces it and schedules
    /// channel deletion after the grace period.
    pub async fn confirm_close(
        &self,
        guild_id: i64,
        channel_id: i64,
        caller: &Member,
    ) -> Result<Ticket> {
        let ticket = self.repo.get(guild_id, channel_id).await?;
        let config = self.config.guild_config(guild_id).await?;
        let opener_may_close = config.allow_user_close && caller.user_id == ticket.opener_id;
        if !Self::is_staff(&config, caller) && !opener_may_close {
            tracing::warn!(guild_id, user_id = caller.user_id, "denied close attempt");
            return Err(TicketError::Forbidden);
        }
        if ticket.status == TicketStatus::Closed {
            return Err(TicketError::InvalidState("ticket already closed".into()));
        }
        self.repo
            .mark_closed(ticket.id, Utc::now(), Some(caller.user_id))
            .await?;
        self.announce(channel_id, "This ticket is now closed. Thank you!")
            .await;
        self.schedule_deletion(channel_id).await;
        tracing::info!(guild_id, channel_id, number = ticket.number, "ticket closed");
        self.repo.get_by_id(ticket.id).await
    }

    /// Administrative repair: aligns stored tickets with actual channel
    /// existence and/or force-closes everything. Safe to run repeatedly;
    /// already-closed tickets and already-deleted channels are no-ops.
    pub async fn reconcile(
        &self,
        guild_id: i64,
        caller: &Member,
        options: ReconcileOptions,
    ) -> Result<ReconcileReport> {
        self.authorize_staff(guild_id, caller).await?;
        let mut report = ReconcileReport::default();

        if options.repair_drift {
            for ticket in self.repo.list_open(guild_id).await? {
                let exists = match self.gateway.channel_exists(ticket.channel_id).await {
                    Ok(exists) => exists,
                    Err(e) => {
                        tracing::warn!(
                            channel_id = ticket.channel_id,
                            "drift check failed: {}",
                            e
                        );
                        continue;
                    }
                };
                if exists {
                    continue;
                }
                self.cancel_deletion(ticket.channel_id).await;
                match self.repo.mark_closed(ticket.id, Utc::now(), None).await {
                    Ok(()) => {
                        tracing::info!(
                            guild_id,
                            channel_id = ticket.channel_id,
                            "closed drifted ticket"
                        );
                        report.drift_closed += 1;
                    }
                    Err(TicketError::InvalidState(_)) => {}
                    Err(e) => return Err(e),
                }
            }
        }

        if options.close_all {
            for ticket in self.repo.list_open(guild_id).await? {
                match self
                    .repo
                    .mark_closed(ticket.id, Utc::now(), Some(caller.user_id))
                    .await
                {
                    Ok(()) => report.force_closed += 1,
                    Err(TicketError::InvalidState(_)) => {}
                    Err(e) => return Err(e),
                }
                if options.delete_channels {
                    self.cancel_deletion(ticket.channel_id).await;
                    match self.gateway.delete_channel(ticket.channel_id).await {
                        Ok(()) => report.channels_deleted += 1,
                        Err(TicketError::NotFound(_)) => {}
                        Err(e) => {
                            tracing::warn!(
                                channel_id = ticket.channel_id,
                                "failed to delete channel: {}",
                                e
                            );
                        }
                    }
                }
            }
        }

        Ok(report)
    }

    /// Clears the staff role and revokes its view/send grant on every open
    /// ticket channel. Returns the removed role, if one was configured.
    pub async fn remove_staff_role(&self, guild_id: i64, caller: &Member) -> Result<Option<i64>> {
        self.authorize_staff(guild_id, caller).await?;
        let removed = self.config.remove_staff_role(guild_id).await?;
        if let Some(role_id) = removed {
            for ticket in self.repo.list_open(guild_id).await? {
                match self
                    .gateway
                    .revoke_role_access(ticket.channel_id, role_id)
                    .await
                {
                    Ok(()) | Err(TicketError::NotFound(_)) => {}
                    Err(e) => tracing::warn!(
                        channel_id = ticket.channel_id,
                        "failed to revoke staff access: {}",
                        e
                    ),
                }
            }
            tracing::info!(guild_id, role_id, "staff role removed");
        }
        Ok(removed)
    }

    /// Appends inbound channel traffic to the owning ticket's log. Non-ticket
    /// channels and closed tickets are ignored.
    pub async fn record_channel_message(
        &self,
        guild_id: i64,
        channel_id: i64,
        message: &NewMessage,
    ) -> Result<Option<TicketMessage>> {
        let ticket = match self.repo.get(guild_id, channel_id).await {
            Ok(ticket) => ticket,
            Err(TicketError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        if !ticket.status.is_open() {
            return Ok(None);
        }
        let stored = self.repo.append_message(ticket.id, message).await?;
        Ok(Some(stored))
    }

    async fn announce(&self, channel_id: i64, content: &str) {
        if let Err(e) = self.gateway.send_message(channel_id, content).await {
            tracing::warn!(channel_id, "failed to send announcement: {}", e);
        }
    }

    /// Schedules channel deletion after the grace period. A previous timer
    /// for the same channel is superseded; deletion of an already-deleted
    /// channel is swallowed.
    async fn schedule_deletion(&self, channel_id: i64) {
        let gateway = Arc::clone(&self.gateway);
        let grace = self.close_grace;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            match gateway.delete_channel(channel_id).await {
                Ok(()) | Err(TicketError::NotFound(_)) => {}
                Err(e) => tracing::warn!(channel_id, "delayed channel deletion failed: {}", e),
            }
        });
        if let Some(previous) = self.close_timers.lock().await.insert(channel_id, handle) {
            previous.abort();
        }
    }

    async fn cancel_deletion(&self, channel_id: i64) {
        if let Some(handle) = self.close_timers.lock().await.remove(&channel_id) {
            handle.abort();
        }
    }
}

/// Channel topic shown next to the ticket, updated on priority changes.
fn topic(number: i64, priority: TicketPriority) -> String {
    format!("Ticket #{number:04} | Priority: {priority}")
}

/// Channel-name slug derived from the opener's display name.
fn slugify(name: &str) -> String {
    let mut out = String::new();
    for c in name.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed: String = out.trim_matches('-').chars().take(50).collect();
    if trimmed.is_empty() {
        "user".to_string()
    } else {
        trimmed
    }
}
