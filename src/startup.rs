use crate::config::ConfigStore;
use crate::gateway::{ChatGateway, TicketControls, PANEL_SELECT_ID};
use crate::repository::TicketRepository;
use crate::Result;

/// A panel whose dropdown the transport must listen on again.
#[derive(Debug, Clone)]
pub struct PanelBinding {
    pub guild_id: i64,
    pub channel_id: i64,
    pub custom_id: &'static str,
}

/// An open ticket whose action controls the transport must listen on again.
/// Identities come from the persisted channel id, never from state created
/// at ticket-creation time.
#[derive(Debug, Clone)]
pub struct TicketBinding {
    pub guild_id: i64,
    pub ticket_id: i64,
    pub channel_id: i64,
    pub controls: TicketControls,
}

#[derive(Debug, Clone, Default)]
pub struct RestoredState {
    pub panels: Vec<PanelBinding>,
    pub tickets: Vec<TicketBinding>,
    pub skipped_guilds: Vec<i64>,
}

/// Startup reconciliation: rebuilds the interactive bindings for every
/// configured guild from durable storage, so a restart does not orphan
/// existing panels or ticket controls. A guild whose support channel or
/// ticket container is gone is logged and skipped, never fatal.
pub async fn restore(
    config: &ConfigStore,
    repo: &TicketRepository,
    gateway: &dyn ChatGateway,
) -> Result<RestoredState> {
    let mut state = RestoredState::default();
    for guild_id in config.configured_guilds().await? {
        let guild_config = config.guild_config(guild_id).await?;
        let support_channel = match guild_config.support_channel {
            Some(id) => id,
            None => continue,
        };
        let mut present = channel_present(gateway, guild_id, support_channel, "support channel").await;
        if present {
            if let Some(parent) = guild_config.ticket_parent {
                present = channel_present(gateway, guild_id, parent, "ticket container").await;
            }
        }
        if !present {
            state.skipped_guilds.push(guild_id);
            continue;
        }
        state.panels.push(PanelBinding {
            guild_id,
            channel_id: support_channel,
            custom_id: PANEL_SELECT_ID,
        });
        for ticket in repo.list_open(guild_id).await? {
            state.tickets.push(TicketBinding {
                guild_id,
                ticket_id: ticket.id,
                channel_id: ticket.channel_id,
                controls: TicketControls::for_channel(ticket.channel_id),
            });
        }
    }
    tracing::info!(
        panels = state.panels.len(),
        tickets = state.tickets.len(),
        skipped = state.skipped_guilds.len(),
        "interactive state restored"
    );
    Ok(state)
}

async fn channel_present(
    gateway: &dyn ChatGateway,
    guild_id: i64,
    channel_id: i64,
    role: &str,
) -> bool {
    match gateway.channel_exists(channel_id).await {
        Ok(true) => true,
        Ok(false) => {
            tracing::warn!(guild_id, channel_id, "{} missing, skipping guild", role);
            false
        }
        Err(e) => {
            tracing::warn!(guild_id, channel_id, "{} lookup failed, skipping guild: {}", role, e);
            false
        }
    }
}
