use crate::engine::{ReconcileOptions, ReconcileReport, TicketEngine};
use crate::models::{FieldSpec, Member, TicketPriority};
use crate::panel::{self, PanelView};
use crate::Result;

/// The admin command surface as one tagged-variant set. Every variant goes
/// through the same staff-authorization gate before touching the config
/// store or the engine, keeping authorization orthogonal to the mutations.
#[derive(Debug, Clone)]
pub enum AdminCommand {
    SetSupportChannel { channel_id: i64 },
    SetTicketParent { parent_id: i64 },
    SetStaffRole { role_id: i64 },
    RemoveStaffRole,
    SetPanelCopy { title: String, description: String, contact_name: String },
    SetAllowUserClose { allow: bool },
    AddCategory { name: String, placeholder: Option<String> },
    RemoveCategory { name: String },
    AddField { category: String, spec: FieldSpec },
    RemoveField { category: String, name: String },
    ListConfig,
    /// Posts the panel in the configured support channel.
    PostPanel,
    /// Must be invoked inside a ticket channel.
    SetTicketPriority { channel_id: i64, priority: TicketPriority },
    ReconcileTickets { close_all: bool, delete_channels: bool },
}

#[derive(Debug, Clone)]
pub enum CommandOutput {
    Ack(String),
    Listing(String),
    Panel(PanelView),
    Reconciled(ReconcileReport),
}

pub async fn dispatch(
    engine: &TicketEngine,
    guild_id: i64,
    caller: &Member,
    command: AdminCommand,
) -> Result<CommandOutput> {
    engine.authorize_staff(guild_id, caller).await?;
    let config = engine.config();
    match command {
        AdminCommand::SetSupportChannel { channel_id } => {
            config.set_support_channel(guild_id, channel_id).await?;
            Ok(CommandOutput::Ack(format!("Support channel set to <#{channel_id}>")))
        }
        AdminCommand::SetTicketParent { parent_id } => {
            config.set_ticket_parent(guild_id, parent_id).await?;
            Ok(CommandOutput::Ack("Ticket parent container set".into()))
        }
        AdminCommand::SetStaffRole { role_id } => {
            config.set_staff_role(guild_id, role_id).await?;
            Ok(CommandOutput::Ack(format!("Staff role set to <@&{role_id}>")))
        }
        AdminCommand::RemoveStaffRole => {
            let removed = engine.remove_staff_role(guild_id, caller).await?;
            Ok(CommandOutput::Ack(match removed {
                Some(_) => "Staff role removed; channel access revoked on open tickets".into(),
                None => "No staff role was configured".into(),
            }))
        }
        AdminCommand::SetPanelCopy { title, description, contact_name } => {
            config
                .set_panel_copy(guild_id, &title, &description, &contact_name)
                .await?;
            Ok(CommandOutput::Ack("Panel content updated".into()))
        }
        AdminCommand::SetAllowUserClose { allow } => {
            config.set_allow_user_close(guild_id, allow).await?;
            Ok(CommandOutput::Ack(format!("Opener close set to {allow}")))
        }
        AdminCommand::AddCategory { name, placeholder } => {
            let category = config
                .add_category(guild_id, &name, placeholder.as_deref())
                .await?;
            Ok(CommandOutput::Ack(format!("Category '{}' added", category.name)))
        }
        AdminCommand::RemoveCategory { name } => {
            config.remove_category(guild_id, &name).await?;
            Ok(CommandOutput::Ack(format!("Category '{name}' removed")))
        }
        AdminCommand::AddField { category, spec } => {
            let field = config.add_field(guild_id, &category, &spec).await?;
            Ok(CommandOutput::Ack(format!(
                "Field '{}' added to category '{}'",
                field.label, field.category_name
            )))
        }
        AdminCommand::RemoveField { category, name } => {
            config.remove_field(guild_id, &category, &name).await?;
            Ok(CommandOutput::Ack(format!("Field '{name}' removed from '{category}'")))
        }
        AdminCommand::ListConfig => {
            let full = config.full_config(guild_id).await?;
            Ok(CommandOutput::Listing(render_listing(&full)))
        }
        AdminCommand::PostPanel => {
            let full = config.full_config(guild_id).await?;
            let channel_id = full.config.support_channel.ok_or_else(|| {
                crate::TicketError::Validation("support channel not set".into())
            })?;
            let categories: Vec<_> = full.categories.iter().map(|(c, _)| c.clone()).collect();
            let view = panel::render_panel(&full.config, &categories)?;
            engine.gateway().post_panel(channel_id, &view).await?;
            Ok(CommandOutput::Panel(view))
        }
        AdminCommand::SetTicketPriority { channel_id, priority } => {
            let ticket = engine
                .set_priority(guild_id, channel_id, caller, priority)
                .await?;
            Ok(CommandOutput::Ack(format!(
                "Priority of ticket #{:04} set to {}",
                ticket.number, ticket.priority
            )))
        }
        AdminCommand::ReconcileTickets { close_all, delete_channels } => {
            let report = engine
                .reconcile(
                    guild_id,
                    caller,
                    ReconcileOptions {
                        repair_drift: true,
                        close_all,
                        delete_channels,
                    },
                )
                .await?;
            Ok(CommandOutput::Reconciled(report))
        }
    }
}

fn render_listing(full: &crate::models::FullConfig) -> String {
    let cfg = &full.config;
    let mut lines = Vec::new();
    lines.push(match cfg.support_channel {
        Some(id) => format!("Support channel: <#{id}>"),
        None => "Support channel: not set".to_string(),
    });
    lines.push(match cfg.ticket_parent {
        Some(id) => format!("Ticket parent container: {id}"),
        None => "Ticket parent container: not set".to_string(),
    });
    lines.push(match cfg.staff_role {
        Some(id) => format!("Staff role: <@&{id}>"),
        None => "Staff role: not set".to_string(),
    });
    lines.push(format!(
        "Panel title: {}",
        cfg.panel_title.as_deref().unwrap_or("(default)")
    ));
    lines.push(format!(
        "Contact name: {}",
        cfg.contact_name.as_deref().unwrap_or("(default)")
    ));
    lines.push(String::new());
    lines.push("Categories:".to_string());
    if full.categories.is_empty() {
        lines.push("- (none)".to_string());
    }
    for (category, fields) in &full.categories {
        lines.push(format!("- {} ({} fields)", category.name, fields.len()));
        for field in fields {
            let required = if field.required { "required" } else { "optional" };
            lines.push(format!("  * {} [{required}]", field.label));
        }
    }
    lines.join("\n")
}
