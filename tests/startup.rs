mod common;

use common::*;
use ticket_desk::gateway::PANEL_SELECT_ID;
use ticket_desk::{startup, ControlAction};

#[tokio::test]
async fn restore_rebinds_panels_and_open_ticket_controls() {
    let ctx = setup().await;
    configure_guild(&ctx).await;
    let open = open_billing_ticket(&ctx, &opener()).await;
    let solved = open_billing_ticket(&ctx, &opener()).await;
    ctx.engine
        .mark_solved(GUILD, solved.channel_id, &opener())
        .await
        .unwrap();
    let closed = open_billing_ticket(&ctx, &opener()).await;
    ctx.engine
        .confirm_close(GUILD, closed.channel_id, &staff())
        .await
        .unwrap();

    // A fresh process sees only durable state.
    let state = startup::restore(
        ctx.engine.config(),
        ctx.engine.repository(),
        &*ctx.gateway,
    )
    .await
    .unwrap();

    assert_eq!(state.panels.len(), 1);
    assert_eq!(state.panels[0].channel_id, SUPPORT_CHANNEL);
    assert_eq!(state.panels[0].custom_id, PANEL_SELECT_ID);

    // Open and solved tickets are rebound; closed ones are not.
    let channels: Vec<i64> = state.tickets.iter().map(|t| t.channel_id).collect();
    assert_eq!(channels, vec![open.channel_id, solved.channel_id]);

    // Control identities derive from the persisted channel id alone.
    let binding = &state.tickets[0];
    assert_eq!(
        binding.controls.mark_solved,
        ControlAction::MarkSolved.custom_id(open.channel_id)
    );
    assert_eq!(
        ControlAction::parse(&binding.controls.confirm_close),
        Some((ControlAction::ConfirmClose, open.channel_id))
    );
    assert!(state.skipped_guilds.is_empty());
}

#[tokio::test]
async fn a_guild_with_a_missing_support_channel_is_skipped() {
    let ctx = setup().await;
    configure_guild(&ctx).await;
    open_billing_ticket(&ctx, &opener()).await;

    // Another guild configured against a channel that no longer exists.
    ctx.engine
        .config()
        .set_support_channel(2, 777)
        .await
        .unwrap();

    let state = startup::restore(
        ctx.engine.config(),
        ctx.engine.repository(),
        &*ctx.gateway,
    )
    .await
    .unwrap();

    assert_eq!(state.skipped_guilds, vec![2]);
    assert_eq!(state.panels.len(), 1);
    assert_eq!(state.panels[0].guild_id, GUILD);
    assert_eq!(state.tickets.len(), 1);
}

#[tokio::test]
async fn restore_with_no_configuration_is_empty() {
    let ctx = setup().await;
    let state = startup::restore(
        ctx.engine.config(),
        ctx.engine.repository(),
        &*ctx.gateway,
    )
    .await
    .unwrap();
    assert!(state.panels.is_empty());
    assert!(state.tickets.is_empty());
    assert!(state.skipped_guilds.is_empty());
}

#[tokio::test]
async fn a_guild_with_a_missing_ticket_container_is_skipped() {
    let ctx = setup().await;
    configure_guild(&ctx).await;
    ctx.engine
        .config()
        .set_ticket_parent(GUILD, 600)
        .await
        .unwrap();

    // The support channel exists but the configured container does not.
    let state = startup::restore(
        ctx.engine.config(),
        ctx.engine.repository(),
        &*ctx.gateway,
    )
    .await
    .unwrap();
    assert_eq!(state.skipped_guilds, vec![GUILD]);
    assert!(state.panels.is_empty());

    // Once the container is back, the guild binds again.
    ctx.gateway.add_external(600).await;
    let state = startup::restore(
        ctx.engine.config(),
        ctx.engine.repository(),
        &*ctx.gateway,
    )
    .await
    .unwrap();
    assert!(state.skipped_guilds.is_empty());
    assert_eq!(state.panels.len(), 1);
}
