mod common;

use common::*;
use ticket_desk::{
    dispatch, AdminCommand, CommandOutput, FieldSpec, TicketError, TicketPriority,
    MAX_CATEGORIES,
};

#[tokio::test]
async fn every_admin_command_passes_one_authorization_gate() {
    let ctx = setup().await;
    configure_guild(&ctx).await;

    let err = dispatch(
        &ctx.engine,
        GUILD,
        &outsider(),
        AdminCommand::AddCategory {
            name: "Bugs".into(),
            placeholder: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, TicketError::Forbidden));

    // Staff-role holders, manage-guild holders and the owner all pass.
    dispatch(
        &ctx.engine,
        GUILD,
        &staff(),
        AdminCommand::AddCategory {
            name: "Bugs".into(),
            placeholder: None,
        },
    )
    .await
    .unwrap();
    dispatch(&ctx.engine, GUILD, &owner(), AdminCommand::ListConfig)
        .await
        .unwrap();
}

#[tokio::test]
async fn category_capacity_is_enforced() {
    let ctx = setup().await;
    configure_guild(&ctx).await;
    let config = ctx.engine.config();

    // "Billing" already exists; fill the dropdown to its platform limit.
    for i in 1..MAX_CATEGORIES {
        config
            .add_category(GUILD, &format!("Category {i}"), None)
            .await
            .unwrap();
    }
    let err = config.add_category(GUILD, "One Too Many", None).await.unwrap_err();
    assert!(matches!(err, TicketError::CapacityExceeded(_)));
    assert_eq!(config.categories(GUILD).await.unwrap().len(), MAX_CATEGORIES);
}

#[tokio::test]
async fn field_capacity_is_enforced_and_preserved() {
    let ctx = setup().await;
    configure_guild(&ctx).await;
    let config = ctx.engine.config();

    // "Order ID" exists; three more reach the per-category limit.
    for name in ["Account", "Region", "Plan"] {
        config
            .add_field(GUILD, "Billing", &FieldSpec::required_single_line(name, name))
            .await
            .unwrap();
    }
    let err = config
        .add_field(
            GUILD,
            "Billing",
            &FieldSpec::required_single_line("Fifth", "Fifth"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TicketError::CapacityExceeded(_)));
    assert_eq!(config.fields(GUILD, "Billing").await.unwrap().len(), 4);
}

#[tokio::test]
async fn category_names_are_unique_case_insensitively() {
    let ctx = setup().await;
    configure_guild(&ctx).await;
    let config = ctx.engine.config();

    let err = config.add_category(GUILD, "billing", None).await.unwrap_err();
    assert!(matches!(err, TicketError::Validation(_)));

    // Lookups are case-insensitive too.
    assert_eq!(config.category(GUILD, "BILLING").await.unwrap().name, "Billing");
}

#[tokio::test]
async fn removals_of_absent_entries_are_not_found() {
    let ctx = setup().await;
    configure_guild(&ctx).await;
    let config = ctx.engine.config();

    assert!(matches!(
        config.remove_category(GUILD, "Ghost").await.unwrap_err(),
        TicketError::NotFound(_)
    ));
    assert!(matches!(
        config.remove_field(GUILD, "Billing", "Ghost").await.unwrap_err(),
        TicketError::NotFound(_)
    ));
    assert!(matches!(
        config
            .add_field(GUILD, "Ghost", &FieldSpec::required_single_line("x", "x"))
            .await
            .unwrap_err(),
        TicketError::NotFound(_)
    ));

    // Removing a category drops its fields with it.
    config.remove_category(GUILD, "Billing").await.unwrap();
    assert!(config.fields(GUILD, "Billing").await.unwrap().is_empty());
}

#[tokio::test]
async fn removing_the_staff_role_revokes_access_on_open_tickets() {
    let ctx = setup().await;
    configure_guild(&ctx).await;
    let first = open_billing_ticket(&ctx, &opener()).await;
    let second = open_billing_ticket(&ctx, &opener()).await;

    let out = dispatch(&ctx.engine, GUILD, &owner(), AdminCommand::RemoveStaffRole)
        .await
        .unwrap();
    assert!(matches!(out, CommandOutput::Ack(_)));

    for ticket in [&first, &second] {
        let channel = ctx.gateway.channel(ticket.channel_id).await.unwrap();
        assert_eq!(channel.staff_role, None);
        assert_eq!(channel.revoked_roles, vec![STAFF_ROLE]);
    }

    // A former staff member is just a regular user now.
    let err = ctx
        .engine
        .confirm_close(GUILD, first.channel_id, &staff())
        .await
        .unwrap_err();
    assert!(matches!(err, TicketError::Forbidden));

    // Running it again is a no-op.
    let removed = ctx.engine.remove_staff_role(GUILD, &owner()).await.unwrap();
    assert_eq!(removed, None);
}

#[tokio::test]
async fn post_panel_projects_the_configured_categories() {
    let ctx = setup().await;
    configure_guild(&ctx).await;

    let out = dispatch(&ctx.engine, GUILD, &staff(), AdminCommand::PostPanel)
        .await
        .unwrap();
    let CommandOutput::Panel(view) = out else {
        panic!("expected panel output");
    };
    assert_eq!(view.options.len(), 1);
    assert_eq!(view.options[0].label, "Billing");
    assert_eq!(view.options[0].description.as_deref(), Some("Payment issues"));

    let posts = ctx.gateway.panel_posts().await;
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].0, SUPPORT_CHANNEL);
}

#[tokio::test]
async fn post_panel_requires_configuration() {
    let ctx = setup().await;

    // No support channel configured at all.
    let err = dispatch(&ctx.engine, GUILD, &owner(), AdminCommand::PostPanel)
        .await
        .unwrap_err();
    assert!(matches!(err, TicketError::Validation(_)));

    // Support channel but no categories.
    ctx.engine
        .config()
        .set_support_channel(GUILD, SUPPORT_CHANNEL)
        .await
        .unwrap();
    let err = dispatch(&ctx.engine, GUILD, &owner(), AdminCommand::PostPanel)
        .await
        .unwrap_err();
    assert!(matches!(err, TicketError::Validation(_)));
}

#[tokio::test]
async fn set_ticket_priority_requires_a_ticket_channel() {
    let ctx = setup().await;
    configure_guild(&ctx).await;
    let ticket = open_billing_ticket(&ctx, &opener()).await;

    let err = dispatch(
        &ctx.engine,
        GUILD,
        &staff(),
        AdminCommand::SetTicketPriority {
            channel_id: SUPPORT_CHANNEL,
            priority: TicketPriority::High,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, TicketError::NotFound(_)));

    dispatch(
        &ctx.engine,
        GUILD,
        &staff(),
        AdminCommand::SetTicketPriority {
            channel_id: ticket.channel_id,
            priority: TicketPriority::High,
        },
    )
    .await
    .unwrap();
    let refreshed = ctx
        .engine
        .repository()
        .get(GUILD, ticket.channel_id)
        .await
        .unwrap();
    assert_eq!(refreshed.priority, TicketPriority::High);
}

#[tokio::test]
async fn list_config_renders_categories_and_fields() {
    let ctx = setup().await;
    configure_guild(&ctx).await;

    let out = dispatch(&ctx.engine, GUILD, &owner(), AdminCommand::ListConfig)
        .await
        .unwrap();
    let CommandOutput::Listing(text) = out else {
        panic!("expected listing output");
    };
    assert!(text.contains("Support channel: <#500>"));
    assert!(text.contains("Staff role: <@&42>"));
    assert!(text.contains("- Billing (1 fields)"));
    assert!(text.contains("Order ID [required]"));
}

#[tokio::test]
async fn panel_copy_and_env_defaults_layer_correctly() {
    let pool = memory_pool().await;
    let gateway = std::sync::Arc::new(MockGateway::default());
    let dyn_gateway: std::sync::Arc<dyn ticket_desk::ChatGateway> = gateway.clone();
    let defaults = ticket_desk::EnvDefaults {
        contact_name: Some("Envy".to_string()),
        panel_title: Some("Env Title".to_string()),
        panel_description: None,
        fast_sync_guild: None,
    };
    let engine = ticket_desk::TicketEngine::new(pool, dyn_gateway, defaults);

    // Environment defaults apply while nothing is stored.
    let cfg = engine.config().guild_config(GUILD).await.unwrap();
    assert_eq!(cfg.contact_name.as_deref(), Some("Envy"));
    assert_eq!(cfg.panel_title.as_deref(), Some("Env Title"));

    // Stored values win once written.
    engine
        .config()
        .set_panel_copy(GUILD, "Helpdesk", "How can we help?", "Ops")
        .await
        .unwrap();
    let cfg = engine.config().guild_config(GUILD).await.unwrap();
    assert_eq!(cfg.panel_title.as_deref(), Some("Helpdesk"));
    assert_eq!(cfg.contact_name.as_deref(), Some("Ops"));
}
