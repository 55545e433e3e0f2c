#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use ticket_desk::{
    ChannelRequest, ChatGateway, EnvDefaults, FieldSpec, Member, PanelView, Result, Ticket,
    TicketEngine, TicketError, TicketIntro, MIGRATOR,
};

pub const GUILD: i64 = 1;
pub const SUPPORT_CHANNEL: i64 = 500;
pub const STAFF_ROLE: i64 = 42;
pub const OPENER_ID: i64 = 10;
pub const STAFF_ID: i64 = 20;
pub const OTHER_ID: i64 = 999;

#[derive(Debug, Clone, Default)]
pub struct MockChannel {
    pub name: String,
    pub topic: String,
    pub staff_role: Option<i64>,
    pub revoked_roles: Vec<i64>,
    pub intros: Vec<TicketIntro>,
}

#[derive(Default)]
pub struct GatewayState {
    next_id: i64,
    pub channels: HashMap<i64, MockChannel>,
    pub external: HashSet<i64>,
    pub messages: HashMap<i64, Vec<String>>,
    pub panels: Vec<(i64, PanelView)>,
}

/// In-memory stand-in for the chat platform. Ticket channels created through
/// it get ids from 1000 upward; `add_external` registers channels that exist
/// on the platform without the engine having created them.
#[derive(Default)]
pub struct MockGateway {
    pub state: Mutex<GatewayState>,
}

impl MockGateway {
    pub async fn channel(&self, channel_id: i64) -> Option<MockChannel> {
        self.state.lock().await.channels.get(&channel_id).cloned()
    }

    pub async fn add_external(&self, channel_id: i64) {
        self.state.lock().await.external.insert(channel_id);
    }

    /// Simulates a channel deleted behind the engine's back.
    pub async fn drop_out_of_band(&self, channel_id: i64) {
        let mut state = self.state.lock().await;
        state.channels.remove(&channel_id);
        state.external.remove(&channel_id);
    }

    pub async fn messages(&self, channel_id: i64) -> Vec<String> {
        self.state
            .lock()
            .await
            .messages
            .get(&channel_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn panel_posts(&self) -> Vec<(i64, PanelView)> {
        self.state.lock().await.panels.clone()
    }
}

#[async_trait]
impl ChatGateway for MockGateway {
    async fn create_ticket_channel(&self, _guild_id: i64, request: &ChannelRequest) -> Result<i64> {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let id = 1000 + state.next_id;
        state.channels.insert(
            id,
            MockChannel {
                name: request.name.clone(),
                topic: request.topic.clone(),
                staff_role: request.staff_role,
                revoked_roles: Vec::new(),
                intros: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn delete_channel(&self, channel_id: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.channels.remove(&channel_id).is_none() && !state.external.remove(&channel_id) {
            return Err(TicketError::NotFound(format!("channel {channel_id}")));
        }
        Ok(())
    }

    async fn channel_exists(&self, channel_id: i64) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state.channels.contains_key(&channel_id) || state.external.contains(&channel_id))
    }

    async fn set_topic(&self, channel_id: i64, topic: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        match state.channels.get_mut(&channel_id) {
            Some(channel) => {
                channel.topic = topic.to_string();
                Ok(())
            }
            None => Err(TicketError::NotFound(format!("channel {channel_id}"))),
        }
    }

    async fn revoke_role_access(&self, channel_id: i64, role_id: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        match state.channels.get_mut(&channel_id) {
            Some(channel) => {
                channel.revoked_roles.push(role_id);
                if channel.staff_role == Some(role_id) {
                    channel.staff_role = None;
                }
                Ok(())
            }
            None => Err(TicketError::NotFound(format!("channel {channel_id}"))),
        }
    }

    async fn send_message(&self, channel_id: i64, content: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .messages
            .entry(channel_id)
            .or_default()
            .push(content.to_string());
        Ok(())
    }

    async fn post_panel(&self, channel_id: i64, panel: &PanelView) -> Result<i64> {
        let mut state = self.state.lock().await;
        state.panels.push((channel_id, panel.clone()));
        Ok(state.panels.len() as i64)
    }

    async fn post_ticket_controls(&self, channel_id: i64, intro: &TicketIntro) -> Result<()> {
        let mut state = self.state.lock().await;
        match state.channels.get_mut(&channel_id) {
            Some(channel) => {
                channel.intros.push(intro.clone());
                Ok(())
            }
            None => Err(TicketError::NotFound(format!("channel {channel_id}"))),
        }
    }
}

pub struct TestContext {
    pub engine: Arc<TicketEngine>,
    pub gateway: Arc<MockGateway>,
    pub pool: SqlitePool,
}

pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    MIGRATOR.run(&pool).await.expect("migrations");
    pool
}

pub async fn setup() -> TestContext {
    let pool = memory_pool().await;
    let gateway = Arc::new(MockGateway::default());
    let dyn_gateway: Arc<dyn ChatGateway> = gateway.clone();
    let engine = Arc::new(
        TicketEngine::new(pool.clone(), dyn_gateway, EnvDefaults::default())
            .with_close_grace(Duration::ZERO),
    );
    TestContext {
        engine,
        gateway,
        pool,
    }
}

/// Support channel, staff role and a "Billing" category with one required
/// "Order ID" field.
pub async fn configure_guild(ctx: &TestContext) {
    let config = ctx.engine.config();
    config
        .set_support_channel(GUILD, SUPPORT_CHANNEL)
        .await
        .unwrap();
    config.set_staff_role(GUILD, STAFF_ROLE).await.unwrap();
    config
        .add_category(GUILD, "Billing", Some("Payment issues"))
        .await
        .unwrap();
    config
        .add_field(
            GUILD,
            "Billing",
            &FieldSpec::required_single_line("Order ID", "Order ID"),
        )
        .await
        .unwrap();
    ctx.gateway.add_external(SUPPORT_CHANNEL).await;
}

pub fn opener() -> Member {
    let mut member = Member::user(OPENER_ID);
    member.display_name = Some("Alice".to_string());
    member
}

pub fn staff() -> Member {
    Member::with_role(STAFF_ID, STAFF_ROLE)
}

pub fn outsider() -> Member {
    Member::user(OTHER_ID)
}

pub fn owner() -> Member {
    let mut member = Member::user(2);
    member.is_guild_owner = true;
    member
}

pub fn billing_values(issue: &str, order_id: Option<&str>) -> HashMap<String, String> {
    let mut values = HashMap::new();
    values.insert("issue".to_string(), issue.to_string());
    if let Some(order_id) = order_id {
        values.insert("Order ID".to_string(), order_id.to_string());
    }
    values
}

pub async fn open_billing_ticket(ctx: &TestContext, member: &Member) -> Ticket {
    ticket_desk::panel::submit(
        &ctx.engine,
        GUILD,
        member,
        "Billing",
        &billing_values("payment failed", Some("123")),
    )
    .await
    .expect("ticket created")
}

/// Lets the zero-grace deletion task run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
