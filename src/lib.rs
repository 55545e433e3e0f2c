//! # ticket-desk
//!
//! Support-ticket lifecycle engine for chat-platform guilds.
//!
//! ## Features
//!
//! - **Intake categories** - Admin-configured categories with per-category
//!   structured submission forms (up to 4 fields plus the fixed issue field)
//! - **Private ticket channels** - Scoped access for the opener and the
//!   configured staff role, dense display numbering that reuses slots
//! - **Solve / confirm-close workflow** - Opener marks solved, staff
//!   confirms closing; the channel is deleted after a grace period
//! - **Priorities** - Low / Normal / High / Urgent, mutable by opener or staff
//! - **Durable activity log** - Every ticket message persisted, the first
//!   one holding the serialized submission field map
//! - **Restart reconciliation** - Interactive control identities derive from
//!   persisted ids, so panels and ticket buttons survive a restart
//! - **Repository pattern** - SQLite data access layer over `sqlx`
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ticket_desk::{ChatGateway, EnvDefaults, TicketEngine, MIGRATOR};
//!
//! # async fn example(pool: sqlx::SqlitePool, gateway: Arc<dyn ChatGateway>) -> anyhow::Result<()> {
//! MIGRATOR.run(&pool).await?;
//! let engine = Arc::new(TicketEngine::new(pool, gateway, EnvDefaults::from_env()));
//!
//! // Rebind panels and ticket controls after a restart.
//! let restored =
//!     ticket_desk::startup::restore(engine.config(), engine.repository(), &**engine.gateway())
//!         .await?;
//! # let _ = restored;
//! # Ok(())
//! # }
//! ```

pub mod alloc;
pub mod commands;
pub mod config;
pub mod engine;
pub mod gateway;
pub mod models;
pub mod panel;
pub mod repository;
pub mod startup;

// Re-export commonly used types
pub use alloc::SlotAllocator;
pub use commands::{dispatch, AdminCommand, CommandOutput};
pub use config::{ConfigStore, EnvDefaults, MAX_CATEGORIES, MAX_CUSTOM_FIELDS};
pub use engine::{ReconcileOptions, ReconcileReport, TicketEngine, DEFAULT_CLOSE_GRACE};
pub use gateway::{ChannelRequest, ChatGateway, ControlAction, TicketControls, TicketIntro};
pub use models::*;
pub use panel::{PanelOption, PanelView};
pub use repository::TicketRepository;
pub use startup::RestoredState;

use thiserror::Error;

/// Embedded schema migrations; run against the pool before constructing the
/// engine.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// Ticket system errors
#[derive(Error, Debug)]
pub enum TicketError {
    /// Malformed or missing submission fields, malformed command arguments.
    /// Surfaced to the caller; no state change.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The caller fails the staff/opener authorization predicate. Logged as
    /// a denied-attempt audit event; no state change.
    #[error("Forbidden")]
    Forbidden,

    /// A referenced category, field, channel or ticket is absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A lifecycle transition attempted from a state that forbids it.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Category or field limits would be exceeded; caught at config time so
    /// the overflow never reaches the platform.
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Durable-write failure; never silently swallowed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Transport-side call failure. Logged; the data side stands and the
    /// reconcile pass repairs any drift.
    #[error("Platform call failed: {0}")]
    Platform(String),
}

pub type Result<T> = std::result::Result<T, TicketError>;
