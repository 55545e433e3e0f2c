use sqlx::SqlitePool;

use crate::alloc::GuildLocks;
use crate::models::{Category, FieldDef, FieldSpec, FullConfig, GuildConfig};
use crate::{Result, TicketError};

/// Platform dropdowns hold at most 25 options.
pub const MAX_CATEGORIES: usize = 25;

/// Platform modals hold at most 5 inputs; one is the fixed issue-description
/// field, leaving 4 for admin-configured fields.
pub const MAX_CUSTOM_FIELDS: usize = 4;

/// Process-level defaults consumed at startup. Everything here is
/// overridable later through the admin surface; stored values win.
#[derive(Debug, Clone, Default)]
pub struct EnvDefaults {
    pub contact_name: Option<String>,
    pub panel_title: Option<String>,
    pub panel_description: Option<String>,
    pub fast_sync_guild: Option<i64>,
}

impl EnvDefaults {
    pub fn from_env() -> Self {
        fn var(key: &str) -> Option<String> {
            std::env::var(key).ok().filter(|v| !v.is_empty())
        }
        Self {
            contact_name: var("SUPPORT_CONTACT_NAME"),
            panel_title: var("PANEL_TITLE"),
            panel_description: var("PANEL_DESCRIPTION"),
            fast_sync_guild: var("GUILD_ID").and_then(|v| v.parse().ok()),
        }
    }
}

/// Guild settings, categories and field definitions. Reads are shared;
/// mutations for one guild are serialized through a per-guild lock so admin
/// commands cannot race themselves.
#[derive(Clone)]
pub struct ConfigStore {
    pool: SqlitePool,
    defaults: EnvDefaults,
    locks: GuildLocks,
}

impl ConfigStore {
    pub fn new(pool: SqlitePool, defaults: EnvDefaults) -> Self {
        Self {
            pool,
            defaults,
            locks: GuildLocks::new(),
        }
    }

    async fn ensure_row(&self, guild_id: i64) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO config (guild_id) VALUES (?)")
            .bind(guild_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_column(&self, guild_id: i64, query: &str, value: Option<i64>) -> Result<()> {
        let _guard = self.locks.acquire(guild_id).await;
        self.ensure_row(guild_id).await?;
        sqlx::query(query)
            .bind(value)
            .bind(guild_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_support_channel(&self, guild_id: i64, channel_id: i64) -> Result<()> {
        self.set_column(
            guild_id,
            "UPDATE config SET support_channel = ? WHERE guild_id = ?",
            Some(channel_id),
        )
        .await
    }

    pub async fn set_ticket_parent(&self, guild_id: i64, parent_id: i64) -> Result<()> {
        self.set_column(
            guild_id,
            "UPDATE config SET ticket_parent = ? WHERE guild_id = ?",
            Some(parent_id),
        )
        .await
    }

    pub async fn set_staff_role(&self, guild_id: i64, role_id: i64) -> Result<()> {
        self.set_column(
            guild_id,
            "UPDATE config SET staff_role = ? WHERE guild_id = ?",
            Some(role_id),
        )
        .await
    }

    /// Clears the configured staff role, returning the previous value so the
    /// caller can revoke role-derived channel access on open tickets.
    /// No-op `Ok(None)` when no role was configured.
    pub async fn remove_staff_role(&self, guild_id: i64) -> Result<Option<i64>> {
        let _guard = self.locks.acquire(guild_id).await;
        let previous: Option<i64> =
            sqlx::query_scalar("SELECT staff_role FROM config WHERE guild_id = ?")
                .bind(guild_id)
                .fetch_optional(&self.pool)
                .await?
                .flatten();
        if previous.is_some() {
            sqlx::query("UPDATE config SET staff_role = NULL WHERE guild_id = ?")
                .bind(guild_id)
                .execute(&self.pool)
                .await?;
        }
        Ok(previous)
    }

    pub async fn set_panel_copy(
        &self,
        guild_id: i64,
        title: &str,
        description: &str,
        contact_name: &str,
    ) -> Result<()> {
        let _guard = self.locks.acquire(guild_id).await;
        self.ensure_row(guild_id).await?;
        sqlx::query(
            "UPDATE config SET panel_title = ?, panel_description = ?, contact_name = ? \
             WHERE guild_id = ?",
        )
        .bind(title)
        .bind(description)
        .bind(contact_name)
        .bind(guild_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_allow_user_close(&self, guild_id: i64, allow: bool) -> Result<()> {
        let _guard = self.locks.acquire(guild_id).await;
        self.ensure_row(guild_id).await?;
        sqlx::query("UPDATE config SET allow_user_close = ? WHERE guild_id = ?")
            .bind(allow)
            .bind(guild_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn add_category(
        &self,
        guild_id: i64,
        name: &str,
        placeholder: Option<&str>,
    ) -> Result<Category> {
        if name.trim().is_empty() {
            return Err(TicketError::Validation("category name is empty".into()));
        }
        let _guard = self.locks.acquire(guild_id).await;
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM categories WHERE guild_id = ?")
                .bind(guild_id)
                .fetch_one(&self.pool)
                .await?;
        if count as usize >= MAX_CATEGORIES {
            return Err(TicketError::CapacityExceeded(format!(
                "guild already has {MAX_CATEGORIES} categories"
            )));
        }
        let exists: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM categories WHERE guild_id = ? AND LOWER(name) = LOWER(?)",
        )
        .bind(guild_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        if exists > 0 {
            return Err(TicketError::Validation(format!(
                "category '{name}' already exists"
            )));
        }
        let position: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM categories WHERE guild_id = ?",
        )
        .bind(guild_id)
        .fetch_one(&self.pool)
        .await?;
        sqlx::query(
            "INSERT INTO categories (guild_id, name, placeholder, position) VALUES (?, ?, ?, ?)",
        )
        .bind(guild_id)
        .bind(name)
        .bind(placeholder)
        .bind(position)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("failed to insert category: {}", e);
            TicketError::Database(e)
        })?;
        self.category(guild_id, name).await
    }

    /// Removing an absent category fails with `NotFound`; the same policy
    /// applies to `remove_field`.
    pub async fn remove_category(&self, guild_id: i64, name: &str) -> Result<()> {
        let _guard = self.locks.acquire(guild_id).await;
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM fields WHERE guild_id = ? AND LOWER(category_name) = LOWER(?)")
            .bind(guild_id)
            .bind(name)
            .execute(&mut *tx)
            .await?;
        let res = sqlx::query("DELETE FROM categories WHERE guild_id = ? AND LOWER(name) = LOWER(?)")
            .bind(guild_id)
            .bind(name)
            .execute(&mut *tx)
            .await?;
        if res.rows_affected() == 0 {
            return Err(TicketError::NotFound(format!("category '{name}'")));
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn add_field(
        &self,
        guild_id: i64,
        category_name: &str,
        spec: &FieldSpec,
    ) -> Result<FieldDef> {
        if spec.name.trim().is_empty() || spec.label.trim().is_empty() {
            return Err(TicketError::Validation(
                "field name and label must be non-empty".into(),
            ));
        }
        let _guard = self.locks.acquire(guild_id).await;
        let category = self.category(guild_id, category_name).await?;
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM fields WHERE guild_id = ? AND LOWER(category_name) = LOWER(?)",
        )
        .bind(guild_id)
        .bind(&category.name)
        .fetch_one(&self.pool)
        .await?;
        if count as usize >= MAX_CUSTOM_FIELDS {
            return Err(TicketError::CapacityExceeded(format!(
                "category '{}' already has {MAX_CUSTOM_FIELDS} fields",
                category.name
            )));
        }
        let exists: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM fields WHERE guild_id = ? AND LOWER(category_name) = LOWER(?) \
             AND LOWER(name) = LOWER(?)",
        )
        .bind(guild_id)
        .bind(&category.name)
        .bind(&spec.name)
        .fetch_one(&self.pool)
        .await?;
        if exists > 0 {
            return Err(TicketError::Validation(format!(
                "field '{}' already exists in '{}'",
                spec.name, category.name
            )));
        }
        let position: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM fields \
             WHERE guild_id = ? AND LOWER(category_name) = LOWER(?)",
        )
        .bind(guild_id)
        .bind(&category.name)
        .fetch_one(&self.pool)
        .await?;
        sqlx::query(
            "INSERT INTO fields (guild_id, category_name, name, label, required, style, \
             min_len, max_len, position) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(guild_id)
        .bind(&category.name)
        .bind(&spec.name)
        .bind(&spec.label)
        .bind(spec.required)
        .bind(spec.style)
        .bind(spec.min_len)
        .bind(spec.max_len)
        .bind(position)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("failed to insert field: {}", e);
            TicketError::Database(e)
        })?;
        let field = sqlx::query_as::<_, FieldDef>(
            "SELECT * FROM fields WHERE guild_id = ? AND LOWER(category_name) = LOWER(?) \
             AND LOWER(name) = LOWER(?)",
        )
        .bind(guild_id)
        .bind(&category.name)
        .bind(&spec.name)
        .fetch_one(&self.pool)
        .await?;
        Ok(field)
    }

    pub async fn remove_field(
        &self,
        guild_id: i64,
        category_name: &str,
        field_name: &str,
    ) -> Result<()> {
        let _guard = self.locks.acquire(guild_id).await;
        let category = self.category(guild_id, category_name).await?;
        let res = sqlx::query(
            "DELETE FROM fields WHERE guild_id = ? AND LOWER(category_name) = LOWER(?) \
             AND LOWER(name) = LOWER(?)",
        )
        .bind(guild_id)
        .bind(&category.name)
        .bind(field_name)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(TicketError::NotFound(format!(
                "field '{field_name}' in '{}'",
                category.name
            )));
        }
        Ok(())
    }

    /// Stored settings for the guild, falling back to an empty row and then
    /// to environment defaults for the panel copy.
    pub async fn guild_config(&self, guild_id: i64) -> Result<GuildConfig> {
        let row = sqlx::query_as::<_, GuildConfig>("SELECT * FROM config WHERE guild_id = ?")
            .bind(guild_id)
            .fetch_optional(&self.pool)
            .await?;
        let mut cfg = row.unwrap_or_else(|| GuildConfig::empty(guild_id));
        if cfg.contact_name.is_none() {
            cfg.contact_name = self.defaults.contact_name.clone();
        }
        if cfg.panel_title.is_none() {
            cfg.panel_title = self.defaults.panel_title.clone();
        }
        if cfg.panel_description.is_none() {
            cfg.panel_description = self.defaults.panel_description.clone();
        }
        Ok(cfg)
    }

    pub async fn categories(&self, guild_id: i64) -> Result<Vec<Category>> {
        let rows = sqlx::query_as::<_, Category>(
            "SELECT * FROM categories WHERE guild_id = ? ORDER BY position ASC",
        )
        .bind(guild_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn category(&self, guild_id: i64, name: &str) -> Result<Category> {
        sqlx::query_as::<_, Category>(
            "SELECT * FROM categories WHERE guild_id = ? AND LOWER(name) = LOWER(?)",
        )
        .bind(guild_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| TicketError::NotFound(format!("category '{name}'")))
    }

    pub async fn fields(&self, guild_id: i64, category_name: &str) -> Result<Vec<FieldDef>> {
        let rows = sqlx::query_as::<_, FieldDef>(
            "SELECT * FROM fields WHERE guild_id = ? AND LOWER(category_name) = LOWER(?) \
             ORDER BY position ASC",
        )
        .bind(guild_id)
        .bind(category_name)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn full_config(&self, guild_id: i64) -> Result<FullConfig> {
        let config = self.guild_config(guild_id).await?;
        let mut categories = Vec::new();
        for category in self.categories(guild_id).await? {
            let fields = self.fields(guild_id, &category.name).await?;
            categories.push((category, fields));
        }
        Ok(FullConfig { config, categories })
    }

    /// Guilds with a configured support channel, for startup reconciliation.
    pub async fn configured_guilds(&self) -> Result<Vec<i64>> {
        let rows: Vec<i64> = sqlx::query_scalar(
            "SELECT guild_id FROM config WHERE support_channel IS NOT NULL ORDER BY guild_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
