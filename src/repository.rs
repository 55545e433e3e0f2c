use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::models::{NewMessage, NewTicket, Ticket, TicketMessage, TicketPriority, TicketStatus};
use crate::{Result, TicketError};

/// Durable record of tickets and their activity log; the source of truth for
/// lifecycle state and priority. Every write lands before the corresponding
/// platform-side effect is considered complete, so a crash in between leaves
/// a state the reconcile pass can repair.
#[derive(Clone)]
pub struct TicketRepository {
    pool: SqlitePool,
}

impl TicketRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts the ticket, its first message (the serialized submission) and
    /// the counter update as one transaction. The caller holds the guild's
    /// allocation guard, so the slot it computed is still free.
    pub async fn create(&self, ticket: &NewTicket, first_message: &NewMessage) -> Result<Ticket> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(TicketError::Database)?;
        let res = sqlx::query(
            "INSERT INTO tickets (guild_id, channel_id, opener_id, category_name, number, \
             priority, status, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(ticket.guild_id)
        .bind(ticket.channel_id)
        .bind(ticket.opener_id)
        .bind(&ticket.category_name)
        .bind(ticket.number)
        .bind(ticket.priority)
        .bind(TicketStatus::Open)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("failed to insert ticket: {}", e);
            TicketError::Database(e)
        })?;
        let ticket_id = res.last_insert_rowid();

        sqlx::query(
            "INSERT INTO guild_counters (guild_id, value) VALUES (?, ?) \
             ON CONFLICT (guild_id) DO UPDATE SET value = excluded.value",
        )
        .bind(ticket.guild_id)
        .bind(ticket.number)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO messages (ticket_id, platform_message_id, author_id, content, \
             attachments, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(ticket_id)
        .bind(first_message.platform_message_id)
        .bind(first_message.author_id)
        .bind(&first_message.content)
        .bind(&first_message.attachments)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.get_by_id(ticket_id).await
    }

    pub async fn get_by_id(&self, ticket_id: i64) -> Result<Ticket> {
        sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE id = ?")
            .bind(ticket_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => TicketError::NotFound(format!("ticket {ticket_id}")),
                _ => {
                    tracing::error!("failed to fetch ticket: {}", e);
                    TicketError::Database(e)
                }
            })
    }

    /// Ticket identity is guild + channel.
    pub async fn get(&self, guild_id: i64, channel_id: i64) -> Result<Ticket> {
        sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE guild_id = ? AND channel_id = ?")
            .bind(guild_id)
            .bind(channel_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => {
                    TicketError::NotFound(format!("no ticket for channel {channel_id}"))
                }
                _ => TicketError::Database(e),
            })
    }

    /// Open and solved tickets, ordered by slot.
    pub async fn list_open(&self, guild_id: i64) -> Result<Vec<Ticket>> {
        let rows = sqlx::query_as::<_, Ticket>(
            "SELECT * FROM tickets WHERE guild_id = ? AND status != 'closed' ORDER BY number ASC",
        )
        .bind(guild_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Slots currently held by non-closed tickets.
    pub async fn open_slots(&self, guild_id: i64) -> Result<Vec<i64>> {
        let rows: Vec<i64> = sqlx::query_scalar(
            "SELECT number FROM tickets WHERE guild_id = ? AND status != 'closed'",
        )
        .bind(guild_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn append_message(
        &self,
        ticket_id: i64,
        message: &NewMessage,
    ) -> Result<TicketMessage> {
        let now = Utc::now();
        let res = sqlx::query(
            "INSERT INTO messages (ticket_id, platform_message_id, author_id, content, \
             attachments, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(ticket_id)
        .bind(message.platform_message_id)
        .bind(message.author_id)
        .bind(&message.content)
        .bind(&message.attachments)
        .bind(now)
        .execute(&self.pool)
        .await?;
        let message = sqlx::query_as::<_, TicketMessage>("SELECT * FROM messages WHERE id = ?")
            .bind(res.last_insert_rowid())
            .fetch_one(&self.pool)
            .await?;
        Ok(message)
    }

    /// Full ordered activity log of a ticket.
    pub async fn transcript(&self, ticket_id: i64) -> Result<Vec<TicketMessage>> {
        let rows = sqlx::query_as::<_, TicketMessage>(
            "SELECT * FROM messages WHERE ticket_id = ? ORDER BY id ASC",
        )
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn set_priority(&self, ticket_id: i64, priority: TicketPriority) -> Result<()> {
        let res = sqlx::query("UPDATE tickets SET priority = ? WHERE id = ? AND status != 'closed'")
            .bind(priority)
            .bind(ticket_id)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(TicketError::InvalidState("ticket is closed".into()));
        }
        Ok(())
    }

    /// Guarded transition `Open -> Solved`. The WHERE clause is the backstop
    /// against two overlapping presses of the same control.
    pub async fn mark_solved(&self, ticket_id: i64) -> Result<()> {
        let res = sqlx::query("UPDATE tickets SET status = 'solved' WHERE id = ? AND status = 'open'")
            .bind(ticket_id)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(TicketError::InvalidState("ticket is not open".into()));
        }
        Ok(())
    }

    /// Guarded transition `Solved -> Open`.
    pub async fn unmark_solved(&self, ticket_id: i64) -> Result<()> {
        let res = sqlx::query("UPDATE tickets SET status = 'open' WHERE id = ? AND status = 'solved'")
            .bind(ticket_id)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(TicketError::InvalidState("ticket is not marked solved".into()));
        }
        Ok(())
    }

    /// Terminal transition; frees the slot.
    pub async fn mark_closed(
        &self,
        ticket_id: i64,
        closed_at: DateTime<Utc>,
        closed_by: Option<i64>,
    ) -> Result<()> {
        let res = sqlx::query(
            "UPDATE tickets SET status = 'closed', closed_at = ?, closed_by = ? \
             WHERE id = ? AND status != 'closed'",
        )
        .bind(closed_at)
        .bind(closed_by)
        .bind(ticket_id)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(TicketError::InvalidState("ticket already closed".into()));
        }
        Ok(())
    }
}
