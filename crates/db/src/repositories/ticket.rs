use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;

use ticketrelay_core::domain::ticket::{Ticket, TicketFields, TicketId};
use ticketrelay_core::ports::{StoreError, TicketStore};

use super::RepositoryError;
use crate::DbPool;

pub struct SqlTicketStore {
    pool: DbPool,
}

impl SqlTicketStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, link, title, description, requester, status, agent, priority
             FROM ticket WHERE id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_ticket).transpose()
    }

    /// Upserts the full record. `created_at` survives an overwrite.
    pub async fn save(&self, ticket: &Ticket) -> Result<(), RepositoryError> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO ticket (id, link, title, description, requester, status, agent,
                                 priority, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 link = excluded.link,
                 title = excluded.title,
                 description = excluded.description,
                 requester = excluded.requester,
                 status = excluded.status,
                 agent = excluded.agent,
                 priority = excluded.priority,
                 updated_at = excluded.updated_at",
        )
        .bind(ticket.id.as_str())
        .bind(&ticket.link)
        .bind(&ticket.title)
        .bind(&ticket.description)
        .bind(&ticket.fields.requester)
        .bind(&ticket.fields.status)
        .bind(&ticket.fields.agent)
        .bind(&ticket.fields.priority)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn row_to_ticket(row: &sqlx::sqlite::SqliteRow) -> Result<Ticket, RepositoryError> {
    let text = |column: &str| -> Result<String, RepositoryError> {
        row.try_get::<String, _>(column).map_err(|e| RepositoryError::Decode(e.to_string()))
    };

    Ok(Ticket {
        id: TicketId(text("id")?),
        link: text("link")?,
        title: text("title")?,
        description: text("description")?,
        fields: TicketFields {
            requester: text("requester")?,
            status: text("status")?,
            agent: text("agent")?,
            priority: text("priority")?,
        },
    })
}

#[async_trait]
impl TicketStore for SqlTicketStore {
    async fn get(&self, id: &TicketId) -> Result<Option<Ticket>, StoreError> {
        Ok(self.find_by_id(id).await?)
    }

    async fn put(&self, ticket: &Ticket) -> Result<(), StoreError> {
        Ok(self.save(ticket).await?)
    }
}
