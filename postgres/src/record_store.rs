//! `PostgreSQL` record store.
//!
//! Queue counters are mutated only through single-statement conditional
//! updates keyed by queue identity, so the allocator and state machine
//! stay correct even when several service instances share one database:
//!
//! - queue creation uses `INSERT ... ON CONFLICT DO NOTHING` followed by a
//!   fetch (the create-or-fetch race resolves inside this method, never
//!   surfacing a conflict)
//! - ticket allocation increments `last_assigned` and inserts the ticket
//!   in one transaction; the `UPDATE ... RETURNING` row-locks the queue
//!   row, serializing concurrent allocations
//! - ticket closes and serving-counter moves are compare-and-set
//!   (`WHERE status = 'scheduled'` / `WHERE current_number = $expected`)
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE queues (
//!     doctor_id      UUID        NOT NULL,
//!     queue_date     DATE        NOT NULL,
//!     current_number INTEGER     NOT NULL DEFAULT 0,
//!     last_assigned  INTEGER     NOT NULL DEFAULT 0,
//!     created_at     TIMESTAMPTZ NOT NULL,
//!     PRIMARY KEY (doctor_id, queue_date)
//! );
//!
//! CREATE TABLE tickets (
//!     id          UUID        PRIMARY KEY,
//!     doctor_id   UUID        NOT NULL,
//!     queue_date  DATE        NOT NULL,
//!     number      INTEGER     NOT NULL,
//!     holder      UUID        NOT NULL,
//!     reason      TEXT        NOT NULL,
//!     status      TEXT        NOT NULL,
//!     booked_at   TIMESTAMPTZ NOT NULL,
//!     resolved_at TIMESTAMPTZ,
//!     UNIQUE (doctor_id, queue_date, number)
//! );
//! CREATE INDEX idx_tickets_holder ON tickets (doctor_id, queue_date, holder);
//! ```

use chrono::{DateTime, Utc};
use cliniq_core::store::{RecordStore, StoreFuture};
use cliniq_core::{
    AccountId, DoctorId, Queue, QueueError, QueueKey, Ticket, TicketId, TicketStatus,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

fn storage_err(e: sqlx::Error) -> QueueError {
    QueueError::Storage(e.to_string())
}

fn status_to_str(status: TicketStatus) -> &'static str {
    match status {
        TicketStatus::Scheduled => "scheduled",
        TicketStatus::Completed => "completed",
        TicketStatus::Cancelled => "cancelled",
        TicketStatus::Missed => "missed",
    }
}

fn status_from_str(s: &str) -> Result<TicketStatus, QueueError> {
    match s {
        "scheduled" => Ok(TicketStatus::Scheduled),
        "completed" => Ok(TicketStatus::Completed),
        "cancelled" => Ok(TicketStatus::Cancelled),
        "missed" => Ok(TicketStatus::Missed),
        other => Err(QueueError::Storage(format!("unknown ticket status '{other}'"))),
    }
}

#[allow(clippy::cast_sign_loss)]
fn queue_from_row(row: &PgRow) -> Result<Queue, QueueError> {
    let doctor: Uuid = row.try_get("doctor_id").map_err(storage_err)?;
    let date = row.try_get("queue_date").map_err(storage_err)?;
    let current_number: i32 = row.try_get("current_number").map_err(storage_err)?;
    let last_assigned: i32 = row.try_get("last_assigned").map_err(storage_err)?;
    Ok(Queue {
        key: QueueKey::new(DoctorId::from_uuid(doctor), date),
        current_number: current_number as u32,
        last_assigned: last_assigned as u32,
        created_at: row.try_get("created_at").map_err(storage_err)?,
    })
}

#[allow(clippy::cast_sign_loss)]
fn ticket_from_row(row: &PgRow) -> Result<Ticket, QueueError> {
    let id: Uuid = row.try_get("id").map_err(storage_err)?;
    let doctor: Uuid = row.try_get("doctor_id").map_err(storage_err)?;
    let holder: Uuid = row.try_get("holder").map_err(storage_err)?;
    let number: i32 = row.try_get("number").map_err(storage_err)?;
    let status: String = row.try_get("status").map_err(storage_err)?;
    Ok(Ticket {
        id: TicketId::from_uuid(id),
        queue: QueueKey::new(
            DoctorId::from_uuid(doctor),
            row.try_get("queue_date").map_err(storage_err)?,
        ),
        number: number as u32,
        holder: AccountId::from_uuid(holder),
        reason: row.try_get("reason").map_err(storage_err)?,
        status: status_from_str(&status)?,
        booked_at: row.try_get("booked_at").map_err(storage_err)?,
        resolved_at: row.try_get("resolved_at").map_err(storage_err)?,
    })
}

/// PostgreSQL-backed implementation of [`RecordStore`].
#[derive(Clone)]
pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    /// Create a record store over an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool, for sharing with other stores.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the queue and ticket tables if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Storage`] if the DDL fails.
    pub async fn ensure_schema(&self) -> Result<(), QueueError> {
        sqlx::query(
            r"CREATE TABLE IF NOT EXISTS queues (
                doctor_id      UUID        NOT NULL,
                queue_date     DATE        NOT NULL,
                current_number INTEGER     NOT NULL DEFAULT 0,
                last_assigned  INTEGER     NOT NULL DEFAULT 0,
                created_at     TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (doctor_id, queue_date)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            r"CREATE TABLE IF NOT EXISTS tickets (
                id          UUID        PRIMARY KEY,
                doctor_id   UUID        NOT NULL,
                queue_date  DATE        NOT NULL,
                number      INTEGER     NOT NULL,
                holder      UUID        NOT NULL,
                reason      TEXT        NOT NULL,
                status      TEXT        NOT NULL,
                booked_at   TIMESTAMPTZ NOT NULL,
                resolved_at TIMESTAMPTZ,
                UNIQUE (doctor_id, queue_date, number)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            r"CREATE INDEX IF NOT EXISTS idx_tickets_holder
              ON tickets (doctor_id, queue_date, holder)",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        debug!("queue schema ensured");
        Ok(())
    }
}

impl RecordStore for PostgresRecordStore {
    fn create_or_fetch_queue(&self, key: QueueKey, now: DateTime<Utc>) -> StoreFuture<'_, Queue> {
        let pool = self.pool.clone();
        Box::pin(async move {
            sqlx::query(
                r"INSERT INTO queues (doctor_id, queue_date, current_number, last_assigned, created_at)
                  VALUES ($1, $2, 0, 0, $3)
                  ON CONFLICT (doctor_id, queue_date) DO NOTHING",
            )
            .bind(key.doctor.as_uuid())
            .bind(key.date)
            .bind(now)
            .execute(&pool)
            .await
            .map_err(storage_err)?;

            let row = sqlx::query(
                r"SELECT doctor_id, queue_date, current_number, last_assigned, created_at
                  FROM queues WHERE doctor_id = $1 AND queue_date = $2",
            )
            .bind(key.doctor.as_uuid())
            .bind(key.date)
            .fetch_one(&pool)
            .await
            .map_err(storage_err)?;

            queue_from_row(&row)
        })
    }

    fn queue(&self, key: QueueKey) -> StoreFuture<'_, Option<Queue>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let row = sqlx::query(
                r"SELECT doctor_id, queue_date, current_number, last_assigned, created_at
                  FROM queues WHERE doctor_id = $1 AND queue_date = $2",
            )
            .bind(key.doctor.as_uuid())
            .bind(key.date)
            .fetch_optional(&pool)
            .await
            .map_err(storage_err)?;

            row.as_ref().map(queue_from_row).transpose()
        })
    }

    fn allocate_ticket(
        &self,
        key: QueueKey,
        holder: AccountId,
        reason: String,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, Ticket> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let mut tx = pool.begin().await.map_err(storage_err)?;

            // Row-locks the queue, so concurrent allocations on the same
            // key serialize here and the sequence stays gapless.
            let row = sqlx::query(
                r"UPDATE queues SET last_assigned = last_assigned + 1
                  WHERE doctor_id = $1 AND queue_date = $2
                  RETURNING last_assigned",
            )
            .bind(key.doctor.as_uuid())
            .bind(key.date)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage_err)?
            .ok_or_else(|| QueueError::not_found("queue", key))?;

            let number: i32 = row.try_get("last_assigned").map_err(storage_err)?;
            let id = TicketId::new();

            sqlx::query(
                r"INSERT INTO tickets
                  (id, doctor_id, queue_date, number, holder, reason, status, booked_at)
                  VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(id.as_uuid())
            .bind(key.doctor.as_uuid())
            .bind(key.date)
            .bind(number)
            .bind(holder.as_uuid())
            .bind(&reason)
            .bind(status_to_str(TicketStatus::Scheduled))
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;

            tx.commit().await.map_err(storage_err)?;

            #[allow(clippy::cast_sign_loss)]
            let number = number as u32;
            Ok(Ticket {
                id,
                queue: key,
                number,
                holder,
                reason,
                status: TicketStatus::Scheduled,
                booked_at: now,
                resolved_at: None,
            })
        })
    }

    fn ticket(&self, id: TicketId) -> StoreFuture<'_, Option<Ticket>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let row = sqlx::query(r"SELECT * FROM tickets WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&pool)
                .await
                .map_err(storage_err)?;
            row.as_ref().map(ticket_from_row).transpose()
        })
    }

    #[allow(clippy::cast_possible_wrap)]
    fn ticket_by_number(&self, key: QueueKey, number: u32) -> StoreFuture<'_, Option<Ticket>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let row = sqlx::query(
                r"SELECT * FROM tickets
                  WHERE doctor_id = $1 AND queue_date = $2 AND number = $3",
            )
            .bind(key.doctor.as_uuid())
            .bind(key.date)
            .bind(number as i32)
            .fetch_optional(&pool)
            .await
            .map_err(storage_err)?;
            row.as_ref().map(ticket_from_row).transpose()
        })
    }

    #[allow(clippy::cast_possible_wrap)]
    fn tickets_from(&self, key: QueueKey, from_number: u32) -> StoreFuture<'_, Vec<Ticket>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let rows = sqlx::query(
                r"SELECT * FROM tickets
                  WHERE doctor_id = $1 AND queue_date = $2 AND number >= $3
                  ORDER BY number ASC",
            )
            .bind(key.doctor.as_uuid())
            .bind(key.date)
            .bind(from_number as i32)
            .fetch_all(&pool)
            .await
            .map_err(storage_err)?;
            rows.iter().map(ticket_from_row).collect()
        })
    }

    fn ticket_for_holder(&self, key: QueueKey, holder: AccountId) -> StoreFuture<'_, Option<Ticket>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            // Prefer the lowest-numbered scheduled ticket, fall back to the
            // most recent resolved one.
            let row = sqlx::query(
                r"SELECT * FROM tickets
                  WHERE doctor_id = $1 AND queue_date = $2 AND holder = $3
                  ORDER BY (status = 'scheduled') DESC,
                           CASE WHEN status = 'scheduled' THEN number ELSE -number END ASC
                  LIMIT 1",
            )
            .bind(key.doctor.as_uuid())
            .bind(key.date)
            .bind(holder.as_uuid())
            .fetch_optional(&pool)
            .await
            .map_err(storage_err)?;
            row.as_ref().map(ticket_from_row).transpose()
        })
    }

    fn close_ticket(
        &self,
        id: TicketId,
        status: TicketStatus,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, bool> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let result = sqlx::query(
                r"UPDATE tickets SET status = $2, resolved_at = $3
                  WHERE id = $1 AND status = 'scheduled'",
            )
            .bind(id.as_uuid())
            .bind(status_to_str(status))
            .bind(now)
            .execute(&pool)
            .await
            .map_err(storage_err)?;

            if result.rows_affected() == 1 {
                return Ok(true);
            }

            // Distinguish "already terminal" from "no such ticket".
            let exists = sqlx::query(r"SELECT 1 AS one FROM tickets WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&pool)
                .await
                .map_err(storage_err)?
                .is_some();
            if exists {
                Ok(false)
            } else {
                Err(QueueError::not_found("ticket", id))
            }
        })
    }

    #[allow(clippy::cast_possible_wrap)]
    fn set_current_number(&self, key: QueueKey, expected: u32, new: u32) -> StoreFuture<'_, bool> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let result = sqlx::query(
                r"UPDATE queues SET current_number = $4
                  WHERE doctor_id = $1 AND queue_date = $2 AND current_number = $3",
            )
            .bind(key.doctor.as_uuid())
            .bind(key.date)
            .bind(expected as i32)
            .bind(new as i32)
            .execute(&pool)
            .await
            .map_err(storage_err)?;

            if result.rows_affected() == 1 {
                return Ok(true);
            }

            let exists = sqlx::query(
                r"SELECT 1 AS one FROM queues WHERE doctor_id = $1 AND queue_date = $2",
            )
            .bind(key.doctor.as_uuid())
            .bind(key.date)
            .fetch_optional(&pool)
            .await
            .map_err(storage_err)?
            .is_some();
            if exists {
                Ok(false)
            } else {
                Err(QueueError::not_found("queue", key))
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_round_trip() {
        for status in [
            TicketStatus::Scheduled,
            TicketStatus::Completed,
            TicketStatus::Cancelled,
            TicketStatus::Missed,
        ] {
            assert_eq!(status_from_str(status_to_str(status)).unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_is_a_storage_error() {
        assert!(matches!(
            status_from_str("vanished"),
            Err(QueueError::Storage(_))
        ));
    }
}
