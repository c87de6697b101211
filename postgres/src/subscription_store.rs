//! `PostgreSQL` push subscription store.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE push_subscriptions (
//!     endpoint   TEXT        PRIMARY KEY,
//!     account    UUID        NOT NULL,
//!     p256dh     TEXT        NOT NULL,
//!     auth       TEXT        NOT NULL,
//!     is_active  BOOLEAN     NOT NULL DEFAULT TRUE,
//!     created_at TIMESTAMPTZ NOT NULL,
//!     last_used  TIMESTAMPTZ
//! );
//! CREATE INDEX idx_push_subscriptions_account
//!     ON push_subscriptions (account, is_active);
//! ```

use chrono::{DateTime, Utc};
use cliniq_core::AccountId;
use cliniq_push::error::PushError;
use cliniq_push::subscription::{
    Subscription, SubscriptionFuture, SubscriptionKeys, SubscriptionStore,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

fn storage_err(e: sqlx::Error) -> PushError {
    PushError::Storage(e.to_string())
}

fn subscription_from_row(row: &PgRow) -> Result<Subscription, PushError> {
    let account: Uuid = row.try_get("account").map_err(storage_err)?;
    Ok(Subscription {
        endpoint: row.try_get("endpoint").map_err(storage_err)?,
        account: AccountId::from_uuid(account),
        keys: SubscriptionKeys {
            p256dh: row.try_get("p256dh").map_err(storage_err)?,
            auth: row.try_get("auth").map_err(storage_err)?,
        },
        is_active: row.try_get("is_active").map_err(storage_err)?,
        created_at: row.try_get("created_at").map_err(storage_err)?,
        last_used: row.try_get("last_used").map_err(storage_err)?,
    })
}

/// PostgreSQL-backed implementation of [`SubscriptionStore`].
#[derive(Clone)]
pub struct PostgresSubscriptionStore {
    pool: PgPool,
}

impl PostgresSubscriptionStore {
    /// Create a subscription store over an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the subscription table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Storage`] if the DDL fails.
    pub async fn ensure_schema(&self) -> Result<(), PushError> {
        sqlx::query(
            r"CREATE TABLE IF NOT EXISTS push_subscriptions (
                endpoint   TEXT        PRIMARY KEY,
                account    UUID        NOT NULL,
                p256dh     TEXT        NOT NULL,
                auth       TEXT        NOT NULL,
                is_active  BOOLEAN     NOT NULL DEFAULT TRUE,
                created_at TIMESTAMPTZ NOT NULL,
                last_used  TIMESTAMPTZ
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            r"CREATE INDEX IF NOT EXISTS idx_push_subscriptions_account
              ON push_subscriptions (account, is_active)",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        debug!("push subscription schema ensured");
        Ok(())
    }
}

impl SubscriptionStore for PostgresSubscriptionStore {
    fn register(&self, subscription: Subscription) -> SubscriptionFuture<'_, ()> {
        let pool = self.pool.clone();
        Box::pin(async move {
            // Endpoints are globally unique; a re-registration reactivates
            // the endpoint and adopts the registering account.
            sqlx::query(
                r"INSERT INTO push_subscriptions
                  (endpoint, account, p256dh, auth, is_active, created_at, last_used)
                  VALUES ($1, $2, $3, $4, TRUE, $5, NULL)
                  ON CONFLICT (endpoint) DO UPDATE SET
                      account = EXCLUDED.account,
                      p256dh = EXCLUDED.p256dh,
                      auth = EXCLUDED.auth,
                      is_active = TRUE",
            )
            .bind(&subscription.endpoint)
            .bind(subscription.account.as_uuid())
            .bind(&subscription.keys.p256dh)
            .bind(&subscription.keys.auth)
            .bind(subscription.created_at)
            .execute(&pool)
            .await
            .map_err(storage_err)?;
            Ok(())
        })
    }

    fn deactivate(&self, endpoint: &str) -> SubscriptionFuture<'_, bool> {
        let pool = self.pool.clone();
        let endpoint = endpoint.to_string();
        Box::pin(async move {
            let result = sqlx::query(
                r"UPDATE push_subscriptions SET is_active = FALSE WHERE endpoint = $1",
            )
            .bind(&endpoint)
            .execute(&pool)
            .await
            .map_err(storage_err)?;
            Ok(result.rows_affected() == 1)
        })
    }

    fn active_for_account(&self, account: AccountId) -> SubscriptionFuture<'_, Vec<Subscription>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let rows = sqlx::query(
                r"SELECT * FROM push_subscriptions
                  WHERE account = $1 AND is_active
                  ORDER BY endpoint",
            )
            .bind(account.as_uuid())
            .fetch_all(&pool)
            .await
            .map_err(storage_err)?;
            rows.iter().map(subscription_from_row).collect()
        })
    }

    fn mark_delivered(&self, endpoint: &str, at: DateTime<Utc>) -> SubscriptionFuture<'_, ()> {
        let pool = self.pool.clone();
        let endpoint = endpoint.to_string();
        Box::pin(async move {
            sqlx::query(r"UPDATE push_subscriptions SET last_used = $2 WHERE endpoint = $1")
                .bind(&endpoint)
                .bind(at)
                .execute(&pool)
                .await
                .map_err(storage_err)?;
            Ok(())
        })
    }
}
