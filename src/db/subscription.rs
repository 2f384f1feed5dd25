//! Subscription repository: local mirror of provider subscriptions

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};
use serde::Serialize;
use uuid::Uuid;

use super::{DbPool, parse_optional_datetime};
use crate::{Error, Result};

/// A user's subscription
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    pub lemon_squeezy_id: String,
    pub order_id: i64,
    pub name: String,
    pub email: String,
    pub status: String,
    pub status_formatted: String,
    pub renews_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub price: String,
    pub is_usage_based: bool,
    pub is_paused: bool,
    pub subscription_item_id: Option<i64>,
    pub user_id: String,
    pub plan_id: String,
}

/// Partial update applied after a provider call; `None` leaves a column as is
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionUpdate {
    pub status: Option<String>,
    pub status_formatted: Option<String>,
    pub ends_at: Option<DateTime<Utc>>,
    pub is_paused: Option<bool>,
    pub plan_id: Option<String>,
    pub price: Option<String>,
}

const SUBSCRIPTION_COLUMNS: &str = "id, lemon_squeezy_id, order_id, name, email, status, \
     status_formatted, renews_at, ends_at, trial_ends_at, price, is_usage_based, is_paused, \
     subscription_item_id, user_id, plan_id";

fn subscription_from_row(row: &Row<'_>) -> rusqlite::Result<Subscription> {
    Ok(Subscription {
        id: row.get(0)?,
        lemon_squeezy_id: row.get(1)?,
        order_id: row.get(2)?,
        name: row.get(3)?,
        email: row.get(4)?,
        status: row.get(5)?,
        status_formatted: row.get(6)?,
        renews_at: parse_optional_datetime(row.get(7)?),
        ends_at: parse_optional_datetime(row.get(8)?),
        trial_ends_at: parse_optional_datetime(row.get(9)?),
        price: row.get(10)?,
        is_usage_based: row.get(11)?,
        is_paused: row.get(12)?,
        subscription_item_id: row.get(13)?,
        user_id: row.get(14)?,
        plan_id: row.get(15)?,
    })
}

/// Subscription repository
#[derive(Clone)]
pub struct SubscriptionRepo {
    pool: DbPool,
}

impl SubscriptionRepo {
    /// Create a new subscription repository
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// All subscriptions owned by a user, oldest first
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn list_for_user(&self, user_id: &str) -> Result<Vec<Subscription>> {
        let conn = super::conn(&self.pool)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE user_id = ?1 ORDER BY rowid ASC"
        ))?;
        let subs = stmt
            .query_map([user_id], subscription_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(subs)
    }

    /// The user's first subscription, if any
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn first_for_user(&self, user_id: &str) -> Result<Option<Subscription>> {
        let conn = super::conn(&self.pool)?;
        let sub = conn
            .query_row(
                &format!(
                    "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE user_id = ?1 \
                     ORDER BY rowid ASC LIMIT 1"
                ),
                [user_id],
                subscription_from_row,
            )
            .optional()?;
        Ok(sub)
    }

    /// Find by provider subscription id
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn find_by_lemon_squeezy_id(&self, lemon_squeezy_id: &str) -> Result<Option<Subscription>> {
        let conn = super::conn(&self.pool)?;
        let sub = conn
            .query_row(
                &format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE lemon_squeezy_id = ?1"),
                [lemon_squeezy_id],
                subscription_from_row,
            )
            .optional()?;
        Ok(sub)
    }

    /// Insert or replace a subscription keyed by provider id
    ///
    /// The local id of an existing row is kept; `sub.id` is used only for
    /// new rows (a fresh uuid when empty).
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn upsert(&self, sub: &Subscription) -> Result<Subscription> {
        let conn = super::conn(&self.pool)?;
        let id = if sub.id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            sub.id.clone()
        };
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO subscriptions (id, lemon_squeezy_id, order_id, name, email, status,
                 status_formatted, renews_at, ends_at, trial_ends_at, price, is_usage_based,
                 is_paused, subscription_item_id, user_id, plan_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?17)
             ON CONFLICT(lemon_squeezy_id) DO UPDATE SET
                 order_id = excluded.order_id,
                 name = excluded.name,
                 email = excluded.email,
                 status = excluded.status,
                 status_formatted = excluded.status_formatted,
                 renews_at = excluded.renews_at,
                 ends_at = excluded.ends_at,
                 trial_ends_at = excluded.trial_ends_at,
                 price = excluded.price,
                 is_usage_based = excluded.is_usage_based,
                 is_paused = excluded.is_paused,
                 subscription_item_id = excluded.subscription_item_id,
                 user_id = excluded.user_id,
                 plan_id = excluded.plan_id,
                 updated_at = excluded.updated_at",
            params![
                id,
                sub.lemon_squeezy_id,
                sub.order_id,
                sub.name,
                sub.email,
                sub.status,
                sub.status_formatted,
                sub.renews_at.map(|d| d.to_rfc3339()),
                sub.ends_at.map(|d| d.to_rfc3339()),
                sub.trial_ends_at.map(|d| d.to_rfc3339()),
                sub.price,
                sub.is_usage_based,
                sub.is_paused,
                sub.subscription_item_id,
                sub.user_id,
                sub.plan_id,
                now,
            ],
        )?;

        let stored = conn.query_row(
            &format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE lemon_squeezy_id = ?1"),
            [&sub.lemon_squeezy_id],
            subscription_from_row,
        )?;
        Ok(stored)
    }

    /// Apply a partial update by provider id
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no subscription has that provider id
    pub fn apply_update(&self, lemon_squeezy_id: &str, update: &SubscriptionUpdate) -> Result<()> {
        let conn = super::conn(&self.pool)?;
        let changed = conn.execute(
            "UPDATE subscriptions SET
                 status = COALESCE(?1, status),
                 status_formatted = COALESCE(?2, status_formatted),
                 ends_at = COALESCE(?3, ends_at),
                 is_paused = COALESCE(?4, is_paused),
                 plan_id = COALESCE(?5, plan_id),
                 price = COALESCE(?6, price),
                 updated_at = ?7
             WHERE lemon_squeezy_id = ?8",
            params![
                update.status,
                update.status_formatted,
                update.ends_at.map(|d| d.to_rfc3339()),
                update.is_paused,
                update.plan_id,
                update.price,
                Utc::now().to_rfc3339(),
                lemon_squeezy_id,
            ],
        )?;

        if changed == 0 {
            return Err(Error::NotFound(format!(
                "Subscription #{lemon_squeezy_id} not found."
            )));
        }
        Ok(())
    }
}
