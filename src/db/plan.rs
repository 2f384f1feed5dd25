//! Plan repository: local mirror of the payments provider catalog

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};
use serde::Serialize;
use uuid::Uuid;

use super::{DbPool, parse_datetime};
use crate::Result;

/// A subscription plan (one provider variant)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: String,
    pub product_id: i64,
    pub product_name: Option<String>,
    pub variant_id: i64,
    pub name: String,
    pub description: Option<String>,
    /// Price in cents (decimal string for usage-based plans)
    pub price: String,
    pub is_usage_based: bool,
    pub interval: Option<String>,
    pub interval_count: Option<i64>,
    pub trial_interval: Option<String>,
    pub trial_interval_count: Option<i64>,
    pub sort: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Plan fields as synced from the provider (no local id yet)
#[derive(Debug, Clone, PartialEq)]
pub struct NewPlan {
    pub product_id: i64,
    pub product_name: Option<String>,
    pub variant_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: String,
    pub is_usage_based: bool,
    pub interval: Option<String>,
    pub interval_count: Option<i64>,
    pub trial_interval: Option<String>,
    pub trial_interval_count: Option<i64>,
    pub sort: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const PLAN_COLUMNS: &str = "id, product_id, product_name, variant_id, name, description, price, \
     is_usage_based, interval, interval_count, trial_interval, trial_interval_count, sort, \
     created_at, updated_at";

fn plan_from_row(row: &Row<'_>) -> rusqlite::Result<Plan> {
    Ok(Plan {
        id: row.get(0)?,
        product_id: row.get(1)?,
        product_name: row.get(2)?,
        variant_id: row.get(3)?,
        name: row.get(4)?,
        description: row.get(5)?,
        price: row.get(6)?,
        is_usage_based: row.get(7)?,
        interval: row.get(8)?,
        interval_count: row.get(9)?,
        trial_interval: row.get(10)?,
        trial_interval_count: row.get(11)?,
        sort: row.get(12)?,
        created_at: parse_datetime(&row.get::<_, String>(13)?),
        updated_at: parse_datetime(&row.get::<_, String>(14)?),
    })
}

/// Plan repository
#[derive(Clone)]
pub struct PlanRepo {
    pool: DbPool,
}

impl PlanRepo {
    /// Create a new plan repository
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// List all plans in display order
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn list(&self) -> Result<Vec<Plan>> {
        let conn = super::conn(&self.pool)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PLAN_COLUMNS} FROM plans ORDER BY sort IS NULL, sort ASC, variant_id ASC"
        ))?;
        let plans = stmt
            .query_map([], plan_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(plans)
    }

    /// Find a plan by local id
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn find(&self, id: &str) -> Result<Option<Plan>> {
        let conn = super::conn(&self.pool)?;
        let plan = conn
            .query_row(
                &format!("SELECT {PLAN_COLUMNS} FROM plans WHERE id = ?1"),
                [id],
                plan_from_row,
            )
            .optional()?;
        Ok(plan)
    }

    /// Find a plan by provider variant id
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn find_by_variant(&self, variant_id: i64) -> Result<Option<Plan>> {
        let conn = super::conn(&self.pool)?;
        let plan = conn
            .query_row(
                &format!("SELECT {PLAN_COLUMNS} FROM plans WHERE variant_id = ?1"),
                [variant_id],
                plan_from_row,
            )
            .optional()?;
        Ok(plan)
    }

    /// Insert or update a plan keyed by variant id
    ///
    /// The local id is kept stable across updates.
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn upsert(&self, plan: &NewPlan) -> Result<Plan> {
        let conn = super::conn(&self.pool)?;
        let new_id = Uuid::new_v4().to_string();

        conn.execute(
            "INSERT INTO plans (id, product_id, product_name, variant_id, name, description, price,
                 is_usage_based, interval, interval_count, trial_interval, trial_interval_count,
                 sort, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             ON CONFLICT(variant_id) DO UPDATE SET
                 product_id = excluded.product_id,
                 product_name = excluded.product_name,
                 name = excluded.name,
                 description = excluded.description,
                 price = excluded.price,
                 is_usage_based = excluded.is_usage_based,
                 interval = excluded.interval,
                 interval_count = excluded.interval_count,
                 trial_interval = excluded.trial_interval,
                 trial_interval_count = excluded.trial_interval_count,
                 sort = excluded.sort,
                 created_at = excluded.created_at,
                 updated_at = excluded.updated_at",
            params![
                new_id,
                plan.product_id,
                plan.product_name,
                plan.variant_id,
                plan.name,
                plan.description,
                plan.price,
                plan.is_usage_based,
                plan.interval,
                plan.interval_count,
                plan.trial_interval,
                plan.trial_interval_count,
                plan.sort,
                plan.created_at.to_rfc3339(),
                plan.updated_at.to_rfc3339(),
            ],
        )?;

        let stored = conn.query_row(
            &format!("SELECT {PLAN_COLUMNS} FROM plans WHERE variant_id = ?1"),
            [plan.variant_id],
            plan_from_row,
        )?;

        tracing::debug!(variant_id = plan.variant_id, plan_id = %stored.id, "plan upserted");
        Ok(stored)
    }
}
