//! Database schema and migrations

use rusqlite::Connection;

use crate::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Initialize the database schema
///
/// # Errors
///
/// Returns error if migration fails
pub fn init(conn: &Connection) -> Result<()> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .unwrap_or(0);

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        -- Hash values: one row per (key, field)
        CREATE TABLE IF NOT EXISTS kv_hashes (
            key TEXT NOT NULL,
            field TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (key, field)
        );

        -- Sorted sets: one row per (key, member)
        CREATE TABLE IF NOT EXISTS kv_sorted_sets (
            key TEXT NOT NULL,
            member TEXT NOT NULL,
            score REAL NOT NULL,
            PRIMARY KEY (key, member)
        );

        CREATE INDEX IF NOT EXISTS idx_kv_sorted_sets_score ON kv_sorted_sets(key, score);

        PRAGMA user_version = 1;
        ",
    )?;

    tracing::info!("migrated to schema v1");
    Ok(())
}

fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        -- Plans mirrored from the payments provider catalog
        CREATE TABLE IF NOT EXISTS plans (
            id TEXT PRIMARY KEY,
            product_id INTEGER NOT NULL,
            product_name TEXT,
            variant_id INTEGER NOT NULL UNIQUE,
            name TEXT NOT NULL,
            description TEXT,
            price TEXT NOT NULL,
            is_usage_based INTEGER NOT NULL DEFAULT 0,
            interval TEXT,
            interval_count INTEGER,
            trial_interval TEXT,
            trial_interval_count INTEGER,
            sort INTEGER,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Subscriptions mirrored from the payments provider
        CREATE TABLE IF NOT EXISTS subscriptions (
            id TEXT PRIMARY KEY,
            lemon_squeezy_id TEXT NOT NULL UNIQUE,
            order_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            status TEXT NOT NULL,
            status_formatted TEXT NOT NULL,
            renews_at TEXT,
            ends_at TEXT,
            trial_ends_at TEXT,
            price TEXT NOT NULL,
            is_usage_based INTEGER NOT NULL DEFAULT 0,
            is_paused INTEGER NOT NULL DEFAULT 0,
            subscription_item_id INTEGER,
            user_id TEXT NOT NULL,
            plan_id TEXT NOT NULL REFERENCES plans(id),
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_subscriptions_user ON subscriptions(user_id);
        CREATE INDEX IF NOT EXISTS idx_subscriptions_plan ON subscriptions(plan_id);

        PRAGMA user_version = 2;
        ",
    )?;

    tracing::info!("migrated to schema v2");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init(&conn).unwrap();
        init(&conn).unwrap();

        let version: i32 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }
}
