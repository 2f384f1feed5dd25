//! Key-value primitives (hashes and sorted sets) on top of `SQLite`
//!
//! Mirrors the small subset of Redis-style commands the chat store needs:
//! `HSET`/`HGET`/`HGETALL`/`DEL` and `ZADD`/`ZREM`/`ZRANGE`.

use std::collections::HashMap;

use rusqlite::{OptionalExtension, params};

use super::DbPool;
use crate::Result;

/// Key-value repository
#[derive(Clone)]
pub struct KvRepo {
    pool: DbPool,
}

impl KvRepo {
    /// Create a new key-value repository
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Set several hash fields at once (`HSET key f1 v1 f2 v2 ...`)
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn hset_all<K, V>(&self, key: &str, fields: &[(K, V)]) -> Result<()>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut conn = super::conn(&self.pool)?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO kv_hashes (key, field, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key, field) DO UPDATE SET value = excluded.value",
            )?;
            for (field, value) in fields {
                stmt.execute(params![key, field.as_ref(), value.as_ref()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Read one hash field (`HGET`)
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let conn = super::conn(&self.pool)?;
        let value = conn
            .query_row(
                "SELECT value FROM kv_hashes WHERE key = ?1 AND field = ?2",
                params![key, field],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Read a whole hash (`HGETALL`); `None` when the key does not exist
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn hget_all(&self, key: &str) -> Result<Option<HashMap<String, String>>> {
        let conn = super::conn(&self.pool)?;
        let mut stmt = conn.prepare("SELECT field, value FROM kv_hashes WHERE key = ?1")?;
        let fields = stmt
            .query_map([key], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<std::result::Result<HashMap<_, _>, _>>()?;

        Ok(if fields.is_empty() { None } else { Some(fields) })
    }

    /// Delete a key of any type (`DEL`); returns whether anything was removed
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn del(&self, key: &str) -> Result<bool> {
        let conn = super::conn(&self.pool)?;
        let hashes = conn.execute("DELETE FROM kv_hashes WHERE key = ?1", [key])?;
        let sets = conn.execute("DELETE FROM kv_sorted_sets WHERE key = ?1", [key])?;
        Ok(hashes + sets > 0)
    }

    /// Add or re-score a sorted set member (`ZADD`)
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn zadd(&self, key: &str, score: f64, member: &str) -> Result<()> {
        let conn = super::conn(&self.pool)?;
        conn.execute(
            "INSERT INTO kv_sorted_sets (key, member, score) VALUES (?1, ?2, ?3)
             ON CONFLICT(key, member) DO UPDATE SET score = excluded.score",
            params![key, member, score],
        )?;
        Ok(())
    }

    /// Remove a sorted set member (`ZREM`); returns whether it was present
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn zrem(&self, key: &str, member: &str) -> Result<bool> {
        let conn = super::conn(&self.pool)?;
        let removed = conn.execute(
            "DELETE FROM kv_sorted_sets WHERE key = ?1 AND member = ?2",
            params![key, member],
        )?;
        Ok(removed > 0)
    }

    /// All members of a sorted set by score (`ZRANGE key 0 -1 [REV]`)
    ///
    /// Ties are broken by member, matching Redis' lexicographic tiebreak.
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn zrange(&self, key: &str, rev: bool) -> Result<Vec<String>> {
        let conn = super::conn(&self.pool)?;
        let sql = if rev {
            "SELECT member FROM kv_sorted_sets WHERE key = ?1 ORDER BY score DESC, member DESC"
        } else {
            "SELECT member FROM kv_sorted_sets WHERE key = ?1 ORDER BY score ASC, member ASC"
        };
        let mut stmt = conn.prepare(sql)?;
        let members = stmt
            .query_map([key], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(members)
    }
}
