//! Chat transcript repository
//!
//! A transcript lives in the hash `chat:{id}`; each user has a sorted set
//! `user:chat:{user_id}` of `chat:{id}` members scored by creation time.

use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{DbPool, KvRepo};
use crate::{Error, Result};

const ID_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const ID_LEN: usize = 7;
const TITLE_MAX_CHARS: usize = 100;

/// Generate a 7-character alphanumeric chat id
#[must_use]
pub fn new_chat_id() -> String {
    let mut rng = rand::thread_rng();
    (0..ID_LEN)
        .map(|_| char::from(ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())]))
        .collect()
}

/// Hash key for a chat transcript
#[must_use]
pub fn chat_key(id: &str) -> String {
    format!("chat:{id}")
}

/// Sorted-set key for a user's chat index
#[must_use]
pub fn user_index_key(user_id: &str) -> String {
    format!("user:chat:{user_id}")
}

/// A single message in a transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: None,
            role: role.into(),
            content: content.into(),
        }
    }
}

/// A stored chat transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    pub title: String,
    pub user_id: String,
    /// Unix epoch milliseconds
    pub created_at: i64,
    pub path: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_path: Option<String>,
}

impl Chat {
    /// Build a new transcript; the title is the first message, truncated
    #[must_use]
    pub fn new(id: String, user_id: String, messages: Vec<ChatMessage>, created_at: i64) -> Self {
        let title = messages
            .first()
            .map(|m| m.content.chars().take(TITLE_MAX_CHARS).collect())
            .unwrap_or_default();
        let path = format!("/chat/{id}");

        Self {
            id,
            title,
            user_id,
            created_at,
            path,
            messages,
            share_path: None,
        }
    }

    /// Public share path for this chat
    #[must_use]
    pub fn share_path_for(id: &str) -> String {
        format!("/share/{id}")
    }

    fn to_fields(&self) -> Result<Vec<(&'static str, String)>> {
        let mut fields = vec![
            ("id", self.id.clone()),
            ("title", self.title.clone()),
            ("userId", self.user_id.clone()),
            ("createdAt", self.created_at.to_string()),
            ("path", self.path.clone()),
            ("messages", serde_json::to_string(&self.messages)?),
        ];
        if let Some(share_path) = &self.share_path {
            fields.push(("sharePath", share_path.clone()));
        }
        Ok(fields)
    }

    fn from_fields(mut fields: HashMap<String, String>) -> Result<Self> {
        let mut take = |name: &str| {
            fields
                .remove(name)
                .ok_or_else(|| Error::Database(format!("chat record missing field '{name}'")))
        };

        let id = take("id")?;
        let title = take("title")?;
        let user_id = take("userId")?;
        let created_at = take("createdAt")?
            .parse()
            .map_err(|e| Error::Database(format!("invalid createdAt: {e}")))?;
        let path = take("path")?;
        let messages = serde_json::from_str(&take("messages")?)?;
        let share_path = take("sharePath").ok();

        Ok(Self {
            id,
            title,
            user_id,
            created_at,
            path,
            messages,
            share_path,
        })
    }
}

/// Chat transcript repository
#[derive(Clone)]
pub struct ChatRepo {
    kv: KvRepo,
}

impl ChatRepo {
    /// Create a new chat repository
    #[must_use]
    pub fn new(pool: DbPool) -> Self {
        Self {
            kv: KvRepo::new(pool),
        }
    }

    /// All chats for a user, most recent first
    ///
    /// Store failures are logged and yield an empty list.
    #[must_use]
    pub fn get_chats(&self, user_id: Option<&str>) -> Vec<Chat> {
        let Some(user_id) = user_id.filter(|u| !u.is_empty()) else {
            return Vec::new();
        };

        match self.load_index(user_id) {
            Ok(chats) => chats,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "failed to load chat list");
                Vec::new()
            }
        }
    }

    fn load_index(&self, user_id: &str) -> Result<Vec<Chat>> {
        let keys = self.kv.zrange(&user_index_key(user_id), true)?;
        let mut chats = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(fields) = self.kv.hget_all(&key)? else {
                continue;
            };
            let chat = Chat::from_fields(fields)?;
            if chat.user_id != user_id {
                tracing::warn!(user_id, chat_id = %chat.id, owner = %chat.user_id, "skipping indexed chat owned by another user");
                continue;
            }
            chats.push(chat);
        }
        Ok(chats)
    }

    /// Stored owner of a chat, if the chat exists
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn owner(&self, id: &str) -> Result<Option<String>> {
        self.kv.hget(&chat_key(id), "userId")
    }

    /// Fetch a chat; `None` when missing or owned by a different user
    ///
    /// An empty `user_id` skips the ownership check.
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn get_chat(&self, id: &str, user_id: &str) -> Result<Option<Chat>> {
        let Some(fields) = self.kv.hget_all(&chat_key(id))? else {
            return Ok(None);
        };
        let chat = Chat::from_fields(fields)?;

        if !user_id.is_empty() && chat.user_id != user_id {
            return Ok(None);
        }

        Ok(Some(chat))
    }

    /// Store a chat and index it under its owner
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` if the id is taken by another user's chat, or
    /// an error if the database operation fails
    #[allow(clippy::cast_precision_loss)]
    pub fn save_chat(&self, chat: &Chat) -> Result<()> {
        if let Some(owner) = self.owner(&chat.id)? {
            if owner != chat.user_id {
                return Err(Error::Unauthorized("chat belongs to another user".to_string()));
            }
        }

        let key = chat_key(&chat.id);
        let fields = chat.to_fields()?;
        self.kv.hset_all(&key, fields.as_slice())?;
        self.kv
            .zadd(&user_index_key(&chat.user_id), chat.created_at as f64, &key)?;

        tracing::debug!(chat_id = %chat.id, user_id = %chat.user_id, "chat saved");
        Ok(())
    }

    /// Remove a chat and its index membership
    ///
    /// Removing a chat that no longer exists succeeds.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` if the chat belongs to another user
    pub fn remove_chat(&self, id: &str, user_id: &str) -> Result<()> {
        let key = chat_key(id);

        if let Some(owner) = self.owner(id)? {
            if owner != user_id {
                return Err(Error::Unauthorized("chat belongs to another user".to_string()));
            }
        }

        self.kv.del(&key)?;
        self.kv.zrem(&user_index_key(user_id), &key)?;

        tracing::debug!(chat_id = id, user_id, "chat removed");
        Ok(())
    }

    /// Remove every chat in a user's index; returns how many were indexed
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn clear_chats(&self, user_id: &str) -> Result<usize> {
        let index = user_index_key(user_id);
        let keys = self.kv.zrange(&index, false)?;

        for key in &keys {
            match self.kv.hget(key, "userId")? {
                Some(owner) if owner != user_id => {
                    tracing::warn!(user_id, key = %key, owner = %owner, "dropping index entry for chat owned by another user");
                }
                _ => {
                    self.kv.del(key)?;
                }
            }
            self.kv.zrem(&index, key)?;
        }

        tracing::info!(user_id, count = keys.len(), "cleared chats");
        Ok(keys.len())
    }

    /// Fetch a chat only if it has been shared
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn get_shared_chat(&self, id: &str) -> Result<Option<Chat>> {
        let chat = self.get_chat(id, "")?;
        Ok(chat.filter(|c| c.share_path.is_some()))
    }

    /// Mark a chat as shared and return it
    ///
    /// Sharing is idempotent: the share path depends only on the chat id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the chat is missing or owned by another user
    pub fn share_chat(&self, id: &str, user_id: &str) -> Result<Chat> {
        let chat = if user_id.is_empty() {
            None
        } else {
            self.get_chat(id, user_id)?
        };
        let Some(mut chat) = chat else {
            return Err(Error::NotFound("Something went wrong".to_string()));
        };

        let share_path = Chat::share_path_for(&chat.id);
        self.kv
            .hset_all(&chat_key(&chat.id), &[("sharePath", share_path.as_str())])?;
        chat.share_path = Some(share_path);

        Ok(chat)
    }
}
