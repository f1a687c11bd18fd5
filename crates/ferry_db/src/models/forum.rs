//! Reference forum models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A forum user.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ForumUser {
    pub id: i64,

    /// Unique (case-insensitive) login name
    pub username: String,

    /// Display name
    pub name: Option<String>,

    /// Unique (case-insensitive) email, if known
    pub email: Option<String>,

    pub bio: Option<String>,
    pub location: Option<String>,

    /// Whether this is the fallback identity used for lost attribution
    pub is_placeholder: bool,

    pub created_at: DateTime<Utc>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

/// Fields for inserting a user.
#[derive(Debug, Clone)]
pub struct NewForumUser {
    pub username: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub is_placeholder: bool,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

/// A forum category.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ForumCategory {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<i64>,
    /// Owning user
    pub user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Fields for inserting a category.
#[derive(Debug, Clone)]
pub struct NewForumCategory {
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<i64>,
    pub user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// A topic (thread).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ForumTopic {
    pub id: i64,
    pub title: String,
    pub category_id: Option<i64>,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Fields for opening a topic.
#[derive(Debug, Clone)]
pub struct NewForumTopic {
    pub title: String,
    pub category_id: Option<i64>,
}

/// A post inside a topic.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ForumPost {
    pub id: i64,
    pub topic_id: i64,

    /// 1-based position inside the topic; the opening post is number 1
    pub post_number: i64,

    pub user_id: i64,

    /// Markdown body
    pub raw: String,

    pub reply_to_post_number: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Fields for inserting a post.
#[derive(Debug, Clone)]
pub struct NewForumPost {
    pub user_id: i64,
    pub raw: String,
    pub reply_to_post_number: Option<i64>,
    pub created_at: DateTime<Utc>,
}
