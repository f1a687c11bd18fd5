//! Target platform
//!
//! The creation API the pipeline hands finished records to. Foreign keys in
//! these requests are already target ids; the identity map never leaks past
//! this boundary.

mod sqlite;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ferry_db::PostPlacement;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use sqlite::{suggest_username, SqliteForum};

/// Longest title the target accepts, in characters.
pub const MAX_TITLE_CHARS: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    /// Requested username; the target may adjust it to stay unique.
    pub username: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<i64>,
    pub user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostTarget {
    NewTopic {
        title: String,
        category_id: Option<i64>,
    },
    Reply {
        topic_id: i64,
        reply_to_post_number: Option<i64>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPost {
    pub user_id: i64,
    pub raw: String,
    pub created_at: DateTime<Utc>,
    pub target: PostTarget,
}

/// A persisted post and where it landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedPost {
    pub post_id: i64,
    pub topic_id: i64,
    pub post_number: i64,
}

impl CreatedPost {
    pub fn placement(&self) -> PostPlacement {
        PostPlacement {
            topic_id: self.topic_id,
            post_number: self.post_number,
        }
    }
}

/// Record-creation API of the destination forum.
///
/// Implementations report bad input as `CoreError::TargetValidation` (the
/// record is skipped) and outages as `CoreError::TargetUnavailable` (the run
/// stops).
#[async_trait]
pub trait TargetPlatform: Send + Sync + fmt::Debug {
    async fn create_group(&self, name: &str) -> Result<i64>;

    async fn create_user(&self, user: &NewUser) -> Result<i64>;

    async fn create_category(&self, category: &NewCategory) -> Result<i64>;

    async fn create_post(&self, post: &NewPost) -> Result<CreatedPost>;

    /// Returns false if the user was already a member.
    async fn add_group_member(&self, group_id: i64, user_id: i64) -> Result<bool>;

    /// Link an external login. Returns false if the account was already linked.
    async fn create_associated_account(
        &self,
        user_id: i64,
        provider: &str,
        provider_uid: &str,
    ) -> Result<bool>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<i64>>;

    /// Id of the user that unattributable content is assigned to, created on
    /// first use.
    async fn placeholder_user(&self) -> Result<i64>;
}
