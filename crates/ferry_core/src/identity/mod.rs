//! Identity map
//!
//! Durable `(kind, source id) -> target id` associations for one import
//! namespace. This is the only state shared between stages and runs; every
//! other buffer in the pipeline is thrown away after its batch.

mod sqlite;

use std::collections::{HashMap, HashSet};
use std::fmt;

use async_trait::async_trait;
use ferry_db::{EntityKind, PostPlacement};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use sqlite::SqliteIdentityMap;

/// Where replies to a thread go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicThread {
    pub topic_id: i64,
    /// Post number of the post the lookup started from.
    pub first_post_number: i64,
    /// One past the highest post number recorded in the topic.
    pub next_post_number: i64,
}

/// Trait for identity map operations
///
/// A map is a function: each `(kind, source_id)` has at most one target id,
/// and each target id is claimed by at most one source id of its kind.
#[async_trait]
pub trait IdentityMap: Send + Sync + fmt::Debug {
    // ========== Writes ==========

    /// Associate a source id with a target id.
    ///
    /// Recording an identical pair again is a no-op. A conflicting pair fails
    /// with `CoreError::DuplicateMapping` and leaves the existing row alone.
    async fn record(&self, kind: EntityKind, source_id: &str, target_id: i64) -> Result<()>;

    /// Record an imported post with its placement.
    ///
    /// `topic_source_id` is the source's own thread id for an opening post
    /// whose thread has one; it is mapped to the topic in the same write.
    async fn record_post(
        &self,
        source_id: &str,
        post_id: i64,
        placement: PostPlacement,
        topic_source_id: Option<&str>,
    ) -> Result<()>;

    // ========== Lookups ==========

    /// Pure lookup of a target id.
    async fn resolve(&self, kind: EntityKind, source_id: &str) -> Result<Option<i64>>;

    /// Reverse lookup: which source id produced a target id.
    async fn source_of(&self, kind: EntityKind, target_id: i64) -> Result<Option<String>>;

    /// Which of `source_ids` are already mapped.
    async fn existing_batch(
        &self,
        kind: EntityKind,
        source_ids: &HashSet<String>,
    ) -> Result<HashSet<String>>;

    /// Placement of one imported post.
    async fn locate_post(&self, source_id: &str) -> Result<Option<PostPlacement>>;

    /// Placements of many imported posts. Unknown ids are absent from the map.
    async fn locate_posts(&self, source_ids: &[String]) -> Result<HashMap<String, PostPlacement>>;

    /// Resolve the thread a post belongs to.
    ///
    /// `None` means the post was never imported, which for a reply is a
    /// data-integrity problem rather than a miss.
    async fn resolve_thread(&self, first_post_source_id: &str) -> Result<Option<TopicThread>>;

    // ========== Inspection ==========

    /// Mapping counts per kind.
    async fn counts(&self) -> Result<Vec<(EntityKind, i64)>>;
}
