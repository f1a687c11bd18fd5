//! Identity map models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Kind of entity an identity mapping refers to.
///
/// Source ids are only unique within one kind, so the kind is part of every
/// mapping key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Group,
    User,
    Category,
    Topic,
    Post,
}

impl EntityKind {
    /// All kinds, in import dependency order.
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Group,
        EntityKind::User,
        EntityKind::Category,
        EntityKind::Topic,
        EntityKind::Post,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::User => "user",
            Self::Category => "category",
            Self::Topic => "topic",
            Self::Post => "post",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "group" | "groups" => Ok(Self::Group),
            "user" | "users" => Ok(Self::User),
            "category" | "categories" => Ok(Self::Category),
            "topic" | "topics" => Ok(Self::Topic),
            "post" | "posts" => Ok(Self::Post),
            other => Err(format!("unknown entity kind: {other}")),
        }
    }
}

/// One row of the identity map.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ImportMapping {
    /// Import namespace (one per source system / import prefix)
    pub namespace: String,

    pub kind: EntityKind,

    /// Identifier assigned by the legacy platform
    pub source_id: String,

    /// Identifier assigned by the target platform
    pub target_id: i64,

    /// When the mapping was recorded
    pub created_at: DateTime<Utc>,
}

/// Where an imported post lives in the target forum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct PostPlacement {
    pub topic_id: i64,
    pub post_number: i64,
}

/// Outcome of a compare-and-set mapping write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingWrite {
    /// The mapping was new and has been stored.
    Inserted,
    /// The exact same mapping already existed.
    Unchanged,
    /// The source id is already mapped to a different target id.
    SourceTaken { existing_target: i64 },
    /// The target id is already claimed by a different source id.
    TargetTaken { holder: String },
}
