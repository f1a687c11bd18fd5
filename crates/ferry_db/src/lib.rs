//! Ferry Database Layer
//!
//! SQLite storage backing a ferry import run.
//!
//! # Architecture
//!
//! - **Identity map tables** - `(namespace, kind, source id) -> target id`, the
//!   durable state that makes imports resumable
//! - **Post placements** - topic and post number for every imported post, used
//!   to thread replies and resolve cross-post mentions
//! - **Forum tables** - a reference target platform (groups, users, categories,
//!   topics, posts) that imports can be run against
//!
//! # Usage
//!
//! ```rust,ignore
//! use ferry_db::ForumDb;
//!
//! let db = ForumDb::open("path/to/ferry.db").await?;
//! ```

pub mod connection;
pub mod error;
pub mod models;
pub mod queries;

pub use connection::{DbStats, ForumDb};
pub use error::{DbError, DbResult};

pub use models::{
    EntityKind, ForumCategory, ForumPost, ForumTopic, ForumUser, ImportMapping, MappingWrite,
    NewForumCategory, NewForumPost, NewForumTopic, NewForumUser, PostPlacement,
};
