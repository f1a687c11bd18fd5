//! Database models.
//!
//! These structs map directly to database tables via sqlx.

mod forum;
mod mapping;

pub use forum::{
    ForumCategory, ForumPost, ForumTopic, ForumUser, NewForumCategory, NewForumPost,
    NewForumTopic, NewForumUser,
};
pub use mapping::{EntityKind, ImportMapping, MappingWrite, PostPlacement};
