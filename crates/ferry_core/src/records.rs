//! Canonical source records.
//!
//! Every reader normalizes its input into these shapes before the pipeline
//! sees it. Ids are kept as strings because sources disagree on whether they
//! are numbers.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use ferry_db::EntityKind;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceGroup {
    pub source_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUser {
    pub source_id: String,
    pub username: String,
    pub email: Option<String>,
    pub name: Option<String>,
    /// Raw timestamp, parsed at import time so a bad value only skips this user.
    pub created_at: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub last_seen: Option<String>,
    /// Source ids of groups the user belongs to; memberships are added after
    /// the user is created.
    pub group_ids: Vec<String>,
}

impl SourceUser {
    pub fn new(source_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            username: username.into(),
            email: None,
            name: None,
            created_at: None,
            bio: None,
            location: None,
            last_seen: None,
            group_ids: Vec::new(),
        }
    }
}

/// How a record points at its author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorRef {
    /// Source user id, resolved through the identity map.
    SourceId(String),
    /// Email address, resolved against the target's users.
    Email(String),
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCategory {
    pub source_id: String,
    pub name: String,
    pub description: Option<String>,
    pub parent_source_id: Option<String>,
    pub owner: AuthorRef,
}

/// Markup dialect of a post body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Markup {
    /// Pseudo-XML/BBCode dialect, run through the transcoder.
    Legacy,
    /// Already in the target dialect.
    Markdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadRef {
    /// The post opens a new topic.
    Opens {
        title: String,
        category_source_id: Option<String>,
        /// The source's own thread id, when it has one distinct from the post.
        topic_source_id: Option<String>,
    },
    /// The post replies in the thread started by `first_post_source_id`.
    Replies { first_post_source_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePost {
    pub source_id: String,
    pub author: AuthorRef,
    pub raw: String,
    pub markup: Markup,
    pub created_at: Option<String>,
    pub thread: ThreadRef,
}

impl SourcePost {
    pub fn opens_topic(&self) -> bool {
        matches!(self.thread, ThreadRef::Opens { .. })
    }
}

/// External login linked to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceAccount {
    pub user_source_id: String,
    pub provider: String,
    pub provider_uid: String,
}

/// Parse a source timestamp as UTC.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` and bare dates.
pub fn parse_timestamp(
    kind: EntityKind,
    source_id: &str,
    field: &str,
    value: &str,
) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Ok(parsed.and_utc());
    }
    if let Some(midnight) = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Ok(midnight.and_utc());
    }
    Err(CoreError::invalid_field(
        kind,
        source_id,
        field,
        format!("unrecognized timestamp '{value}'"),
    ))
}

/// Parse an optional timestamp, defaulting to now when absent or blank.
pub fn timestamp_or_now(
    kind: EntityKind,
    source_id: &str,
    field: &str,
    value: Option<&str>,
) -> Result<DateTime<Utc>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(value) => parse_timestamp(kind, source_id, field, value),
        None => Ok(Utc::now()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_timestamp_formats() {
        let rfc = parse_timestamp(EntityKind::User, "1", "created_at", "2019-04-01T12:30:00+02:00")
            .unwrap();
        assert_eq!(rfc.hour(), 10);

        let sql = parse_timestamp(EntityKind::User, "1", "created_at", "2019-04-01 12:30:00")
            .unwrap();
        assert_eq!((sql.day(), sql.hour(), sql.minute()), (1, 12, 30));

        let date = parse_timestamp(EntityKind::User, "1", "created_at", " 2019-04-01 ").unwrap();
        assert_eq!(date.hour(), 0);
    }

    #[test]
    fn test_bad_timestamp_is_record_level() {
        let err = parse_timestamp(EntityKind::Post, "9", "PostedOn", "yesterday").unwrap_err();
        assert!(err.is_record_level());
        assert!(matches!(err, CoreError::InvalidField { ref field, .. } if field == "PostedOn"));
    }

    #[test]
    fn test_blank_timestamp_defaults() {
        assert!(timestamp_or_now(EntityKind::User, "1", "created_at", Some("  ")).is_ok());
        assert!(timestamp_or_now(EntityKind::User, "1", "created_at", None).is_ok());
    }
}
