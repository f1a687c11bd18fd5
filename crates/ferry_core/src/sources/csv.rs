//! CSV exports: users, emails, categories, topics and SSO records.
//!
//! Topic rows carry both opening posts (`type = Discussion`) and replies
//! (`type = Post`, with `PostedIn` naming the opening post). Bodies are
//! already markdown. Categories and posts point at their author by email.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{info, warn};

use super::{ImportSources, VecSource};
use crate::config::SourcesConfig;
use crate::error::{CoreError, Result};
use crate::records::{
    AuthorRef, Markup, SourceAccount, SourceCategory, SourcePost, SourceUser, ThreadRef,
};

/// Provider name recorded for SSO rows.
pub const SSO_PROVIDER: &str = "oidc";

#[derive(Debug, Deserialize)]
struct UserRow {
    id: Option<String>,
    name: String,
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmailRow {
    user_id: String,
    email: String,
}

#[derive(Debug, Deserialize)]
struct CategoryRow {
    id: String,
    name: String,
    description: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TopicRow {
    id: String,
    #[serde(rename = "type")]
    row_type: String,
    title: Option<String>,
    #[serde(default)]
    raw: String,
    #[serde(rename = "PostedOn")]
    posted_on: Option<String>,
    #[serde(rename = "PostedIn")]
    posted_in: Option<String>,
    email: Option<String>,
    category_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SsoRow {
    user_id: String,
    external_id: String,
}

/// Paths of the CSV files; any of them may be absent.
#[derive(Debug, Clone, Default)]
pub struct CsvFiles {
    pub users: Option<PathBuf>,
    pub emails: Option<PathBuf>,
    pub categories: Option<PathBuf>,
    pub topics: Option<PathBuf>,
    pub sso: Option<PathBuf>,
}

impl From<&SourcesConfig> for CsvFiles {
    fn from(config: &SourcesConfig) -> Self {
        Self {
            users: config.csv_users.clone(),
            emails: config.csv_emails.clone(),
            categories: config.csv_categories.clone(),
            topics: config.csv_topics.clone(),
            sso: config.csv_sso.clone(),
        }
    }
}

/// Everything read from one set of CSV files.
#[derive(Debug, Clone, Default)]
pub struct CsvExport {
    pub users: Vec<SourceUser>,
    pub categories: Vec<SourceCategory>,
    pub topics: Vec<SourcePost>,
    pub replies: Vec<SourcePost>,
    pub accounts: Vec<SourceAccount>,
}

async fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let name = path.display().to_string();
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| CoreError::source_unavailable(&name, e))?;
    Ok(parse_rows(&name, &bytes))
}

/// Rows that fail to deserialize are logged and left out.
fn parse_rows<T: DeserializeOwned>(name: &str, bytes: &[u8]) -> Vec<T> {
    let mut reader = ::csv::Reader::from_reader(bytes);
    let mut rows = Vec::new();
    for result in reader.deserialize() {
        match result {
            Ok(row) => rows.push(row),
            Err(e) => {
                let line = e.position().map(|p| p.line());
                warn!(file = %name, ?line, error = %e, "skipping malformed csv row");
            }
        }
    }
    rows
}

async fn maybe_rows<T: DeserializeOwned>(path: Option<&Path>) -> Result<Vec<T>> {
    match path {
        Some(path) => {
            let rows = read_rows(path).await?;
            info!(file = %path.display(), rows = rows.len(), "loaded csv");
            Ok(rows)
        }
        None => Ok(Vec::new()),
    }
}

fn author(email: Option<String>) -> AuthorRef {
    match email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty()) {
        Some(email) => AuthorRef::Email(email),
        None => AuthorRef::Unknown,
    }
}

impl CsvExport {
    pub async fn load(files: &CsvFiles) -> Result<Self> {
        let users: Vec<UserRow> = maybe_rows(files.users.as_deref()).await?;
        let emails: Vec<EmailRow> = maybe_rows(files.emails.as_deref()).await?;
        let categories: Vec<CategoryRow> = maybe_rows(files.categories.as_deref()).await?;
        let topics: Vec<TopicRow> = maybe_rows(files.topics.as_deref()).await?;
        let sso: Vec<SsoRow> = maybe_rows(files.sso.as_deref()).await?;
        Ok(Self::from_rows(users, emails, categories, topics, sso))
    }

    fn from_rows(
        users: Vec<UserRow>,
        emails: Vec<EmailRow>,
        categories: Vec<CategoryRow>,
        topics: Vec<TopicRow>,
        sso: Vec<SsoRow>,
    ) -> Self {
        let email_by_user: HashMap<String, String> = emails
            .into_iter()
            .map(|row| (row.user_id, row.email))
            .collect();

        let mut export = CsvExport::default();

        for (index, row) in users.into_iter().enumerate() {
            // Rows without an id are keyed by their position.
            let source_id = row
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| index.to_string());
            let mut user = SourceUser::new(source_id, row.name.clone());
            user.email = email_by_user.get(&user.source_id).cloned();
            user.name = Some(row.name);
            user.created_at = row.created_at;
            export.users.push(user);
        }

        export.accounts = sso
            .into_iter()
            .map(|row| SourceAccount {
                user_source_id: row.user_id,
                provider: SSO_PROVIDER.to_string(),
                provider_uid: row.external_id,
            })
            .collect();

        export.categories = categories
            .into_iter()
            .map(|row| SourceCategory {
                source_id: row.id,
                name: row.name,
                description: row.description,
                parent_source_id: None,
                owner: author(row.email),
            })
            .collect();

        for row in topics {
            let thread = match row.row_type.as_str() {
                "Discussion" => ThreadRef::Opens {
                    title: row.title.unwrap_or_default(),
                    category_source_id: row.category_id,
                    topic_source_id: None,
                },
                "Post" => match row.posted_in {
                    Some(first_post) => ThreadRef::Replies {
                        first_post_source_id: first_post,
                    },
                    None => {
                        warn!(id = %row.id, "reply without PostedIn, ignoring row");
                        continue;
                    }
                },
                other => {
                    warn!(id = %row.id, row_type = other, "unknown topic row type, ignoring row");
                    continue;
                }
            };

            let post = SourcePost {
                source_id: row.id,
                author: author(row.email),
                raw: row.raw,
                markup: Markup::Markdown,
                created_at: row.posted_on,
                thread,
            };
            if post.opens_topic() {
                export.topics.push(post);
            } else {
                export.replies.push(post);
            }
        }

        export
    }

    pub fn into_sources(self) -> ImportSources {
        ImportSources {
            groups: None,
            users: Some(Box::new(VecSource::new("csv users", self.users))),
            accounts: Some(Box::new(VecSource::new("csv sso", self.accounts))),
            categories: Some(Box::new(VecSource::new("csv categories", self.categories))),
            topics: Some(Box::new(VecSource::new("csv topics", self.topics))),
            replies: Some(Box::new(VecSource::new("csv posts", self.replies))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rows<T: DeserializeOwned>(csv: &str) -> Vec<T> {
        parse_rows("test", csv.as_bytes())
    }

    #[test]
    fn test_users_take_emails_and_row_index() {
        let export = CsvExport::from_rows(
            rows("id,name,created_at\n7,Meg Murry,2019-04-01\n,Charles Wallace,\n"),
            rows("user_id,email\n7,meg@example.com\n"),
            vec![],
            vec![],
            vec![],
        );
        assert_eq!(export.users.len(), 2);
        assert_eq!(export.users[0].source_id, "7");
        assert_eq!(export.users[0].email.as_deref(), Some("meg@example.com"));
        assert_eq!(export.users[0].created_at.as_deref(), Some("2019-04-01"));
        assert_eq!(export.users[1].source_id, "1");
        assert_eq!(export.users[1].username, "Charles Wallace");
        assert_eq!(export.users[1].created_at, None);
    }

    #[test]
    fn test_topics_split_by_type() {
        let csv = "id,type,title,raw,PostedOn,PostedIn,email,category_id\n\
                   10,Discussion,Hello,first body,2020-01-01 10:00:00,,meg@example.com,2\n\
                   11,Post,,a reply,2020-01-02 10:00:00,10,,\n\
                   12,Post,,orphan,2020-01-02 10:00:00,,,\n\
                   13,Poll,,what,,,,\n";
        let export = CsvExport::from_rows(vec![], vec![], vec![], rows(csv), vec![]);

        assert_eq!(export.topics.len(), 1);
        let topic = &export.topics[0];
        assert_eq!(topic.author, AuthorRef::Email("meg@example.com".into()));
        assert_eq!(topic.markup, Markup::Markdown);
        assert_eq!(
            topic.thread,
            ThreadRef::Opens {
                title: "Hello".into(),
                category_source_id: Some("2".into()),
                topic_source_id: None,
            }
        );

        assert_eq!(export.replies.len(), 1);
        assert_eq!(export.replies[0].author, AuthorRef::Unknown);
        assert_eq!(
            export.replies[0].thread,
            ThreadRef::Replies {
                first_post_source_id: "10".into()
            }
        );
    }

    #[test]
    fn test_categories_and_sso() {
        let export = CsvExport::from_rows(
            vec![],
            vec![],
            rows("id,name,description,email\n2,General,Talk,owner@example.com\n"),
            vec![],
            rows("user_id,external_id\n7,abc-123\n"),
        );
        assert_eq!(export.categories[0].owner, AuthorRef::Email("owner@example.com".into()));
        assert_eq!(export.accounts[0].provider, SSO_PROVIDER);
        assert_eq!(export.accounts[0].provider_uid, "abc-123");
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let csv = "id,type,title,raw,PostedOn,PostedIn,email,category_id\n\
                   10,Discussion,Hello,first body,2020-01-01 10:00:00,,,\n\
                   11,Post,,short\n\
                   12,Post,,a reply,2020-01-02 10:00:00,10,,\n";
        let topics: Vec<TopicRow> = rows(csv);
        let ids: Vec<&str> = topics.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["10", "12"]);

        let sso: Vec<SsoRow> = rows("user_id\n7\n");
        assert!(sso.is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_is_unavailable() {
        let files = CsvFiles {
            users: Some(PathBuf::from("/nonexistent/users.csv")),
            ..Default::default()
        };
        let err = CsvExport::load(&files).await.unwrap_err();
        assert!(matches!(err, CoreError::SourceUnavailable { .. }));
    }
}
