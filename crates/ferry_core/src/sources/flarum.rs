//! Flarum MySQL reader.
//!
//! Reads users, tags and posts straight from a Flarum database, one page per
//! batch. Tags with a parent become child categories; parents come first so
//! they are mapped before their children. Post bodies are Flarum's stored
//! XML-ish markup and go through the transcoder.

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::Row;
use tracing::info;

use super::{ImportSources, RecordSource};
use crate::config::FlarumConfig;
use crate::error::{CoreError, Result};
use crate::records::{AuthorRef, Markup, SourceCategory, SourcePost, SourceUser, ThreadRef};

const USERS: &str = "
    SELECT CAST(id AS CHAR) AS id,
           username,
           email,
           DATE_FORMAT(joined_at, '%Y-%m-%d %H:%i:%s') AS joined_at,
           DATE_FORMAT(last_seen_at, '%Y-%m-%d %H:%i:%s') AS last_seen_at
    FROM users
    ORDER BY id
    LIMIT ? OFFSET ?";

const TAGS: &str = "
    SELECT CAST(id AS CHAR) AS id,
           name,
           description,
           CAST(parent_id AS CHAR) AS parent_id
    FROM tags
    ORDER BY parent_id IS NOT NULL, position, id
    LIMIT ? OFFSET ?";

// A discussion's most specific tag is its category.
const OPENING_POSTS: &str = "
    SELECT CAST(p.id AS CHAR) AS id,
           CAST(d.id AS CHAR) AS discussion_id,
           d.title AS title,
           CAST(p.user_id AS CHAR) AS user_id,
           p.content AS raw,
           DATE_FORMAT(p.created_at, '%Y-%m-%d %H:%i:%s') AS created_at,
           (SELECT CAST(t.tag_id AS CHAR)
              FROM discussion_tag t
              JOIN tags g ON g.id = t.tag_id
             WHERE t.discussion_id = d.id
             ORDER BY g.parent_id IS NULL, g.position
             LIMIT 1) AS category_id
    FROM posts p
    JOIN discussions d ON p.discussion_id = d.id
    WHERE p.id = d.first_post_id
      AND p.type = 'comment'
    ORDER BY p.created_at, p.id
    LIMIT ? OFFSET ?";

const REPLIES: &str = "
    SELECT CAST(p.id AS CHAR) AS id,
           CAST(d.first_post_id AS CHAR) AS first_post_id,
           CAST(p.user_id AS CHAR) AS user_id,
           p.content AS raw,
           DATE_FORMAT(p.created_at, '%Y-%m-%d %H:%i:%s') AS created_at
    FROM posts p
    JOIN discussions d ON p.discussion_id = d.id
    WHERE p.id <> d.first_post_id
      AND p.type = 'comment'
    ORDER BY p.created_at, p.id
    LIMIT ? OFFSET ?";

/// Connection to a Flarum database.
#[derive(Debug, Clone)]
pub struct FlarumSource {
    pool: MySqlPool,
}

impl FlarumSource {
    pub async fn connect(config: &FlarumConfig) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(2)
            .connect_with(connect_options(config))
            .await
            .map_err(|e| CoreError::source_unavailable("flarum", e))?;
        info!(host = %config.host, database = %config.database, "connected to flarum");
        Ok(Self { pool })
    }

    pub fn into_sources(self) -> ImportSources {
        ImportSources {
            groups: None,
            users: Some(Box::new(Paginated::new("flarum users", &self.pool, USERS, user))),
            accounts: None,
            categories: Some(Box::new(Paginated::new(
                "flarum tags",
                &self.pool,
                TAGS,
                category,
            ))),
            topics: Some(Box::new(Paginated::new(
                "flarum discussions",
                &self.pool,
                OPENING_POSTS,
                opening_post,
            ))),
            replies: Some(Box::new(Paginated::new(
                "flarum posts",
                &self.pool,
                REPLIES,
                reply,
            ))),
        }
    }
}

/// Options are set field by field; credentials are never URL-encoded.
fn connect_options(config: &FlarumConfig) -> MySqlConnectOptions {
    let options = MySqlConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .database(&config.database);
    match &config.password {
        Some(password) => options.password(password),
        None => options,
    }
}

type RowMapper<R> = fn(&MySqlRow) -> std::result::Result<R, sqlx::Error>;

/// `LIMIT ? OFFSET ?` pagination over one query.
struct Paginated<R> {
    name: &'static str,
    pool: MySqlPool,
    query: &'static str,
    offset: i64,
    map: RowMapper<R>,
}

impl<R> Paginated<R> {
    fn new(name: &'static str, pool: &MySqlPool, query: &'static str, map: RowMapper<R>) -> Self {
        Self {
            name,
            pool: pool.clone(),
            query,
            offset: 0,
            map,
        }
    }
}

#[async_trait]
impl<R: Send + 'static> RecordSource<R> for Paginated<R> {
    fn name(&self) -> &str {
        self.name
    }

    async fn next_batch(&mut self, limit: usize) -> Result<Option<Vec<R>>> {
        let rows = sqlx::query(self.query)
            .bind(limit as i64)
            .bind(self.offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CoreError::source_unavailable(self.name, e))?;
        if rows.is_empty() {
            return Ok(None);
        }
        self.offset += rows.len() as i64;

        rows.iter()
            .map(|row| (self.map)(row).map_err(|e| CoreError::source_format(self.name, e)))
            .collect::<Result<Vec<R>>>()
            .map(Some)
    }
}

fn author(row: &MySqlRow) -> std::result::Result<AuthorRef, sqlx::Error> {
    Ok(match row.try_get::<Option<String>, _>("user_id")? {
        Some(id) => AuthorRef::SourceId(id),
        None => AuthorRef::Unknown,
    })
}

fn user(row: &MySqlRow) -> std::result::Result<SourceUser, sqlx::Error> {
    let username: String = row.try_get("username")?;
    let mut user = SourceUser::new(row.try_get::<String, _>("id")?, username.clone());
    user.name = Some(username);
    user.email = row.try_get("email")?;
    user.created_at = row.try_get("joined_at")?;
    user.last_seen = row.try_get("last_seen_at")?;
    Ok(user)
}

fn category(row: &MySqlRow) -> std::result::Result<SourceCategory, sqlx::Error> {
    Ok(SourceCategory {
        source_id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        parent_source_id: row.try_get("parent_id")?,
        owner: AuthorRef::Unknown,
    })
}

fn opening_post(row: &MySqlRow) -> std::result::Result<SourcePost, sqlx::Error> {
    Ok(SourcePost {
        source_id: row.try_get("id")?,
        author: author(row)?,
        raw: row.try_get("raw")?,
        markup: Markup::Legacy,
        created_at: row.try_get("created_at")?,
        thread: ThreadRef::Opens {
            title: row.try_get("title")?,
            category_source_id: row.try_get("category_id")?,
            topic_source_id: row.try_get("discussion_id")?,
        },
    })
}

fn reply(row: &MySqlRow) -> std::result::Result<SourcePost, sqlx::Error> {
    Ok(SourcePost {
        source_id: row.try_get("id")?,
        author: author(row)?,
        raw: row.try_get("raw")?,
        markup: Markup::Legacy,
        created_at: row.try_get("created_at")?,
        thread: ThreadRef::Replies {
            first_post_source_id: row.try_get("first_post_id")?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_options_keep_special_characters() {
        let config = FlarumConfig {
            host: "db.internal".to_string(),
            port: 3307,
            database: "forum".to_string(),
            user: "ops@site".to_string(),
            password: Some("p@ss/w#rd:1".to_string()),
        };
        let options = connect_options(&config);
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 3307);
        assert_eq!(options.get_username(), "ops@site");
        assert_eq!(options.get_database(), Some("forum"));
    }
}
