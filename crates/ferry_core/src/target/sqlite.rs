use async_trait::async_trait;
use chrono::Utc;
use ferry_db::{
    queries, DbError, EntityKind, ForumDb, NewForumCategory, NewForumPost, NewForumTopic,
    NewForumUser,
};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{CreatedPost, NewCategory, NewPost, NewUser, PostTarget, TargetPlatform};
use crate::error::{CoreError, Result};

const MAX_USERNAME_CHARS: usize = 60;
const MAX_USERNAME_SUFFIX: u32 = 1000;

/// The reference forum stored in the ferry database.
#[derive(Debug, Clone)]
pub struct SqliteForum {
    db: ForumDb,
    placeholder_username: String,
}

impl SqliteForum {
    pub fn new(db: ForumDb, placeholder_username: impl Into<String>) -> Self {
        Self {
            db,
            placeholder_username: placeholder_username.into(),
        }
    }

    pub fn db(&self) -> &ForumDb {
        &self.db
    }

    async fn unique_username(&self, requested: &str) -> Result<String> {
        let base = suggest_username(requested);
        if !queries::username_exists(self.db.pool(), &base).await? {
            return Ok(base);
        }
        for suffix in 1..MAX_USERNAME_SUFFIX {
            let candidate = format!("{base}{suffix}");
            if !queries::username_exists(self.db.pool(), &candidate).await? {
                return Ok(candidate);
            }
        }
        Err(CoreError::TargetValidation {
            kind: EntityKind::User,
            reason: format!("no free username left for '{base}'"),
        })
    }
}

/// Turn a source name into a username.
///
/// Lowercases, maps whitespace to `_` and keeps only `[a-z0-9_-]`. A name
/// with nothing usable left becomes `user_` plus a hash prefix, so the same
/// input always suggests the same name.
pub fn suggest_username(raw: &str) -> String {
    let mut name = String::with_capacity(raw.len());
    for c in raw.trim().chars().flat_map(char::to_lowercase) {
        if c.is_whitespace() {
            name.push('_');
        } else if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            name.push(c);
        }
    }
    let name = name.trim_matches(|c| c == '_' || c == '-');

    if name.is_empty() {
        let digest = Sha256::digest(raw.as_bytes());
        let hash: String = digest.iter().take(5).map(|b| format!("{b:02x}")).collect();
        return format!("user_{hash}");
    }
    name.chars().take(MAX_USERNAME_CHARS).collect()
}

fn rejected(kind: EntityKind, reason: impl Into<String>) -> CoreError {
    CoreError::TargetValidation {
        kind,
        reason: reason.into(),
    }
}

/// Constraint violations are the target refusing the record, not an outage.
fn classify(kind: EntityKind, err: DbError) -> CoreError {
    if err.is_constraint_violation() {
        rejected(kind, err.to_string())
    } else {
        CoreError::Database(err)
    }
}

fn require_text(kind: EntityKind, field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(rejected(kind, format!("{field} must not be blank")));
    }
    Ok(())
}

#[async_trait]
impl TargetPlatform for SqliteForum {
    async fn create_group(&self, name: &str) -> Result<i64> {
        require_text(EntityKind::Group, "name", name)?;
        queries::create_group(self.db.pool(), name.trim())
            .await
            .map_err(|e| classify(EntityKind::Group, e))
    }

    async fn create_user(&self, user: &NewUser) -> Result<i64> {
        let username = self.unique_username(&user.username).await?;
        let email = user
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string);

        let row = NewForumUser {
            username,
            name: user.name.clone(),
            email,
            bio: user.bio.clone(),
            location: user.location.clone(),
            is_placeholder: false,
            created_at: user.created_at,
            last_seen_at: user.last_seen_at,
        };
        queries::create_user(self.db.pool(), &row)
            .await
            .map_err(|e| classify(EntityKind::User, e))
    }

    async fn create_category(&self, category: &NewCategory) -> Result<i64> {
        require_text(EntityKind::Category, "name", &category.name)?;
        let row = NewForumCategory {
            name: category.name.trim().to_string(),
            description: category.description.clone(),
            parent_id: category.parent_id,
            user_id: category.user_id,
            created_at: category.created_at,
        };
        queries::create_category(self.db.pool(), &row)
            .await
            .map_err(|e| classify(EntityKind::Category, e))
    }

    async fn create_post(&self, post: &NewPost) -> Result<CreatedPost> {
        require_text(EntityKind::Post, "raw", &post.raw)?;

        match &post.target {
            PostTarget::NewTopic { title, category_id } => {
                require_text(EntityKind::Topic, "title", title)?;
                let topic = NewForumTopic {
                    title: title.clone(),
                    category_id: *category_id,
                };
                let first = NewForumPost {
                    user_id: post.user_id,
                    raw: post.raw.clone(),
                    reply_to_post_number: None,
                    created_at: post.created_at,
                };
                let (topic_id, post_id) = queries::create_topic(self.db.pool(), &topic, &first)
                    .await
                    .map_err(|e| classify(EntityKind::Topic, e))?;
                Ok(CreatedPost {
                    post_id,
                    topic_id,
                    post_number: 1,
                })
            }
            PostTarget::Reply {
                topic_id,
                reply_to_post_number,
            } => {
                let reply = NewForumPost {
                    user_id: post.user_id,
                    raw: post.raw.clone(),
                    reply_to_post_number: *reply_to_post_number,
                    created_at: post.created_at,
                };
                let (post_id, post_number) =
                    match queries::create_reply(self.db.pool(), *topic_id, &reply).await {
                        Ok(created) => created,
                        Err(DbError::NotFound { id, .. }) => {
                            return Err(rejected(
                                EntityKind::Post,
                                format!("topic {id} does not exist"),
                            ));
                        }
                        Err(e) => return Err(classify(EntityKind::Post, e)),
                    };
                Ok(CreatedPost {
                    post_id,
                    topic_id: *topic_id,
                    post_number,
                })
            }
        }
    }

    async fn add_group_member(&self, group_id: i64, user_id: i64) -> Result<bool> {
        queries::add_group_member(self.db.pool(), group_id, user_id)
            .await
            .map_err(|e| classify(EntityKind::Group, e))
    }

    async fn create_associated_account(
        &self,
        user_id: i64,
        provider: &str,
        provider_uid: &str,
    ) -> Result<bool> {
        require_text(EntityKind::User, "provider_uid", provider_uid)?;
        queries::create_associated_account(self.db.pool(), provider, provider_uid.trim(), user_id)
            .await
            .map_err(|e| classify(EntityKind::User, e))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<i64>> {
        if email.trim().is_empty() {
            return Ok(None);
        }
        Ok(queries::get_user_id_by_email(self.db.pool(), email).await?)
    }

    async fn placeholder_user(&self) -> Result<i64> {
        if let Some(id) =
            queries::get_user_id_by_username(self.db.pool(), &self.placeholder_username).await?
        {
            return Ok(id);
        }

        debug!(username = %self.placeholder_username, "creating placeholder user");
        let row = NewForumUser {
            username: self.placeholder_username.clone(),
            name: None,
            email: None,
            bio: None,
            location: None,
            is_placeholder: true,
            created_at: Utc::now(),
            last_seen_at: None,
        };
        queries::create_user(self.db.pool(), &row)
            .await
            .map_err(|e| classify(EntityKind::User, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn forum() -> SqliteForum {
        let db = ForumDb::open_in_memory().await.unwrap();
        SqliteForum::new(db, "anonymous")
    }

    fn user(username: &str, email: Option<&str>) -> NewUser {
        NewUser {
            username: username.to_string(),
            name: None,
            email: email.map(str::to_string),
            bio: None,
            location: None,
            created_at: Utc::now(),
            last_seen_at: None,
        }
    }

    #[test]
    fn test_suggest_username() {
        assert_eq!(suggest_username("Meg Smith"), "meg_smith");
        assert_eq!(suggest_username("  o'brien!  "), "obrien");
        assert_eq!(suggest_username("dash-ok_9"), "dash-ok_9");

        let hashed = suggest_username("???");
        assert!(hashed.starts_with("user_"));
        assert_eq!(hashed.len(), "user_".len() + 10);
        assert_eq!(hashed, suggest_username("???"));
    }

    #[tokio::test]
    async fn test_usernames_are_deduplicated() {
        let forum = forum().await;
        let a = forum.create_user(&user("Meg", None)).await.unwrap();
        let b = forum.create_user(&user("meg", None)).await.unwrap();

        let a = queries::get_user(forum.db().pool(), a).await.unwrap().unwrap();
        let b = queries::get_user(forum.db().pool(), b).await.unwrap().unwrap();
        assert_eq!(a.username, "meg");
        assert_eq!(b.username, "meg1");
    }

    #[tokio::test]
    async fn test_duplicate_email_is_rejected() {
        let forum = forum().await;
        forum
            .create_user(&user("a", Some("same@example.com")))
            .await
            .unwrap();
        let err = forum
            .create_user(&user("b", Some("SAME@example.com")))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::TargetValidation { kind: EntityKind::User, .. }));
        assert!(err.is_record_level());

        let found = forum.find_user_by_email("same@example.com").await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_topic_then_reply() {
        let forum = forum().await;
        let author = forum.placeholder_user().await.unwrap();
        assert_eq!(forum.placeholder_user().await.unwrap(), author);

        let opening = forum
            .create_post(&NewPost {
                user_id: author,
                raw: "first".into(),
                created_at: Utc::now(),
                target: PostTarget::NewTopic {
                    title: "Hello".into(),
                    category_id: None,
                },
            })
            .await
            .unwrap();
        assert_eq!(opening.post_number, 1);

        let reply = forum
            .create_post(&NewPost {
                user_id: author,
                raw: "second".into(),
                created_at: Utc::now(),
                target: PostTarget::Reply {
                    topic_id: opening.topic_id,
                    reply_to_post_number: Some(1),
                },
            })
            .await
            .unwrap();
        assert_eq!(reply.topic_id, opening.topic_id);
        assert_eq!(reply.post_number, 2);
    }

    #[tokio::test]
    async fn test_blank_and_dangling_posts_are_rejected() {
        let forum = forum().await;
        let author = forum.placeholder_user().await.unwrap();

        let blank = NewPost {
            user_id: author,
            raw: "body".into(),
            created_at: Utc::now(),
            target: PostTarget::NewTopic {
                title: "   ".into(),
                category_id: None,
            },
        };
        let err = forum.create_post(&blank).await.unwrap_err();
        assert!(matches!(err, CoreError::TargetValidation { kind: EntityKind::Topic, .. }));

        let dangling = NewPost {
            user_id: author,
            raw: "body".into(),
            created_at: Utc::now(),
            target: PostTarget::Reply {
                topic_id: 404,
                reply_to_post_number: None,
            },
        };
        let err = forum.create_post(&dangling).await.unwrap_err();
        assert!(err.is_record_level());
    }

    #[tokio::test]
    async fn test_associated_accounts_are_idempotent() {
        let forum = forum().await;
        let id = forum.create_user(&user("sso", None)).await.unwrap();
        assert!(forum.create_associated_account(id, "oidc", "ext-1").await.unwrap());
        assert!(!forum.create_associated_account(id, "oidc", "ext-1").await.unwrap());
    }
}
