//! Reference forum queries.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::{DbError, DbResult};
use crate::models::{
    ForumCategory, ForumPost, ForumTopic, ForumUser, NewForumCategory, NewForumPost,
    NewForumTopic, NewForumUser,
};

// ============================================================================
// Groups
// ============================================================================

/// Create a group, returning its id.
pub async fn create_group(pool: &SqlitePool, name: &str) -> DbResult<i64> {
    let result = sqlx::query("INSERT INTO forum_groups (name, created_at) VALUES (?, ?)")
        .bind(name)
        .bind(Utc::now())
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}

/// Find a group by name.
pub async fn get_group_id_by_name(pool: &SqlitePool, name: &str) -> DbResult<Option<i64>> {
    let id = sqlx::query_scalar("SELECT id FROM forum_groups WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    Ok(id)
}

/// Add a user to a group. Returns false if already a member.
pub async fn add_group_member(pool: &SqlitePool, group_id: i64, user_id: i64) -> DbResult<bool> {
    let result = sqlx::query(
        "INSERT INTO forum_group_members (group_id, user_id) VALUES (?, ?) ON CONFLICT DO NOTHING",
    )
    .bind(group_id)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// List the ids of a group's members.
pub async fn get_group_member_ids(pool: &SqlitePool, group_id: i64) -> DbResult<Vec<i64>> {
    let ids = sqlx::query_scalar(
        "SELECT user_id FROM forum_group_members WHERE group_id = ? ORDER BY user_id",
    )
    .bind(group_id)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

// ============================================================================
// Users
// ============================================================================

/// Create a user, returning its id.
pub async fn create_user(pool: &SqlitePool, user: &NewForumUser) -> DbResult<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO forum_users (username, name, email, bio, location, is_placeholder, created_at, last_seen_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.username)
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.bio)
    .bind(&user.location)
    .bind(user.is_placeholder)
    .bind(user.created_at)
    .bind(user.last_seen_at)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Get a user by id.
pub async fn get_user(pool: &SqlitePool, id: i64) -> DbResult<Option<ForumUser>> {
    let user = sqlx::query_as::<_, ForumUser>(
        r#"
        SELECT id, username, name, email, bio, location, is_placeholder, created_at, last_seen_at
        FROM forum_users WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

/// Whether a username is taken (case-insensitive).
pub async fn username_exists(pool: &SqlitePool, username: &str) -> DbResult<bool> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM forum_users WHERE username = ?)")
            .bind(username)
            .fetch_one(pool)
            .await?;
    Ok(exists)
}

/// Find a user id by username (case-insensitive).
pub async fn get_user_id_by_username(pool: &SqlitePool, username: &str) -> DbResult<Option<i64>> {
    let id = sqlx::query_scalar("SELECT id FROM forum_users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;
    Ok(id)
}

/// Find a user id by email (case-insensitive).
pub async fn get_user_id_by_email(pool: &SqlitePool, email: &str) -> DbResult<Option<i64>> {
    let id = sqlx::query_scalar("SELECT id FROM forum_users WHERE email = ?")
        .bind(email.trim())
        .fetch_optional(pool)
        .await?;
    Ok(id)
}

/// Link an external login to a user. Returns false if the account already exists.
pub async fn create_associated_account(
    pool: &SqlitePool,
    provider: &str,
    provider_uid: &str,
    user_id: i64,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO forum_associated_accounts (provider, provider_uid, user_id, created_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (provider, provider_uid) DO NOTHING
        "#,
    )
    .bind(provider)
    .bind(provider_uid)
    .bind(user_id)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

// ============================================================================
// Categories
// ============================================================================

/// Create a category, returning its id.
pub async fn create_category(pool: &SqlitePool, category: &NewForumCategory) -> DbResult<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO forum_categories (name, description, parent_id, user_id, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&category.name)
    .bind(&category.description)
    .bind(category.parent_id)
    .bind(category.user_id)
    .bind(category.created_at)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Get a category by id.
pub async fn get_category(pool: &SqlitePool, id: i64) -> DbResult<Option<ForumCategory>> {
    let category = sqlx::query_as::<_, ForumCategory>(
        "SELECT id, name, description, parent_id, user_id, created_at FROM forum_categories WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(category)
}

// ============================================================================
// Topics and posts
// ============================================================================

/// Open a topic with its first post. Returns `(topic_id, post_id)`.
pub async fn create_topic(
    pool: &SqlitePool,
    topic: &NewForumTopic,
    first_post: &NewForumPost,
) -> DbResult<(i64, i64)> {
    let mut tx = pool.begin().await?;

    let topic_id = sqlx::query(
        "INSERT INTO forum_topics (title, category_id, user_id, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&topic.title)
    .bind(topic.category_id)
    .bind(first_post.user_id)
    .bind(first_post.created_at)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    let post_id = sqlx::query(
        r#"
        INSERT INTO forum_posts (topic_id, post_number, user_id, raw, reply_to_post_number, created_at)
        VALUES (?, 1, ?, ?, NULL, ?)
        "#,
    )
    .bind(topic_id)
    .bind(first_post.user_id)
    .bind(&first_post.raw)
    .bind(first_post.created_at)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    tx.commit().await?;
    Ok((topic_id, post_id))
}

/// Append a reply to a topic. Returns `(post_id, post_number)`.
pub async fn create_reply(
    pool: &SqlitePool,
    topic_id: i64,
    post: &NewForumPost,
) -> DbResult<(i64, i64)> {
    let mut tx = pool.begin().await?;

    let topic_exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM forum_topics WHERE id = ?)")
            .bind(topic_id)
            .fetch_one(&mut *tx)
            .await?;
    if !topic_exists {
        return Err(DbError::not_found("topic", topic_id.to_string()));
    }

    let post_number: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(post_number), 0) + 1 FROM forum_posts WHERE topic_id = ?",
    )
    .bind(topic_id)
    .fetch_one(&mut *tx)
    .await?;

    let post_id = sqlx::query(
        r#"
        INSERT INTO forum_posts (topic_id, post_number, user_id, raw, reply_to_post_number, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(topic_id)
    .bind(post_number)
    .bind(post.user_id)
    .bind(&post.raw)
    .bind(post.reply_to_post_number)
    .bind(post.created_at)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    tx.commit().await?;
    Ok((post_id, post_number))
}

/// Get a topic by id.
pub async fn get_topic(pool: &SqlitePool, id: i64) -> DbResult<Option<ForumTopic>> {
    let topic = sqlx::query_as::<_, ForumTopic>(
        "SELECT id, title, category_id, user_id, created_at FROM forum_topics WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(topic)
}

/// Get a post by id.
pub async fn get_post(pool: &SqlitePool, id: i64) -> DbResult<Option<ForumPost>> {
    let post = sqlx::query_as::<_, ForumPost>(
        r#"
        SELECT id, topic_id, post_number, user_id, raw, reply_to_post_number, created_at
        FROM forum_posts WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(post)
}

/// List the posts of a topic in order.
pub async fn get_topic_posts(pool: &SqlitePool, topic_id: i64) -> DbResult<Vec<ForumPost>> {
    let posts = sqlx::query_as::<_, ForumPost>(
        r#"
        SELECT id, topic_id, post_number, user_id, raw, reply_to_post_number, created_at
        FROM forum_posts WHERE topic_id = ? ORDER BY post_number
        "#,
    )
    .bind(topic_id)
    .fetch_all(pool)
    .await?;
    Ok(posts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ForumDb;

    fn new_user(username: &str, email: Option<&str>) -> NewForumUser {
        NewForumUser {
            username: username.to_string(),
            name: None,
            email: email.map(str::to_string),
            bio: None,
            location: None,
            is_placeholder: false,
            created_at: Utc::now(),
            last_seen_at: None,
        }
    }

    fn new_post(user_id: i64, raw: &str) -> NewForumPost {
        NewForumPost {
            user_id,
            raw: raw.to_string(),
            reply_to_post_number: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_users_unique_case_insensitive() {
        let db = ForumDb::open_in_memory().await.unwrap();
        let id = create_user(db.pool(), &new_user("meg", Some("Meg@Example.com")))
            .await
            .unwrap();

        assert!(username_exists(db.pool(), "MEG").await.unwrap());
        assert_eq!(
            get_user_id_by_email(db.pool(), "meg@example.com")
                .await
                .unwrap(),
            Some(id)
        );

        let err = create_user(db.pool(), &new_user("Meg", None))
            .await
            .unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[tokio::test]
    async fn test_topic_and_replies_are_numbered() {
        let db = ForumDb::open_in_memory().await.unwrap();
        let user = create_user(db.pool(), &new_user("op", None)).await.unwrap();

        let (topic_id, first_post) = create_topic(
            db.pool(),
            &NewForumTopic {
                title: "Hello".to_string(),
                category_id: None,
            },
            &new_post(user, "first"),
        )
        .await
        .unwrap();

        let (_, second) = create_reply(db.pool(), topic_id, &new_post(user, "second"))
            .await
            .unwrap();
        let (_, third) = create_reply(db.pool(), topic_id, &new_post(user, "third"))
            .await
            .unwrap();
        assert_eq!((second, third), (2, 3));

        let first = get_post(db.pool(), first_post).await.unwrap().unwrap();
        assert_eq!(first.post_number, 1);

        let posts = get_topic_posts(db.pool(), topic_id).await.unwrap();
        let bodies: Vec<_> = posts.iter().map(|p| p.raw.as_str()).collect();
        assert_eq!(bodies, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_reply_to_missing_topic() {
        let db = ForumDb::open_in_memory().await.unwrap();
        let user = create_user(db.pool(), &new_user("op", None)).await.unwrap();

        let err = create_reply(db.pool(), 99, &new_post(user, "orphan"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_group_membership_and_accounts() {
        let db = ForumDb::open_in_memory().await.unwrap();
        let user = create_user(db.pool(), &new_user("op", None)).await.unwrap();
        let group = create_group(db.pool(), "staff").await.unwrap();

        assert!(add_group_member(db.pool(), group, user).await.unwrap());
        assert!(!add_group_member(db.pool(), group, user).await.unwrap());
        assert_eq!(
            get_group_member_ids(db.pool(), group).await.unwrap(),
            vec![user]
        );

        assert!(create_associated_account(db.pool(), "oidc", "abc", user)
            .await
            .unwrap());
        assert!(!create_associated_account(db.pool(), "oidc", "abc", user)
            .await
            .unwrap());
    }
}
