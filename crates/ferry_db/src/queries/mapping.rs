//! Identity map queries.
//!
//! Every write is a compare-and-set: rows are inserted with
//! `ON CONFLICT DO NOTHING` and the caller learns whether the map already
//! agreed, or who holds the conflicting key.

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use crate::error::DbResult;
use crate::models::{EntityKind, ImportMapping, MappingWrite, PostPlacement};

/// SQLite's default host-parameter limit is 999 on older builds.
const IN_CLAUSE_CHUNK: usize = 500;

// ============================================================================
// Mappings
// ============================================================================

/// Record `(namespace, kind, source_id) -> target_id` unless it conflicts.
///
/// Takes a connection so it can run inside the caller's transaction.
pub async fn insert_mapping(
    conn: &mut SqliteConnection,
    namespace: &str,
    kind: EntityKind,
    source_id: &str,
    target_id: i64,
) -> DbResult<MappingWrite> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO import_mappings (namespace, kind, source_id, target_id, created_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(namespace)
    .bind(kind)
    .bind(source_id)
    .bind(target_id)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    if inserted.rows_affected() == 1 {
        return Ok(MappingWrite::Inserted);
    }

    let existing: Option<i64> = sqlx::query_scalar(
        "SELECT target_id FROM import_mappings WHERE namespace = ? AND kind = ? AND source_id = ?",
    )
    .bind(namespace)
    .bind(kind)
    .bind(source_id)
    .fetch_optional(&mut *conn)
    .await?;

    match existing {
        Some(existing) if existing == target_id => Ok(MappingWrite::Unchanged),
        Some(existing_target) => Ok(MappingWrite::SourceTaken { existing_target }),
        None => {
            let holder: String = sqlx::query_scalar(
                "SELECT source_id FROM import_mappings WHERE namespace = ? AND kind = ? AND target_id = ?",
            )
            .bind(namespace)
            .bind(kind)
            .bind(target_id)
            .fetch_one(&mut *conn)
            .await?;
            Ok(MappingWrite::TargetTaken { holder })
        }
    }
}

/// Look up the target id for a source id.
pub async fn get_target_id(
    pool: &SqlitePool,
    namespace: &str,
    kind: EntityKind,
    source_id: &str,
) -> DbResult<Option<i64>> {
    let target = sqlx::query_scalar(
        "SELECT target_id FROM import_mappings WHERE namespace = ? AND kind = ? AND source_id = ?",
    )
    .bind(namespace)
    .bind(kind)
    .bind(source_id)
    .fetch_optional(pool)
    .await?;
    Ok(target)
}

/// Look up the source id that produced a target id.
pub async fn get_source_id(
    pool: &SqlitePool,
    namespace: &str,
    kind: EntityKind,
    target_id: i64,
) -> DbResult<Option<String>> {
    let source = sqlx::query_scalar(
        "SELECT source_id FROM import_mappings WHERE namespace = ? AND kind = ? AND target_id = ?",
    )
    .bind(namespace)
    .bind(kind)
    .bind(target_id)
    .fetch_optional(pool)
    .await?;
    Ok(source)
}

/// Which of `source_ids` are already mapped.
pub async fn existing_source_ids(
    pool: &SqlitePool,
    namespace: &str,
    kind: EntityKind,
    source_ids: &[String],
) -> DbResult<Vec<String>> {
    let mut found = Vec::new();

    for chunk in source_ids.chunks(IN_CLAUSE_CHUNK) {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT source_id FROM import_mappings WHERE namespace = ");
        builder.push_bind(namespace);
        builder.push(" AND kind = ");
        builder.push_bind(kind);
        builder.push(" AND source_id IN (");
        let mut separated = builder.separated(", ");
        for id in chunk {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let rows: Vec<String> = builder.build_query_scalar().fetch_all(pool).await?;
        found.extend(rows);
    }

    Ok(found)
}

/// List mappings of one kind, oldest first.
pub async fn list_mappings(
    pool: &SqlitePool,
    namespace: &str,
    kind: EntityKind,
    limit: i64,
) -> DbResult<Vec<ImportMapping>> {
    let rows = sqlx::query_as::<_, ImportMapping>(
        r#"
        SELECT namespace, kind, source_id, target_id, created_at
        FROM import_mappings
        WHERE namespace = ? AND kind = ?
        ORDER BY created_at, source_id
        LIMIT ?
        "#,
    )
    .bind(namespace)
    .bind(kind)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Count mappings per kind in a namespace.
pub async fn count_mappings(
    pool: &SqlitePool,
    namespace: &str,
) -> DbResult<Vec<(EntityKind, i64)>> {
    let rows = sqlx::query_as::<_, (EntityKind, i64)>(
        r#"
        SELECT kind, COUNT(*)
        FROM import_mappings
        WHERE namespace = ?
        GROUP BY kind
        "#,
    )
    .bind(namespace)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ============================================================================
// Post placements
// ============================================================================

/// Store where a post landed. Runs inside the caller's transaction.
pub async fn insert_placement(
    conn: &mut SqliteConnection,
    namespace: &str,
    source_id: &str,
    placement: PostPlacement,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO post_placements (namespace, source_id, topic_id, post_number)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (namespace, source_id) DO NOTHING
        "#,
    )
    .bind(namespace)
    .bind(source_id)
    .bind(placement.topic_id)
    .bind(placement.post_number)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Get the placement of an imported post by its source id.
pub async fn get_placement(
    pool: &SqlitePool,
    namespace: &str,
    source_id: &str,
) -> DbResult<Option<PostPlacement>> {
    let placement = sqlx::query_as::<_, PostPlacement>(
        "SELECT topic_id, post_number FROM post_placements WHERE namespace = ? AND source_id = ?",
    )
    .bind(namespace)
    .bind(source_id)
    .fetch_optional(pool)
    .await?;
    Ok(placement)
}

/// Get placements for many source ids at once.
pub async fn get_placements(
    pool: &SqlitePool,
    namespace: &str,
    source_ids: &[String],
) -> DbResult<Vec<(String, PostPlacement)>> {
    let mut found = Vec::new();

    for chunk in source_ids.chunks(IN_CLAUSE_CHUNK) {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT source_id, topic_id, post_number FROM post_placements WHERE namespace = ",
        );
        builder.push_bind(namespace);
        builder.push(" AND source_id IN (");
        let mut separated = builder.separated(", ");
        for id in chunk {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let rows: Vec<(String, i64, i64)> = builder.build_query_as().fetch_all(pool).await?;
        found.extend(rows.into_iter().map(|(source_id, topic_id, post_number)| {
            (
                source_id,
                PostPlacement {
                    topic_id,
                    post_number,
                },
            )
        }));
    }

    Ok(found)
}

/// Highest recorded post number in a topic.
pub async fn max_post_number(
    pool: &SqlitePool,
    namespace: &str,
    topic_id: i64,
) -> DbResult<Option<i64>> {
    let max: Option<i64> = sqlx::query_scalar(
        "SELECT MAX(post_number) FROM post_placements WHERE namespace = ? AND topic_id = ?",
    )
    .bind(namespace)
    .bind(topic_id)
    .fetch_one(pool)
    .await?;
    Ok(max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ForumDb;

    async fn insert(db: &ForumDb, kind: EntityKind, source: &str, target: i64) -> MappingWrite {
        let mut conn = db.pool().acquire().await.unwrap();
        insert_mapping(&mut conn, "ns", kind, source, target)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_insert_mapping_compare_and_set() {
        let db = ForumDb::open_in_memory().await.unwrap();

        assert_eq!(insert(&db, EntityKind::User, "7", 70).await, MappingWrite::Inserted);
        assert_eq!(insert(&db, EntityKind::User, "7", 70).await, MappingWrite::Unchanged);
        assert_eq!(
            insert(&db, EntityKind::User, "7", 71).await,
            MappingWrite::SourceTaken {
                existing_target: 70
            }
        );
        assert_eq!(
            insert(&db, EntityKind::User, "8", 70).await,
            MappingWrite::TargetTaken {
                holder: "7".to_string()
            }
        );

        // Same ids under another kind do not collide.
        assert_eq!(insert(&db, EntityKind::Post, "7", 70).await, MappingWrite::Inserted);

        let target = get_target_id(db.pool(), "ns", EntityKind::User, "7")
            .await
            .unwrap();
        assert_eq!(target, Some(70));
        let source = get_source_id(db.pool(), "ns", EntityKind::User, 70)
            .await
            .unwrap();
        assert_eq!(source.as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let db = ForumDb::open_in_memory().await.unwrap();
        insert(&db, EntityKind::User, "1", 10).await;

        let other = get_target_id(db.pool(), "other", EntityKind::User, "1")
            .await
            .unwrap();
        assert_eq!(other, None);
    }

    #[tokio::test]
    async fn test_existing_source_ids_chunks() {
        let db = ForumDb::open_in_memory().await.unwrap();
        for i in 0..1200 {
            if i % 3 == 0 {
                insert(&db, EntityKind::Post, &i.to_string(), i).await;
            }
        }

        let ids: Vec<String> = (0..1200).map(|i| i.to_string()).collect();
        let found = existing_source_ids(db.pool(), "ns", EntityKind::Post, &ids)
            .await
            .unwrap();
        assert_eq!(found.len(), 400);

        let counts = count_mappings(db.pool(), "ns").await.unwrap();
        assert_eq!(counts, vec![(EntityKind::Post, 400)]);
    }

    #[tokio::test]
    async fn test_placements() {
        let db = ForumDb::open_in_memory().await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        for (source, number) in [("p1", 1), ("p2", 2), ("p5", 5)] {
            insert_placement(
                &mut conn,
                "ns",
                source,
                PostPlacement {
                    topic_id: 3,
                    post_number: number,
                },
            )
            .await
            .unwrap();
        }
        drop(conn);

        let p2 = get_placement(db.pool(), "ns", "p2").await.unwrap();
        assert_eq!(
            p2,
            Some(PostPlacement {
                topic_id: 3,
                post_number: 2
            })
        );
        assert_eq!(max_post_number(db.pool(), "ns", 3).await.unwrap(), Some(5));
        assert_eq!(max_post_number(db.pool(), "ns", 4).await.unwrap(), None);

        let many = get_placements(
            db.pool(),
            "ns",
            &["p1".to_string(), "p5".to_string(), "nope".to_string()],
        )
        .await
        .unwrap();
        assert_eq!(many.len(), 2);
    }
}
