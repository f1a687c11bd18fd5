use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use ferry_db::{queries, EntityKind, ForumDb, MappingWrite, PostPlacement};
use tracing::debug;

use super::{IdentityMap, TopicThread};
use crate::error::{CoreError, Result};

/// Identity map stored in the ferry SQLite database, scoped to one namespace.
#[derive(Debug, Clone)]
pub struct SqliteIdentityMap {
    db: ForumDb,
    namespace: String,
}

impl SqliteIdentityMap {
    pub fn new(db: ForumDb, namespace: impl Into<String>) -> Self {
        Self {
            db,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

fn check_write(kind: EntityKind, source_id: &str, target_id: i64, write: MappingWrite) -> Result<()> {
    match write {
        MappingWrite::Inserted | MappingWrite::Unchanged => Ok(()),
        MappingWrite::SourceTaken { existing_target } => Err(CoreError::DuplicateMapping {
            kind,
            source_id: source_id.to_string(),
            detail: format!("already mapped to {existing_target}, refusing {target_id}"),
        }),
        MappingWrite::TargetTaken { holder } => Err(CoreError::DuplicateMapping {
            kind,
            source_id: source_id.to_string(),
            detail: format!("target {target_id} is already claimed by source id {holder}"),
        }),
    }
}

#[async_trait]
impl IdentityMap for SqliteIdentityMap {
    async fn record(&self, kind: EntityKind, source_id: &str, target_id: i64) -> Result<()> {
        let mut conn = self.db.pool().acquire().await.map_err(ferry_db::DbError::from)?;
        let write =
            queries::insert_mapping(&mut *conn, &self.namespace, kind, source_id, target_id).await?;
        check_write(kind, source_id, target_id, write)
    }

    async fn record_post(
        &self,
        source_id: &str,
        post_id: i64,
        placement: PostPlacement,
        topic_source_id: Option<&str>,
    ) -> Result<()> {
        let mut tx = self.db.pool().begin().await.map_err(ferry_db::DbError::from)?;

        let write =
            queries::insert_mapping(&mut *tx, &self.namespace, EntityKind::Post, source_id, post_id)
                .await?;
        // Dropping the transaction rolls back anything written so far.
        check_write(EntityKind::Post, source_id, post_id, write)?;

        queries::insert_placement(&mut *tx, &self.namespace, source_id, placement).await?;

        if let Some(topic_source_id) = topic_source_id {
            let write = queries::insert_mapping(
                &mut *tx,
                &self.namespace,
                EntityKind::Topic,
                topic_source_id,
                placement.topic_id,
            )
            .await?;
            check_write(EntityKind::Topic, topic_source_id, placement.topic_id, write)?;
        }

        tx.commit().await.map_err(ferry_db::DbError::from)?;
        Ok(())
    }

    async fn resolve(&self, kind: EntityKind, source_id: &str) -> Result<Option<i64>> {
        Ok(queries::get_target_id(self.db.pool(), &self.namespace, kind, source_id).await?)
    }

    async fn source_of(&self, kind: EntityKind, target_id: i64) -> Result<Option<String>> {
        Ok(queries::get_source_id(self.db.pool(), &self.namespace, kind, target_id).await?)
    }

    async fn existing_batch(
        &self,
        kind: EntityKind,
        source_ids: &HashSet<String>,
    ) -> Result<HashSet<String>> {
        if source_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let ids: Vec<String> = source_ids.iter().cloned().collect();
        let found =
            queries::existing_source_ids(self.db.pool(), &self.namespace, kind, &ids).await?;
        debug!(%kind, requested = ids.len(), found = found.len(), "existing batch check");
        Ok(found.into_iter().collect())
    }

    async fn locate_post(&self, source_id: &str) -> Result<Option<PostPlacement>> {
        Ok(queries::get_placement(self.db.pool(), &self.namespace, source_id).await?)
    }

    async fn locate_posts(&self, source_ids: &[String]) -> Result<HashMap<String, PostPlacement>> {
        if source_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let found = queries::get_placements(self.db.pool(), &self.namespace, source_ids).await?;
        Ok(found.into_iter().collect())
    }

    async fn resolve_thread(&self, first_post_source_id: &str) -> Result<Option<TopicThread>> {
        let Some(placement) = self.locate_post(first_post_source_id).await? else {
            return Ok(None);
        };
        let highest = queries::max_post_number(self.db.pool(), &self.namespace, placement.topic_id)
            .await?
            .unwrap_or(placement.post_number);

        Ok(Some(TopicThread {
            topic_id: placement.topic_id,
            first_post_number: placement.post_number,
            next_post_number: highest + 1,
        }))
    }

    async fn counts(&self) -> Result<Vec<(EntityKind, i64)>> {
        Ok(queries::count_mappings(self.db.pool(), &self.namespace).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn map() -> SqliteIdentityMap {
        let db = ForumDb::open_in_memory().await.unwrap();
        SqliteIdentityMap::new(db, "test")
    }

    #[tokio::test]
    async fn test_record_is_idempotent() {
        let map = map().await;
        map.record(EntityKind::User, "u1", 10).await.unwrap();
        map.record(EntityKind::User, "u1", 10).await.unwrap();
        assert_eq!(map.resolve(EntityKind::User, "u1").await.unwrap(), Some(10));
        assert_eq!(map.source_of(EntityKind::User, 10).await.unwrap().as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn test_conflicting_record_keeps_original() {
        let map = map().await;
        map.record(EntityKind::User, "u1", 10).await.unwrap();

        let err = map.record(EntityKind::User, "u1", 11).await.unwrap_err();
        assert!(matches!(err, CoreError::DuplicateMapping { .. }));
        assert!(err.is_record_level());

        let err = map.record(EntityKind::User, "u2", 10).await.unwrap_err();
        assert!(matches!(err, CoreError::DuplicateMapping { .. }));

        assert_eq!(map.resolve(EntityKind::User, "u1").await.unwrap(), Some(10));
        assert_eq!(map.resolve(EntityKind::User, "u2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_kinds_are_independent() {
        let map = map().await;
        map.record(EntityKind::User, "1", 5).await.unwrap();
        map.record(EntityKind::Group, "1", 5).await.unwrap();
        assert_eq!(map.resolve(EntityKind::Category, "1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_existing_batch() {
        let map = map().await;
        for i in 0..5 {
            map.record(EntityKind::User, &i.to_string(), 100 + i).await.unwrap();
        }

        let wanted: HashSet<String> = (3..8).map(|i| i.to_string()).collect();
        let found = map.existing_batch(EntityKind::User, &wanted).await.unwrap();
        let expected: HashSet<String> = ["3", "4"].iter().map(|s| s.to_string()).collect();
        assert_eq!(found, expected);

        assert!(map.existing_batch(EntityKind::User, &HashSet::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_post_and_resolve_thread() {
        let map = map().await;
        let opening = PostPlacement {
            topic_id: 7,
            post_number: 1,
        };
        map.record_post("P1", 70, opening, Some("D1")).await.unwrap();

        let thread = map.resolve_thread("P1").await.unwrap().unwrap();
        assert_eq!(thread.topic_id, 7);
        assert_eq!(thread.first_post_number, 1);
        assert_eq!(thread.next_post_number, 2);
        assert_eq!(map.resolve(EntityKind::Topic, "D1").await.unwrap(), Some(7));

        map.record_post(
            "P2",
            71,
            PostPlacement {
                topic_id: 7,
                post_number: 2,
            },
            None,
        )
        .await
        .unwrap();

        let thread = map.resolve_thread("P1").await.unwrap().unwrap();
        assert_eq!(thread.next_post_number, 3);
        assert!(map.resolve_thread("unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_record_post_conflict_rolls_back() {
        let map = map().await;
        map.record(EntityKind::Topic, "D1", 99).await.unwrap();

        let placement = PostPlacement {
            topic_id: 7,
            post_number: 1,
        };
        let err = map.record_post("P1", 70, placement, Some("D1")).await.unwrap_err();
        assert!(matches!(err, CoreError::DuplicateMapping { kind: EntityKind::Topic, .. }));

        assert_eq!(map.resolve(EntityKind::Post, "P1").await.unwrap(), None);
        assert!(map.locate_post("P1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_namespaces_do_not_leak() {
        let db = ForumDb::open_in_memory().await.unwrap();
        let a = SqliteIdentityMap::new(db.clone(), "a");
        let b = SqliteIdentityMap::new(db, "b");

        a.record(EntityKind::User, "1", 10).await.unwrap();
        assert_eq!(b.resolve(EntityKind::User, "1").await.unwrap(), None);
        b.record(EntityKind::User, "1", 10).await.unwrap();
        assert_eq!(a.counts().await.unwrap(), vec![(EntityKind::User, 1)]);
    }
}
