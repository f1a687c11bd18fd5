//! Identity map inspection.

use ferry_core::{EntityKind, FerryConfig, IdentityMap};
use ferry_db::queries;
use miette::{miette, Result};

use crate::output::Output;

fn parse_kind(kind: &str) -> Result<EntityKind> {
    kind.parse::<EntityKind>().map_err(|e| {
        miette!(
            help = "one of: group, user, category, topic, post",
            "{e}"
        )
    })
}

pub async fn lookup(config: &FerryConfig, kind: &str, source_id: &str, output: &Output) -> Result<()> {
    let kind = parse_kind(kind)?;
    let (_db, identity) = super::open_identity(config).await?;

    let Some(target_id) = identity.resolve(kind, source_id).await? else {
        output.warning(&format!("{kind} {source_id} has not been imported"));
        return Ok(());
    };

    output.success(&format!("{kind} {source_id} -> {target_id}"));
    if kind == EntityKind::Post {
        if let Some(placement) = identity.locate_post(source_id).await? {
            output.kv("topic", &placement.topic_id.to_string());
            output.kv("post number", &placement.post_number.to_string());
        }
    }
    Ok(())
}

pub async fn thread(config: &FerryConfig, first_post: &str, output: &Output) -> Result<()> {
    let (_db, identity) = super::open_identity(config).await?;
    match identity.resolve_thread(first_post).await? {
        Some(thread) => {
            output.success(&format!("Thread of post {first_post}"));
            output.kv("topic", &thread.topic_id.to_string());
            output.kv("first post number", &thread.first_post_number.to_string());
            output.kv("next post number", &thread.next_post_number.to_string());
        }
        None => output.warning(&format!("post {first_post} has not been imported")),
    }
    Ok(())
}

pub async fn list(config: &FerryConfig, kind: &str, limit: i64, output: &Output) -> Result<()> {
    let kind = parse_kind(kind)?;
    let (db, identity) = super::open_identity(config).await?;
    let mappings =
        queries::list_mappings(db.pool(), identity.namespace(), kind, limit).await?;

    output.section(&format!("{kind} mappings in '{}'", identity.namespace()));
    if mappings.is_empty() {
        output.status("none");
    }
    for mapping in mappings {
        output.list_item(&format!(
            "{} -> {}  ({})",
            mapping.source_id,
            mapping.target_id,
            mapping.created_at.format("%Y-%m-%d %H:%M:%S")
        ));
    }
    Ok(())
}

pub async fn stats(config: &FerryConfig, output: &Output) -> Result<()> {
    let (db, identity) = super::open_identity(config).await?;

    output.section(&format!("Identity map '{}'", identity.namespace()));
    let counts = identity.counts().await?;
    for kind in EntityKind::ALL {
        let count = counts
            .iter()
            .find(|(k, _)| *k == kind)
            .map_or(0, |(_, n)| *n);
        output.kv(kind.as_str(), &count.to_string());
    }

    let stats = db.stats().await?;
    output.section("Database");
    output.kv("path", &config.database.path.display().to_string());
    output.kv("mappings", &stats.mapping_count.to_string());
    output.kv("groups", &stats.group_count.to_string());
    output.kv("users", &stats.user_count.to_string());
    output.kv("categories", &stats.category_count.to_string());
    output.kv("topics", &stats.topic_count.to_string());
    output.kv("posts", &stats.post_count.to_string());
    Ok(())
}
