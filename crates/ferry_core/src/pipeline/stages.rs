//! Per-record import logic for each stage.

use async_trait::async_trait;
use ferry_db::EntityKind;
use tracing::{debug, warn};

use super::{ImportPipeline, Outcome, Stage, StageRecord, StageReport};
use crate::error::{CoreError, Result};
use crate::records::{
    parse_timestamp, timestamp_or_now, SourceAccount, SourceCategory, SourceGroup,
    SourcePost, SourceUser, ThreadRef,
};
use crate::target::{NewCategory, NewPost, NewUser, PostTarget};
use crate::transcode::normalize_title;

#[async_trait]
impl StageRecord for SourceGroup {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn import(
        self,
        pipeline: &ImportPipeline,
        _stage: Stage,
        _report: &mut StageReport,
    ) -> Result<Outcome> {
        let target_id = pipeline.target().create_group(&self.name).await?;
        pipeline
            .identity()
            .record(EntityKind::Group, &self.source_id, target_id)
            .await?;
        Ok(Outcome::Created)
    }
}

#[async_trait]
impl StageRecord for SourceUser {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn import(
        self,
        pipeline: &ImportPipeline,
        _stage: Stage,
        report: &mut StageReport,
    ) -> Result<Outcome> {
        let kind = EntityKind::User;
        let created_at =
            timestamp_or_now(kind, &self.source_id, "created_at", self.created_at.as_deref())?;
        let last_seen_at = match self.last_seen.as_deref().filter(|v| !v.trim().is_empty()) {
            Some(value) => Some(parse_timestamp(kind, &self.source_id, "last_seen", value)?),
            None => None,
        };
        if self.username.trim().is_empty() {
            return Err(CoreError::invalid_field(
                kind,
                &self.source_id,
                "username",
                "must not be blank",
            ));
        }

        let user = NewUser {
            username: self.username.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            bio: self.bio.clone(),
            location: self.location.clone(),
            created_at,
            last_seen_at,
        };
        let user_id = pipeline.target().create_user(&user).await?;
        pipeline
            .identity()
            .record(kind, &self.source_id, user_id)
            .await?;

        // Memberships are best effort; the user itself is already in.
        for group_source_id in &self.group_ids {
            let Some(group_id) = pipeline
                .identity()
                .resolve(EntityKind::Group, group_source_id)
                .await?
            else {
                warn!(
                    user = %self.source_id,
                    group = %group_source_id,
                    "group not imported, membership dropped"
                );
                report.fallbacks += 1;
                continue;
            };
            match pipeline.target().add_group_member(group_id, user_id).await {
                Ok(_) => {}
                Err(e) if e.is_record_level() => {
                    warn!(user = %self.source_id, group_id, error = %e, "membership rejected");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(Outcome::Created)
    }
}

#[async_trait]
impl StageRecord for SourceAccount {
    const MAPPED: bool = false;

    fn source_id(&self) -> &str {
        &self.user_source_id
    }

    fn natural_key(&self) -> String {
        format!("{}:{}", self.provider, self.provider_uid)
    }

    async fn import(
        self,
        pipeline: &ImportPipeline,
        _stage: Stage,
        _report: &mut StageReport,
    ) -> Result<Outcome> {
        let user_id = pipeline
            .identity()
            .resolve(EntityKind::User, &self.user_source_id)
            .await?
            .ok_or_else(|| CoreError::MissingDependency {
                kind: EntityKind::User,
                source_id: self.user_source_id.clone(),
                dependency: EntityKind::User,
                dependency_id: self.user_source_id.clone(),
            })?;

        let created = pipeline
            .target()
            .create_associated_account(user_id, &self.provider, &self.provider_uid)
            .await?;
        Ok(if created {
            Outcome::Created
        } else {
            Outcome::AlreadyPresent
        })
    }
}

#[async_trait]
impl StageRecord for SourceCategory {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn import(
        self,
        pipeline: &ImportPipeline,
        _stage: Stage,
        report: &mut StageReport,
    ) -> Result<Outcome> {
        let user_id = pipeline.lookup_author(&self.owner).await?;
        if user_id.is_none() {
            debug!(category = %self.source_id, owner = ?self.owner, "owner not found");
            report.fallbacks += 1;
        }

        let parent_id = match &self.parent_source_id {
            Some(parent) => {
                let resolved = pipeline
                    .identity()
                    .resolve(EntityKind::Category, parent)
                    .await?;
                if resolved.is_none() {
                    warn!(
                        category = %self.source_id,
                        parent = %parent,
                        "parent category not imported, creating at top level"
                    );
                    report.fallbacks += 1;
                }
                resolved
            }
            None => None,
        };

        let category = NewCategory {
            name: self.name.clone(),
            description: self.description.clone(),
            parent_id,
            user_id,
            created_at: chrono::Utc::now(),
        };
        let category_id = pipeline.target().create_category(&category).await?;
        pipeline
            .identity()
            .record(EntityKind::Category, &self.source_id, category_id)
            .await?;
        Ok(Outcome::Created)
    }
}

#[async_trait]
impl StageRecord for SourcePost {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn import(
        self,
        pipeline: &ImportPipeline,
        stage: Stage,
        report: &mut StageReport,
    ) -> Result<Outcome> {
        let kind = EntityKind::Post;
        if self.opens_topic() != (stage == Stage::Topics) {
            return Err(CoreError::invalid_field(
                kind,
                &self.source_id,
                "thread",
                format!("post does not belong in the {stage} stage"),
            ));
        }
        let created_at =
            timestamp_or_now(kind, &self.source_id, "created_at", self.created_at.as_deref())?;

        match &self.thread {
            ThreadRef::Opens {
                title,
                category_source_id,
                topic_source_id,
            } => {
                let mut title = normalize_title(title);
                if title.is_empty() {
                    title = pipeline.settings().missing_title.clone();
                }

                let body = pipeline.transcode_body(&self, None).await?;
                if pipeline.is_dry_run() {
                    return pipeline.inspect(&self, &body);
                }

                let category_id = match category_source_id {
                    Some(category) => {
                        let resolved = pipeline
                            .identity()
                            .resolve(EntityKind::Category, category)
                            .await?;
                        if resolved.is_none() {
                            debug!(post = %self.source_id, category = %category, "category not imported");
                            report.fallbacks += 1;
                        }
                        resolved
                    }
                    None => None,
                };
                let user_id = pipeline.author_or_placeholder(&self.author, report).await?;

                let created = pipeline
                    .target()
                    .create_post(&NewPost {
                        user_id,
                        raw: body.text,
                        created_at,
                        target: PostTarget::NewTopic { title, category_id },
                    })
                    .await?;
                pipeline
                    .identity()
                    .record_post(
                        &self.source_id,
                        created.post_id,
                        created.placement(),
                        topic_source_id.as_deref(),
                    )
                    .await?;
                Ok(Outcome::Created)
            }
            ThreadRef::Replies {
                first_post_source_id,
            } => {
                let thread = pipeline
                    .identity()
                    .resolve_thread(first_post_source_id)
                    .await?;

                if pipeline.is_dry_run() {
                    let body = pipeline
                        .transcode_body(&self, thread.map(|t| t.topic_id))
                        .await?;
                    return pipeline.inspect(&self, &body);
                }

                let thread = thread.ok_or_else(|| CoreError::MissingDependency {
                    kind,
                    source_id: self.source_id.clone(),
                    dependency: EntityKind::Post,
                    dependency_id: first_post_source_id.clone(),
                })?;

                let body = pipeline
                    .transcode_body(&self, Some(thread.topic_id))
                    .await?;
                let user_id = pipeline.author_or_placeholder(&self.author, report).await?;

                let created = pipeline
                    .target()
                    .create_post(&NewPost {
                        user_id,
                        raw: body.text,
                        created_at,
                        target: PostTarget::Reply {
                            topic_id: thread.topic_id,
                            reply_to_post_number: body.reply_to_post_number,
                        },
                    })
                    .await?;
                pipeline
                    .identity()
                    .record_post(&self.source_id, created.post_id, created.placement(), None)
                    .await?;
                Ok(Outcome::Created)
            }
        }
    }
}
