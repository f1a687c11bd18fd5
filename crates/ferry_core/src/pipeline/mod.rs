//! Import pipeline
//!
//! Runs the stages in dependency order (groups, users, accounts, categories,
//! topics, replies). Every stage goes through the same driver:
//!
//! 1. read a batch from the source
//! 2. drop repeats within the batch
//! 3. drop records the identity map already knows about
//! 4. import the rest one by one, resolving foreign keys first and recording
//!    the mapping only after the target accepted the record
//!
//! Record-level failures are reported and skipped; anything else ends the run.
//! Nothing is mapped for a failed record, so a re-run retries it.

mod inspect;
mod report;
mod stages;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ferry_db::EntityKind;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::ImportConfig;
use crate::error::Result;
use crate::identity::IdentityMap;
use crate::records::{AuthorRef, Markup, SourcePost};
use crate::sources::{ImportSources, RecordSource};
use crate::target::TargetPlatform;
use crate::transcode::{TranscodedBody, Transcoder};

pub use inspect::{Inspector, AFTER_FILE, BEFORE_FILE};
pub use report::{SkippedRecord, Stage, StageReport};

/// What happened to one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    /// The target already had it; nothing was written.
    AlreadyPresent,
    /// Dry run: the body went to the inspection files.
    Inspected,
}

/// A record type the stage driver can import.
#[async_trait]
pub trait StageRecord: Send + Sync + Sized + 'static {
    /// Whether records of this type are identity-mapped and can be filtered
    /// with `existing_batch`.
    const MAPPED: bool = true;

    fn source_id(&self) -> &str;

    /// Key used to drop repeats within a stage.
    fn natural_key(&self) -> String {
        self.source_id().to_string()
    }

    async fn import(
        self,
        pipeline: &ImportPipeline,
        stage: Stage,
        report: &mut StageReport,
    ) -> Result<Outcome>;
}

/// Settings the pipeline needs from the configuration.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub batch_size: usize,
    pub dry_run: bool,
    pub inspect_dir: PathBuf,
    pub missing_title: String,
}

impl From<&ImportConfig> for PipelineSettings {
    fn from(config: &ImportConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            dry_run: config.dry_run,
            inspect_dir: config.inspect_dir.clone(),
            missing_title: config.missing_title.clone(),
        }
    }
}

#[derive(Debug)]
pub struct ImportPipeline {
    identity: Arc<dyn IdentityMap>,
    target: Arc<dyn TargetPlatform>,
    transcoder: Transcoder,
    settings: PipelineSettings,
    inspector: Option<Inspector>,
    placeholder: OnceCell<i64>,
    stop: Arc<AtomicBool>,
}

impl ImportPipeline {
    pub fn new(
        identity: Arc<dyn IdentityMap>,
        target: Arc<dyn TargetPlatform>,
        transcoder: Transcoder,
        settings: PipelineSettings,
    ) -> Result<Self> {
        let (transcoder, inspector) = if settings.dry_run {
            (
                transcoder.strict(true),
                Some(Inspector::create(&settings.inspect_dir)?),
            )
        } else {
            (transcoder, None)
        };

        Ok(Self {
            identity,
            target,
            transcoder,
            settings,
            inspector,
            placeholder: OnceCell::new(),
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn from_config(
        identity: Arc<dyn IdentityMap>,
        target: Arc<dyn TargetPlatform>,
        config: &ImportConfig,
    ) -> Result<Self> {
        Self::new(
            identity,
            target,
            Transcoder::new(&config.transcode_options()),
            PipelineSettings::from(config),
        )
    }

    /// Flag that stops the pipeline before its next batch.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn identity(&self) -> &dyn IdentityMap {
        self.identity.as_ref()
    }

    pub fn target(&self) -> &dyn TargetPlatform {
        self.target.as_ref()
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn is_dry_run(&self) -> bool {
        self.settings.dry_run
    }

    /// Run every stage that has a source.
    pub async fn run(&self, mut sources: ImportSources) -> Result<Vec<StageReport>> {
        let mut reports = Vec::new();

        macro_rules! stage {
            ($stage:expr, $source:expr) => {
                if let Some(mut source) = $source.take() {
                    let report = self.run_stage($stage, source.as_mut()).await?;
                    let stopped = report.stopped;
                    reports.push(report);
                    if stopped {
                        return Ok(reports);
                    }
                }
            };
        }

        stage!(Stage::Groups, sources.groups);
        stage!(Stage::Users, sources.users);
        stage!(Stage::Accounts, sources.accounts);
        stage!(Stage::Categories, sources.categories);
        stage!(Stage::Topics, sources.topics);
        stage!(Stage::Replies, sources.replies);

        if let Some(inspector) = &self.inspector {
            inspector.flush()?;
            info!(dir = %inspector.dir().display(), "dry run output written");
        }
        Ok(reports)
    }

    /// Drive one stage to completion.
    pub async fn run_stage<R: StageRecord>(
        &self,
        stage: Stage,
        source: &mut dyn RecordSource<R>,
    ) -> Result<StageReport> {
        let mut report = StageReport::new(stage);
        info!(%stage, source = source.name(), "starting stage");

        loop {
            if self.is_stopped() {
                warn!(%stage, "stop requested, ending stage before next batch");
                report.stopped = true;
                break;
            }

            let Some(batch) = source.next_batch(self.settings.batch_size).await? else {
                break;
            };
            if batch.is_empty() {
                break;
            }
            report.seen += batch.len();

            // Repeats across batches are caught by the identity map instead.
            let mut seen_keys: HashSet<String> = HashSet::with_capacity(batch.len());
            let mut fresh = Vec::with_capacity(batch.len());
            for record in batch {
                if seen_keys.insert(record.natural_key()) {
                    fresh.push(record);
                } else {
                    report.duplicates += 1;
                }
            }

            let pending = if R::MAPPED {
                let ids: HashSet<String> =
                    fresh.iter().map(|r| r.source_id().to_string()).collect();
                let existing = self.identity.existing_batch(stage.kind(), &ids).await?;
                if existing.len() == ids.len() && !ids.is_empty() {
                    debug!(%stage, records = ids.len(), "batch already imported");
                }
                report.already_imported += existing.len();
                fresh
                    .into_iter()
                    .filter(|r| !existing.contains(r.source_id()))
                    .collect()
            } else {
                fresh
            };

            for record in pending {
                let source_id = record.source_id().to_string();
                match record.import(self, stage, &mut report).await {
                    Ok(Outcome::Created) => report.created += 1,
                    Ok(Outcome::AlreadyPresent) => report.already_imported += 1,
                    Ok(Outcome::Inspected) => report.inspected += 1,
                    Err(e) if e.is_record_level() => {
                        warn!(%stage, source_id = %source_id, error = %e, "skipping record");
                        report.skip(source_id, e.to_string());
                    }
                    Err(e) => return Err(e),
                }
            }

            info!(
                %stage,
                seen = report.seen,
                created = report.created,
                skipped = report.skipped.len(),
                "batch done"
            );
        }

        info!("{}", report);
        Ok(report)
    }

    // ========== Helpers for stages ==========

    /// The placeholder user, created on first use.
    async fn placeholder_user(&self) -> Result<i64> {
        self.placeholder
            .get_or_try_init(|| self.target.placeholder_user())
            .await
            .copied()
    }

    /// Resolve an author reference without falling back.
    async fn lookup_author(&self, author: &AuthorRef) -> Result<Option<i64>> {
        match author {
            AuthorRef::SourceId(id) => self.identity.resolve(EntityKind::User, id).await,
            AuthorRef::Email(email) => self.target.find_user_by_email(email).await,
            AuthorRef::Unknown => Ok(None),
        }
    }

    /// Resolve an author, using the placeholder user when attribution is lost.
    async fn author_or_placeholder(
        &self,
        author: &AuthorRef,
        report: &mut StageReport,
    ) -> Result<i64> {
        if let Some(id) = self.lookup_author(author).await? {
            return Ok(id);
        }
        debug!(?author, "author not found, using placeholder user");
        report.fallbacks += 1;
        self.placeholder_user().await
    }

    /// Transcode a post body. Markdown sources pass through untouched.
    async fn transcode_body(
        &self,
        post: &SourcePost,
        topic_id: Option<i64>,
    ) -> Result<TranscodedBody> {
        if post.markup == Markup::Markdown {
            return Ok(TranscodedBody {
                text: post.raw.clone(),
                reply_to_post_number: None,
            });
        }

        let mentioned = self.transcoder.mentioned_posts(&post.raw);
        let table = self.identity.locate_posts(&mentioned).await?;
        Ok(self.transcoder.transcode(&post.raw, &table, topic_id)?)
    }

    fn inspect(&self, post: &SourcePost, body: &TranscodedBody) -> Result<Outcome> {
        if let Some(inspector) = &self.inspector {
            inspector.record(&post.source_id, &post.raw, &body.text)?;
        }
        Ok(Outcome::Inspected)
    }
}
