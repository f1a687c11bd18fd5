//! Ferry Core - Forum Migration Engine
//!
//! This crate moves a legacy forum's content (groups, users, categories,
//! topics, replies) into a target forum. Imports are resumable and
//! idempotent: every created record is written to an identity map, and a
//! re-run skips whatever the map already knows.
//!
//! - [`identity`] - durable `(kind, source id) -> target id` map
//! - [`vault`] - placeholder store protecting finished markup from later passes
//! - [`transcode`] - legacy pseudo-XML/BBCode to Markdown
//! - [`pipeline`] - staged, batched import driver
//! - [`target`] - creation API of the destination forum
//! - [`sources`] - JSON, CSV and Flarum readers

pub mod config;
pub mod error;
pub mod identity;
pub mod pipeline;
pub mod records;
pub mod sources;
pub mod target;
pub mod transcode;
pub mod vault;

pub use config::FerryConfig;
pub use error::{ConfigError, CoreError, Result};
pub use identity::{IdentityMap, SqliteIdentityMap, TopicThread};
pub use pipeline::{ImportPipeline, PipelineSettings, Stage, StageReport};
pub use sources::{ImportSources, RecordSource, VecSource};
pub use target::{SqliteForum, TargetPlatform};
pub use transcode::{TranscodedBody, Transcoder};
pub use vault::{PlaceholderVault, VaultError};

pub use ferry_db::{EntityKind, ForumDb, PostPlacement};
