//! Source readers
//!
//! Each reader turns one kind of legacy export into canonical records and
//! hands them to the pipeline through [`RecordSource`], in batches.

pub mod csv;
#[cfg(feature = "flarum")]
pub mod flarum;
pub mod json;

use async_trait::async_trait;

use crate::error::Result;
use crate::records::{SourceAccount, SourceCategory, SourceGroup, SourcePost, SourceUser};

/// A finite or paginated sequence of source records.
#[async_trait]
pub trait RecordSource<R: Send>: Send {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Up to `limit` records, or `None` once the source is exhausted.
    async fn next_batch(&mut self, limit: usize) -> Result<Option<Vec<R>>>;
}

/// Records already loaded into memory.
#[derive(Debug)]
pub struct VecSource<R> {
    name: String,
    records: std::vec::IntoIter<R>,
}

impl<R> VecSource<R> {
    pub fn new(name: impl Into<String>, records: Vec<R>) -> Self {
        Self {
            name: name.into(),
            records: records.into_iter(),
        }
    }
}

#[async_trait]
impl<R: Send> RecordSource<R> for VecSource<R> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn next_batch(&mut self, limit: usize) -> Result<Option<Vec<R>>> {
        let batch: Vec<R> = self.records.by_ref().take(limit.max(1)).collect();
        if batch.is_empty() {
            Ok(None)
        } else {
            Ok(Some(batch))
        }
    }
}

pub type BoxedSource<R> = Box<dyn RecordSource<R>>;

/// Everything one import run reads, per stage. Missing sources skip their stage.
#[derive(Default)]
pub struct ImportSources {
    pub groups: Option<BoxedSource<SourceGroup>>,
    pub users: Option<BoxedSource<SourceUser>>,
    pub accounts: Option<BoxedSource<SourceAccount>>,
    pub categories: Option<BoxedSource<SourceCategory>>,
    /// Opening posts.
    pub topics: Option<BoxedSource<SourcePost>>,
    pub replies: Option<BoxedSource<SourcePost>>,
}

impl std::fmt::Debug for ImportSources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = |s: Option<&str>| s.unwrap_or("-").to_string();
        f.debug_struct("ImportSources")
            .field("groups", &name(self.groups.as_ref().map(|s| s.name())))
            .field("users", &name(self.users.as_ref().map(|s| s.name())))
            .field("accounts", &name(self.accounts.as_ref().map(|s| s.name())))
            .field("categories", &name(self.categories.as_ref().map(|s| s.name())))
            .field("topics", &name(self.topics.as_ref().map(|s| s.name())))
            .field("replies", &name(self.replies.as_ref().map(|s| s.name())))
            .finish()
    }
}
