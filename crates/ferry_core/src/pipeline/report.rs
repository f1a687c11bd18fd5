use std::fmt;

use ferry_db::EntityKind;
use serde::{Deserialize, Serialize};

/// Import stages, in the order a run executes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Groups,
    Users,
    /// External logins; needs users, is not identity-mapped.
    Accounts,
    Categories,
    Topics,
    Replies,
}

impl Stage {
    /// Kind of entity the stage writes to the identity map.
    pub fn kind(&self) -> EntityKind {
        match self {
            Stage::Groups => EntityKind::Group,
            Stage::Users | Stage::Accounts => EntityKind::User,
            Stage::Categories => EntityKind::Category,
            Stage::Topics | Stage::Replies => EntityKind::Post,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Groups => "groups",
            Stage::Users => "users",
            Stage::Accounts => "accounts",
            Stage::Categories => "categories",
            Stage::Topics => "topics",
            Stage::Replies => "replies",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record left out of the import, with enough context to fix and re-run it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRecord {
    pub source_id: String,
    pub reason: String,
}

/// Counters for one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    /// Records read from the source.
    pub seen: usize,
    /// Repeats of a record already seen this stage.
    pub duplicates: usize,
    /// Records mapped by an earlier run (or already present on the target).
    pub already_imported: usize,
    pub created: usize,
    /// Bodies written to the inspection files during a dry run.
    pub inspected: usize,
    /// Soft dependencies replaced by a fallback.
    pub fallbacks: usize,
    pub skipped: Vec<SkippedRecord>,
    /// The stop flag ended the stage early.
    pub stopped: bool,
}

impl StageReport {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            seen: 0,
            duplicates: 0,
            already_imported: 0,
            created: 0,
            inspected: 0,
            fallbacks: 0,
            skipped: Vec::new(),
            stopped: false,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.stage.kind()
    }

    pub fn skip(&mut self, source_id: impl Into<String>, reason: impl Into<String>) {
        self.skipped.push(SkippedRecord {
            source_id: source_id.into(),
            reason: reason.into(),
        });
    }
}

impl fmt::Display for StageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} seen, {} created, {} already imported, {} duplicates, {} skipped",
            self.stage,
            self.seen,
            self.created,
            self.already_imported,
            self.duplicates,
            self.skipped.len()
        )?;
        if self.fallbacks > 0 {
            write!(f, ", {} fallbacks", self.fallbacks)?;
        }
        if self.inspected > 0 {
            write!(f, ", {} inspected", self.inspected)?;
        }
        if self.stopped {
            f.write_str(" (stopped)")?;
        }
        Ok(())
    }
}
