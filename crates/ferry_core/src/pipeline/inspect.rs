//! Dry-run output: raw and converted bodies side by side.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{CoreError, Result};

pub const BEFORE_FILE: &str = "ferry.before.txt";
pub const AFTER_FILE: &str = "ferry.after.txt";

#[derive(Debug)]
pub struct Inspector {
    dir: PathBuf,
    before: Mutex<BufWriter<File>>,
    after: Mutex<BufWriter<File>>,
}

fn create(path: PathBuf) -> Result<Mutex<BufWriter<File>>> {
    let file = File::create(&path).map_err(|e| CoreError::io(&path, e))?;
    Ok(Mutex::new(BufWriter::new(file)))
}

fn append(writer: &Mutex<BufWriter<File>>, path: PathBuf, source_id: &str, body: &str) -> Result<()> {
    let mut writer = writer.lock();
    write!(writer, "\n\n--- record {source_id}\n\n{body}").map_err(|e| CoreError::io(path, e))
}

impl Inspector {
    /// Create (truncating) both files in `dir`.
    pub fn create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| CoreError::io(dir, e))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            before: create(dir.join(BEFORE_FILE))?,
            after: create(dir.join(AFTER_FILE))?,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record(&self, source_id: &str, raw: &str, converted: &str) -> Result<()> {
        append(&self.before, self.dir.join(BEFORE_FILE), source_id, raw)?;
        append(&self.after, self.dir.join(AFTER_FILE), source_id, converted)
    }

    pub fn flush(&self) -> Result<()> {
        self.before
            .lock()
            .flush()
            .map_err(|e| CoreError::io(self.dir.join(BEFORE_FILE), e))?;
        self.after
            .lock()
            .flush()
            .map_err(|e| CoreError::io(self.dir.join(AFTER_FILE), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_side_by_side() {
        let dir = tempfile::tempdir().unwrap();
        let inspector = Inspector::create(dir.path()).unwrap();
        inspector.record("12", "<b>raw</b>", "**raw**").unwrap();
        inspector.flush().unwrap();

        let before = std::fs::read_to_string(dir.path().join(BEFORE_FILE)).unwrap();
        let after = std::fs::read_to_string(dir.path().join(AFTER_FILE)).unwrap();
        assert_eq!(before, "\n\n--- record 12\n\n<b>raw</b>");
        assert_eq!(after, "\n\n--- record 12\n\n**raw**");
    }
}
