use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use crate::models::{JobRecord, JOB_COLUMNS};
use crate::utils::error::Result;

/// File name of the job queue inside `directories.records_dir`.
pub const RECORD_FILE: &str = "record.csv";
/// File name of the claim log inside `directories.records_dir`.
pub const CLAIM_LOG_FILE: &str = "log.csv";

const CLAIM_LOG_COLUMNS: [&str; 6] = ["time", "url", "jsCode", "message", "state", "cookie"];

/// Persistence for the job queue. Rows are always loaded and saved as a whole.
pub trait JobStore: Send + Sync {
    fn load(&self) -> Result<Vec<JobRecord>>;
    fn save(&self, jobs: &[JobRecord]) -> Result<()>;
}

/// Job queue stored as a headered CSV file.
#[derive(Debug, Clone)]
pub struct CsvJobStore {
    path: PathBuf,
}

impl CsvJobStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(records_dir: &Path) -> Self {
        Self::new(records_dir.join(RECORD_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the file with just a header row if it does not exist yet.
    pub fn ensure_exists(&self) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(&self.path)?;
        writer.write_record(JOB_COLUMNS)?;
        writer.flush()?;
        tracing::info!("Created job record file {}", self.path.display());
        Ok(())
    }
}

impl JobStore for CsvJobStore {
    fn load(&self) -> Result<Vec<JobRecord>> {
        self.ensure_exists()?;
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)?;

        let mut jobs = Vec::new();
        for row in reader.deserialize() {
            jobs.push(row?);
        }
        Ok(jobs)
    }

    fn save(&self, jobs: &[JobRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(&self.path)?;
        if jobs.is_empty() {
            writer.write_record(JOB_COLUMNS)?;
        }
        for job in jobs {
            writer.serialize(job)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// One reward-claim attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimLogEntry {
    pub time: String,
    pub url: String,
    pub js_code: String,
    pub message: String,
    pub state: String,
    pub cookie: String,
}

/// Append-only CSV log of claim attempts.
#[derive(Debug, Clone)]
pub struct ClaimLog {
    path: PathBuf,
}

impl ClaimLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(records_dir: &Path) -> Self {
        Self::new(records_dir.join(CLAIM_LOG_FILE))
    }

    pub fn append(&self, entry: &ClaimLogEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let is_new = fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if is_new {
            writer.write_record(CLAIM_LOG_COLUMNS)?;
        }
        writer.serialize(entry)?;
        writer.flush()?;
        Ok(())
    }

    pub fn read_all(&self) -> Result<Vec<ClaimLogEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&self.path)?;
        let mut entries = Vec::new();
        for row in reader.deserialize() {
            entries.push(row?);
        }
        Ok(entries)
    }
}
