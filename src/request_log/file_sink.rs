//! Local day-file sink
//!
//! Entries are kept in one JSON array per UTC calendar day:
//! `<directory>/requests-YYYY-MM-DD.json`. Each record is the entry plus the
//! `savedAt` time it was written.
//!
//! Appends load the day's array, extend it and rewrite the file through a
//! temporary file and a rename, so readers never observe a partial write.
//! Appends are not synchronised here; the dispatcher's file writer task is
//! the only caller in a running server.

use super::entry::LogEntry;
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

const FILE_PREFIX: &str = "requests-";
const FILE_SUFFIX: &str = ".json";

#[derive(Debug, thiserror::Error)]
pub enum FileSinkError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode day-file {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl FileSinkError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A log entry as stored in a day-file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayFileRecord {
    #[serde(flatten)]
    pub entry: LogEntry,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FileSink {
    directory: PathBuf,
}

impl FileSink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn day_file_path(&self, day: NaiveDate) -> PathBuf {
        self.directory
            .join(format!("{}{}{}", FILE_PREFIX, day.format("%Y-%m-%d"), FILE_SUFFIX))
    }

    pub async fn append(&self, entry: &LogEntry) -> Result<(), FileSinkError> {
        self.append_batch(std::slice::from_ref(entry)).await
    }

    /// Append entries to the day-files of their timestamps
    ///
    /// Each affected day-file is rewritten once.
    pub async fn append_batch(&self, entries: &[LogEntry]) -> Result<(), FileSinkError> {
        if entries.is_empty() {
            return Ok(());
        }

        fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| FileSinkError::io(&self.directory, e))?;

        let saved_at = Utc::now();
        let mut by_day: BTreeMap<NaiveDate, Vec<DayFileRecord>> = BTreeMap::new();
        for entry in entries {
            by_day
                .entry(entry.timestamp.date_naive())
                .or_default()
                .push(DayFileRecord {
                    entry: entry.clone(),
                    saved_at,
                });
        }

        for (day, records) in by_day {
            let path = self.day_file_path(day);
            let mut existing = self.load_for_append(&path).await?;
            existing.extend(records);
            write_atomically(&path, &existing).await?;
        }

        Ok(())
    }

    /// Records from the last `days_back` day-files, newest day first
    ///
    /// Never fails: missing or unreadable day-files are skipped.
    pub async fn read_recent(&self, days_back: u32) -> Vec<DayFileRecord> {
        self.read_days(Utc::now().date_naive(), days_back).await
    }

    /// Records from `days_back` day-files ending at `today`, newest day first
    pub async fn read_days(&self, today: NaiveDate, days_back: u32) -> Vec<DayFileRecord> {
        let mut records = Vec::new();

        for offset in 0..days_back {
            let Some(day) = today.checked_sub_days(Days::new(u64::from(offset))) else {
                break;
            };

            let path = self.day_file_path(day);
            match read_day_file(&path).await {
                Ok(Some(day_records)) => records.extend(day_records),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Skipping unreadable day-file"
                    );
                }
            }
        }

        records
    }

    /// Remove day-files dated more than `days` days before today
    ///
    /// Returns the number of files removed.
    pub async fn prune_older_than(&self, days: u32) -> Result<usize, FileSinkError> {
        let today = Utc::now().date_naive();
        let Some(cutoff) = today.checked_sub_days(Days::new(u64::from(days))) else {
            return Ok(0);
        };

        let mut dir = match fs::read_dir(&self.directory).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(FileSinkError::io(&self.directory, e)),
        };

        let mut removed = 0;
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| FileSinkError::io(&self.directory, e))?
        {
            let path = item.path();
            let Some(day) = day_of_file(&path) else {
                continue;
            };

            if day < cutoff {
                fs::remove_file(&path)
                    .await
                    .map_err(|e| FileSinkError::io(&path, e))?;
                tracing::debug!(path = %path.display(), "Removed expired day-file");
                removed += 1;
            }
        }

        Ok(removed)
    }

    /// Existing records of a day-file, or an empty list for a new day
    ///
    /// A day-file that no longer parses is moved aside so the day keeps
    /// accepting appends.
    async fn load_for_append(&self, path: &Path) -> Result<Vec<DayFileRecord>, FileSinkError> {
        match read_day_file(path).await {
            Ok(records) => Ok(records.unwrap_or_default()),
            Err(ReadError::Io(e)) => Err(FileSinkError::io(path, e)),
            Err(ReadError::Malformed(e)) => {
                let quarantine = path.with_extension(format!(
                    "json.corrupt-{}",
                    Utc::now().timestamp_millis()
                ));
                tracing::warn!(
                    path = %path.display(),
                    moved_to = %quarantine.display(),
                    error = %e,
                    "Day-file is malformed, starting a new one"
                );
                fs::rename(path, &quarantine)
                    .await
                    .map_err(|e| FileSinkError::io(path, e))?;
                Ok(Vec::new())
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum ReadError {
    #[error(transparent)]
    Io(std::io::Error),
    #[error(transparent)]
    Malformed(serde_json::Error),
}

/// `Ok(None)` when the file does not exist
async fn read_day_file(path: &Path) -> Result<Option<Vec<DayFileRecord>>, ReadError> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ReadError::Io(e)),
    };

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Some(Vec::new()));
    }

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(ReadError::Malformed)
}

async fn write_atomically(path: &Path, records: &[DayFileRecord]) -> Result<(), FileSinkError> {
    let encoded = serde_json::to_vec_pretty(records).map_err(|e| FileSinkError::Encode {
        path: path.to_path_buf(),
        source: e,
    })?;

    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, encoded)
        .await
        .map_err(|e| FileSinkError::io(&tmp_path, e))?;
    fs::rename(&tmp_path, path)
        .await
        .map_err(|e| FileSinkError::io(path, e))?;

    Ok(())
}

fn day_of_file(path: &Path) -> Option<NaiveDate> {
    let name = path.file_name()?.to_str()?;
    let date = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}
