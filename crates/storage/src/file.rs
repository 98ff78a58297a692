// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable store backed by one JSONL append log per table.
//!
//! Each write appends the full record and fsyncs before returning, so a
//! crash loses at most the write in progress. A write that fails part way is
//! cut back to the log's prior length. On open the logs are replayed (last
//! line per key wins); a torn final line is cut off.

use crate::record::{Record, RecordStatus, Table};
use crate::store::{Store, StoreError, Tables};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

struct Inner {
    tables: Tables,
    logs: HashMap<Table, File>,
}

/// File-backed [`Store`].
pub struct FileStore {
    dir: PathBuf,
    inner: Mutex<Inner>,
}

impl FileStore {
    /// Open (or create) the store under `dir`, replaying existing logs.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let mut tables = Tables::default();
        let mut logs = HashMap::new();
        for table in Table::ALL {
            let path = log_path(&dir, table);
            replay(&path, table, &mut tables)?;
            logs.insert(table, open_append(&path)?);
        }

        Ok(Self { dir, inner: Mutex::new(Inner { tables, logs }) })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write(&self, table: Table, record: Record) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        if !inner.tables.accepts(table, &record.key) {
            return Ok(false);
        }
        let line = serde_json::to_string(&record)?;
        let file = match inner.logs.get_mut(&table) {
            Some(file) => file,
            None => return Err(StoreError::Unavailable(format!("no log for {table}"))),
        };
        append_line(file, &line).inspect_err(|e| {
            tracing::warn!(table = %table, key = %record.key, error = %e, "store write failed");
        })?;
        inner.tables.put(table, record);
        Ok(true)
    }
}

/// Append-only log that can be cut back to a known length.
trait AppendLog: Write {
    fn len(&self) -> std::io::Result<u64>;
    fn truncate(&mut self, len: u64) -> std::io::Result<()>;
    fn sync(&mut self) -> std::io::Result<()>;
}

impl AppendLog for File {
    fn len(&self) -> std::io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> std::io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> std::io::Result<()> {
        self.sync_all()
    }
}

/// Append `line` and fsync. On failure the log is restored to its prior
/// length so no partial record is left behind.
fn append_line(log: &mut impl AppendLog, line: &str) -> Result<(), StoreError> {
    let before = log.len()?;
    let written = writeln!(log, "{line}").and_then(|()| log.flush());
    if let Err(e) = written {
        if let Err(cut) = log.truncate(before).and_then(|()| log.sync()) {
            tracing::error!(error = %cut, "could not roll back partial store write");
        }
        return Err(e.into());
    }
    log.sync()?;
    Ok(())
}

fn log_path(dir: &Path, table: Table) -> PathBuf {
    dir.join(format!("{}.jsonl", table.name()))
}

fn open_append(path: &Path) -> Result<File, StoreError> {
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

fn replay(path: &Path, table: Table, tables: &mut Tables) -> Result<(), StoreError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    // Drop a partially written final line so later appends start clean.
    let complete = match bytes.iter().rposition(|b| *b == b'\n') {
        Some(pos) => pos + 1,
        None => 0,
    };
    if complete < bytes.len() {
        tracing::warn!(
            table = %table,
            dropped_bytes = bytes.len() - complete,
            "truncating torn tail of store log",
        );
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(complete as u64)?;
        file.sync_all()?;
    }

    let text = String::from_utf8_lossy(&bytes[..complete]);
    for (lineno, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Record>(line) {
            Ok(record) => tables.put(table, record),
            Err(e) => {
                tracing::warn!(table = %table, line = lineno + 1, error = %e, "skipping corrupt store record");
            }
        }
    }
    Ok(())
}

impl Store for FileStore {
    fn insert_if_absent(&self, table: Table, record: Record) -> Result<bool, StoreError> {
        self.write(table, record)
    }

    fn mark_pending(&self, table: Table, mut record: Record) -> Result<bool, StoreError> {
        record.status = RecordStatus::Pending;
        self.write(table, record)
    }

    fn get(&self, table: Table, key: &str) -> Result<Option<Record>, StoreError> {
        Ok(self.inner.lock().tables.get(table, key))
    }

    fn count_by_status(&self, table: Table, status: RecordStatus) -> Result<u64, StoreError> {
        Ok(self.inner.lock().tables.count(table, status))
    }

    fn read_pending(&self, table: Table, limit: usize) -> Result<Vec<Record>, StoreError> {
        Ok(self.inner.lock().tables.pending(table, limit))
    }

    fn records(
        &self,
        table: Table,
        status: Option<RecordStatus>,
    ) -> Result<Vec<Record>, StoreError> {
        Ok(self.inner.lock().tables.records(table, status))
    }

    fn terminal_keys(&self, table: Table) -> Result<HashSet<String>, StoreError> {
        Ok(self.inner.lock().tables.terminal_keys(table))
    }

    fn truncate(&self, table: Table) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let path = log_path(&self.dir, table);
        inner.logs.remove(&table);
        let file = File::create(&path)?;
        file.sync_all()?;
        inner.logs.insert(table, open_append(&path)?);
        inner.tables.clear(table);
        tracing::info!(table = %table, "truncated store table");
        Ok(())
    }
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod tests;
