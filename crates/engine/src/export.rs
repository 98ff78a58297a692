// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Final export: one row per company email.

use crate::stages::MISSING;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pc_core::TaskError;
use pc_storage::{Record, RecordStatus, Store, StoreError, Table};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Emails exported per company at most.
pub const MAX_EMAILS_PER_COMPANY: usize = 5;

/// One exported line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRow {
    pub company_name: String,
    pub company_url: String,
    pub industry: String,
    pub address: String,
    pub phone: String,
    pub website: String,
    pub facebook: String,
    pub email: String,
    /// Page type the email was found on (`website`, `facebook`), or `none`.
    pub email_source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSummary {
    pub rows: usize,
    pub location: String,
    pub exported_at: DateTime<Utc>,
}

/// Destination of the export rows.
#[async_trait]
pub trait Exporter: Send + Sync {
    async fn export(&self, rows: &[ExportRow]) -> Result<ExportSummary, TaskError>;
}

#[async_trait]
impl<T: Exporter + ?Sized> Exporter for std::sync::Arc<T> {
    async fn export(&self, rows: &[ExportRow]) -> Result<ExportSummary, TaskError> {
        (**self).export(rows).await
    }
}

/// Join finished company details with the emails found for them.
///
/// Companies are ordered by name. A company with no emails still gets one
/// row with `N/A` as its email.
pub fn build_rows(store: &dyn Store) -> Result<Vec<ExportRow>, StoreError> {
    let mut emails: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();
    for contact in store.records(Table::Contacts, Some(RecordStatus::Done))? {
        let Some(company) = contact.payload.get("company_key").and_then(|v| v.as_str()) else {
            continue;
        };
        let source = contact.payload.get("url_type").and_then(|v| v.as_str()).unwrap_or("unknown");
        let found = contact.data.as_ref().and_then(|d| d.get("emails")).and_then(|v| v.as_array());
        let entry = emails.entry(company.to_string()).or_default();
        for email in found.into_iter().flatten().filter_map(|v| v.as_str()) {
            entry.push((email.trim().to_string(), source.to_string()));
        }
    }

    let mut companies = store.records(Table::CompanyDetails, Some(RecordStatus::Done))?;
    companies.sort_by(|a, b| field(a, "company_name").cmp(&field(b, "company_name")));

    let mut rows = Vec::new();
    for company in &companies {
        let mut seen = HashSet::new();
        let found: Vec<_> = emails
            .get(&company.key)
            .into_iter()
            .flatten()
            .filter(|(email, _)| !email.is_empty() && seen.insert(email.to_ascii_lowercase()))
            .take(MAX_EMAILS_PER_COMPANY)
            .collect();

        if found.is_empty() {
            rows.push(row(company, MISSING, "none"));
        }
        for (email, source) in found {
            rows.push(row(company, email, source));
        }
    }
    Ok(rows)
}

fn field(record: &Record, name: &str) -> String {
    record.data_str(name).unwrap_or(MISSING).to_string()
}

fn row(company: &Record, email: &str, source: &str) -> ExportRow {
    ExportRow {
        company_name: field(company, "company_name"),
        company_url: company.key.clone(),
        industry: company
            .payload
            .get("industry")
            .and_then(|v| v.as_str())
            .unwrap_or(MISSING)
            .to_string(),
        address: field(company, "address"),
        phone: field(company, "phone"),
        website: field(company, "website"),
        facebook: field(company, "facebook"),
        email: email.to_string(),
        email_source: source.to_string(),
    }
}

/// Writes rows as JSON lines, replacing the target file atomically.
#[derive(Debug, Clone)]
pub struct JsonlExporter {
    path: PathBuf,
}

impl JsonlExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Write `rows` to a sibling temp file, fsync, then rename over `path`.
fn write_rows(path: &Path, rows: &[ExportRow]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("jsonl.tmp");
    {
        let mut out = BufWriter::new(File::create(&tmp)?);
        for row in rows {
            serde_json::to_writer(&mut out, row)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        out.get_ref().sync_all()?;
    }
    fs::rename(&tmp, path)
}

#[async_trait]
impl Exporter for JsonlExporter {
    async fn export(&self, rows: &[ExportRow]) -> Result<ExportSummary, TaskError> {
        let path = self.path.clone();
        let owned = rows.to_vec();
        tokio::task::spawn_blocking(move || write_rows(&path, &owned))
            .await
            .map_err(|e| TaskError::transient(format!("export writer stopped: {e}")))?
            .map_err(|e| TaskError::transient(format!("writing {}: {e}", self.path.display())))?;
        tracing::info!(path = %self.path.display(), rows = rows.len(), "export written");
        Ok(ExportSummary {
            rows: rows.len(),
            location: self.path.display().to_string(),
            exported_at: Utc::now(),
        })
    }
}

#[cfg(test)]
#[path = "export_tests.rs"]
mod tests;
