// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store tables and the records they hold.

use pc_core::{Phase, WorkItem};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Output table of one pipeline phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    /// Links discovered per seed.
    Links,
    DetailPages,
    CompanyDetails,
    ContactPages,
    Contacts,
    Exports,
}

impl Table {
    pub const ALL: [Table; 6] = [
        Table::Links,
        Table::DetailPages,
        Table::CompanyDetails,
        Table::ContactPages,
        Table::Contacts,
        Table::Exports,
    ];

    /// Table a phase writes its results into.
    pub fn for_phase(phase: Phase) -> Table {
        match phase {
            Phase::LinkDiscovery => Table::Links,
            Phase::PageFetch => Table::DetailPages,
            Phase::Extraction => Table::CompanyDetails,
            Phase::FollowUpFetch => Table::ContactPages,
            Phase::SecondaryExtraction => Table::Contacts,
            Phase::Export => Table::Exports,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Table::Links => "links",
            Table::DetailPages => "detail_pages",
            Table::CompanyDetails => "company_details",
            Table::ContactPages => "contact_pages",
            Table::Contacts => "contacts",
            Table::Exports => "exports",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Processing state of a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Failed with retries left; kept so the item can be rebuilt.
    Pending,
    Done,
    /// Retries exhausted.
    Failed,
}

impl RecordStatus {
    /// `Done` and `Failed` records cover their key for resume purposes.
    pub fn is_terminal(self) -> bool {
        !matches!(self, RecordStatus::Pending)
    }
}

pc_core::simple_display! {
    RecordStatus {
        Pending => "pending",
        Done => "done",
        Failed => "failed",
    }
}

/// One row of a phase output table, unique on `key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: String,
    pub resource: String,
    pub status: RecordStatus,
    pub attempts: u32,
    /// Input payload of the work item that produced this record.
    pub payload: Value,
    /// Output of a successful item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at_ms: u64,
}

impl Record {
    pub fn done(item: &WorkItem, data: Value, now_ms: u64) -> Self {
        Self {
            key: item.key.clone(),
            resource: item.resource.clone(),
            status: RecordStatus::Done,
            attempts: item.attempts,
            payload: item.payload.clone(),
            data: Some(data),
            error: None,
            updated_at_ms: now_ms,
        }
    }

    pub fn failed(item: &WorkItem, error: impl Into<String>, now_ms: u64) -> Self {
        Self {
            status: RecordStatus::Failed,
            data: None,
            error: Some(error.into()),
            ..Self::done(item, Value::Null, now_ms)
        }
    }

    pub fn pending(item: &WorkItem, error: impl Into<String>, now_ms: u64) -> Self {
        Self { status: RecordStatus::Pending, ..Self::failed(item, error, now_ms) }
    }

    /// Rebuild the work item this record was produced from.
    pub fn to_work_item(&self) -> WorkItem {
        WorkItem::new(self.key.clone(), self.resource.clone(), self.payload.clone())
            .with_attempts(self.attempts)
    }

    /// String field of the output data, if present.
    pub fn data_str(&self, name: &str) -> Option<&str> {
        self.data.as_ref()?.get(name)?.as_str()
    }
}
