// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-phase work and the external collaborators it calls.
//!
//! The orchestrator knows nothing about pages or companies. It asks a
//! [`PipelineStages`] implementation to run one item of a phase and to derive
//! the next phase's items from a finished record.

use crate::export::{build_rows, Exporter};
use async_trait::async_trait;
use pc_core::{Phase, TaskError, WorkItem};
use pc_storage::{Record, Store};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// Key and resource of the single phase-6 item.
pub const EXPORT_KEY: &str = "export";

/// Value used by the extractor for fields it could not find.
pub const MISSING: &str = "N/A";

/// Page fetch/render engine.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url` and return its rendered content. Must be idempotent; the
    /// caller enforces the deadline.
    async fn fetch(&self, url: &str) -> Result<String, TaskError>;
}

#[async_trait]
impl<T: Fetcher + ?Sized> Fetcher for Arc<T> {
    async fn fetch(&self, url: &str) -> Result<String, TaskError> {
        (**self).fetch(url).await
    }
}

/// What an extraction call should pull out of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractKind {
    /// Landing page → `[{"name", "url"}]` industry listing.
    Industries,
    /// Listing page → `{"links": [...]}` detail-page URLs.
    Links,
    /// Detail page → company fields.
    Details,
    /// Contact page → `{"emails": [...]}`.
    Contacts,
}

pc_core::simple_display! {
    ExtractKind {
        Industries => "industries",
        Links => "links",
        Details => "details",
        Contacts => "contacts",
    }
}

/// Pure content extraction.
pub trait Extractor: Send + Sync {
    fn extract(&self, kind: ExtractKind, content: &str) -> Result<Value, TaskError>;
}

impl<T: Extractor + ?Sized> Extractor for Arc<T> {
    fn extract(&self, kind: ExtractKind, content: &str) -> Result<Value, TaskError> {
        (**self).extract(kind, content)
    }
}

/// The work each phase performs, seen from the orchestrator.
#[async_trait]
pub trait PipelineStages: Send + Sync {
    /// Seed items for phase 1. Called once per job; the result is
    /// checkpointed.
    async fn discover_seeds(&self) -> Result<Vec<WorkItem>, TaskError>;

    /// Process one item of `phase`, returning the data to store.
    async fn run(&self, phase: Phase, item: WorkItem) -> Result<Value, TaskError>;

    /// Items for the phase after `phase`, derived from one of its `Done`
    /// records.
    fn follow_ups(&self, phase: Phase, record: &Record) -> Vec<WorkItem>;
}

/// Company-directory crawl: industries → listings → detail pages → company
/// fields → website/facebook pages → emails → export.
pub struct CrawlStages<F, X, E> {
    start_url: String,
    fetcher: F,
    extractor: X,
    exporter: E,
    store: Arc<dyn Store>,
}

impl<F: Fetcher, X: Extractor, E: Exporter> CrawlStages<F, X, E> {
    pub fn new(
        start_url: impl Into<String>,
        fetcher: F,
        extractor: X,
        exporter: E,
        store: Arc<dyn Store>,
    ) -> Self {
        Self { start_url: start_url.into(), fetcher, extractor, exporter, store }
    }

    async fn fetch_item(&self, item: &WorkItem) -> Result<String, TaskError> {
        let url = item.field("url").unwrap_or(&item.key);
        self.fetcher.fetch(url).await
    }

    fn html<'a>(&self, item: &'a WorkItem) -> Result<&'a str, TaskError> {
        item.field("html").ok_or_else(|| TaskError::expected(format!("no content for {}", item.key)))
    }
}

#[async_trait]
impl<F: Fetcher, X: Extractor, E: Exporter> PipelineStages for CrawlStages<F, X, E> {
    async fn discover_seeds(&self) -> Result<Vec<WorkItem>, TaskError> {
        let html = self.fetcher.fetch(&self.start_url).await?;
        let listing = self.extractor.extract(ExtractKind::Industries, &html)?;
        let seeds = listing
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|entry| {
                let name = entry.get("name")?.as_str()?;
                let url = entry.get("url")?.as_str()?;
                Some(WorkItem::new(url, name, json!({ "url": url, "industry": name })))
            })
            .collect::<Vec<_>>();
        tracing::info!(start = %self.start_url, seeds = seeds.len(), "industries discovered");
        Ok(seeds)
    }

    async fn run(&self, phase: Phase, item: WorkItem) -> Result<Value, TaskError> {
        match phase {
            Phase::LinkDiscovery => {
                let html = self.fetch_item(&item).await?;
                let found = self.extractor.extract(ExtractKind::Links, &html)?;
                let links = string_list(found.get("links").unwrap_or(&found));
                Ok(json!({ "links": links }))
            }
            Phase::PageFetch | Phase::FollowUpFetch => {
                let html = self.fetch_item(&item).await?;
                Ok(json!({ "html": html }))
            }
            Phase::Extraction => self.extractor.extract(ExtractKind::Details, self.html(&item)?),
            Phase::SecondaryExtraction => {
                let found = self.extractor.extract(ExtractKind::Contacts, self.html(&item)?)?;
                let emails = string_list(found.get("emails").unwrap_or(&found));
                Ok(json!({ "emails": emails }))
            }
            Phase::Export => {
                let rows = build_rows(self.store.as_ref())
                    .map_err(|e| TaskError::transient(format!("reading export rows: {e}")))?;
                let summary = self.exporter.export(&rows).await?;
                serde_json::to_value(summary).map_err(|e| TaskError::transient(e.to_string()))
            }
        }
    }

    fn follow_ups(&self, phase: Phase, record: &Record) -> Vec<WorkItem> {
        let industry = record.resource.as_str();
        match phase {
            Phase::LinkDiscovery => {
                let links = record.data.as_ref().and_then(|d| d.get("links"));
                links
                    .map(string_list)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|link| {
                        WorkItem::new(
                            link.clone(),
                            industry,
                            json!({ "url": link, "industry": industry }),
                        )
                    })
                    .collect()
            }
            Phase::PageFetch => match record.data_str("html") {
                Some(html) => vec![WorkItem::new(
                    record.key.clone(),
                    industry,
                    json!({ "url": record.key, "industry": industry, "html": html }),
                )],
                None => Vec::new(),
            },
            Phase::Extraction => contact_targets(record),
            Phase::FollowUpFetch => match record.data_str("html") {
                Some(html) => {
                    let mut payload = record.payload.clone();
                    if let Some(fields) = payload.as_object_mut() {
                        fields.insert("html".into(), Value::String(html.to_string()));
                    }
                    vec![WorkItem::new(record.key.clone(), record.resource.clone(), payload)]
                }
                None => Vec::new(),
            },
            Phase::SecondaryExtraction | Phase::Export => Vec::new(),
        }
    }
}

/// Website and facebook pages of one company, keyed by URL and guarded by
/// the URL's host.
fn contact_targets(record: &Record) -> Vec<WorkItem> {
    let mut seen = HashSet::new();
    ["website", "facebook"]
        .into_iter()
        .filter_map(|url_type| {
            let url = record.data_str(url_type)?.trim();
            if url.is_empty() || url == MISSING || !seen.insert(url.to_string()) {
                return None;
            }
            let Some(host) = resource_host(url) else {
                tracing::debug!(company = %record.key, url, "skipping unparseable contact url");
                return None;
            };
            Some(WorkItem::new(
                url,
                host,
                json!({ "company_key": record.key, "url": url, "url_type": url_type }),
            ))
        })
        .collect()
}

/// Host of `url`, used as the breaker resource for follow-up fetches.
pub fn resource_host(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    parsed.host_str().map(|h| h.trim_start_matches("www.").to_ascii_lowercase())
}

/// Non-empty strings of a JSON array, trimmed and deduplicated in order.
fn string_list(value: &Value) -> Vec<String> {
    let mut seen = HashSet::new();
    value
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty() && seen.insert(s.to_string()))
        .map(String::from)
        .collect()
}

#[cfg(test)]
#[path = "stages_tests.rs"]
mod tests;
