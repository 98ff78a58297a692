// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline phases and their lifecycle status.

use serde::{Deserialize, Serialize};

/// One of the six sequential pipeline stages.
///
/// Phases are numbered 1..=6 and run strictly in order: phase N is eligible
/// only once phase N-1 has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Discover listing links from each seed.
    LinkDiscovery = 1,
    /// Fetch every discovered detail page.
    PageFetch = 2,
    /// Extract structured company fields from fetched pages.
    Extraction = 3,
    /// Fetch each company's own website (or social page).
    FollowUpFetch = 4,
    /// Extract contact details from follow-up pages.
    SecondaryExtraction = 5,
    /// Write the joined results out.
    Export = 6,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::LinkDiscovery,
        Phase::PageFetch,
        Phase::Extraction,
        Phase::FollowUpFetch,
        Phase::SecondaryExtraction,
        Phase::Export,
    ];

    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn from_number(n: u8) -> Option<Phase> {
        Self::ALL.get(usize::from(n).checked_sub(1)?).copied()
    }

    pub fn next(self) -> Option<Phase> {
        Self::from_number(self.number() + 1)
    }

    pub fn prev(self) -> Option<Phase> {
        Self::from_number(self.number().checked_sub(1)?)
    }

    /// Phases from `self` through the end of the pipeline.
    pub fn through_end(self) -> impl Iterator<Item = Phase> {
        Self::ALL.into_iter().skip(usize::from(self.number()) - 1)
    }
}

crate::simple_display! {
    Phase {
        LinkDiscovery => "link_discovery",
        PageFetch => "page_fetch",
        Extraction => "extraction",
        FollowUpFetch => "follow_up_fetch",
        SecondaryExtraction => "secondary_extraction",
        Export => "export",
    }
}

/// Lifecycle of a single phase within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

impl PhaseStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, PhaseStatus::Completed)
    }
}

crate::simple_display! {
    PhaseStatus {
        NotStarted => "not_started",
        InProgress => "in_progress",
        Completed => "completed",
    }
}

#[cfg(test)]
#[path = "phase_tests.rs"]
mod tests;
