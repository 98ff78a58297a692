// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Human-readable durations for log lines and run reports.

use std::time::Duration;

/// Format a duration as a compact string: `45s`, `3m12s`, `2h05m`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// Same as [`format_elapsed`] for a millisecond count.
pub fn format_elapsed_ms(ms: u64) -> String {
    format_elapsed(Duration::from_millis(ms))
}
