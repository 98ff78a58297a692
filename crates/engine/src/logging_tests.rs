// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn init_writes_to_rolling_file_once() {
    let dir = tempfile::tempdir().unwrap();
    let log_dir = dir.path().join("logs");

    let guard = init(&log_dir).unwrap();
    tracing::info!(phase = 1, "phase started");
    drop(guard);

    let files: Vec<_> = std::fs::read_dir(&log_dir).unwrap().filter_map(Result::ok).collect();
    assert_eq!(files.len(), 1);
    assert!(files[0].file_name().to_string_lossy().starts_with(LOG_FILE_PREFIX));

    // A second global subscriber is refused
    assert!(matches!(init(&log_dir), Err(LoggingError::Init(_))));
}
