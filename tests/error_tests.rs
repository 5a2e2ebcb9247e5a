// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use run_tracker::error::TrackerError;
use run_tracker::models::RunState;

#[test]
fn test_recoverable_errors() {
    let err = TrackerError::NotFound("run".to_string());
    assert!(err.is_recoverable());
    assert!(err.is_not_found());
    assert!(!err.is_transient());

    let err = TrackerError::RemoteUnavailable("HTTP 503".to_string());
    assert!(err.is_recoverable());
    assert!(err.is_transient());
}

#[test]
fn test_fatal_errors() {
    let err = TrackerError::LocalStore("disk full".to_string());
    assert!(!err.is_recoverable());

    let err = TrackerError::Validation("bad latitude".to_string());
    assert!(!err.is_recoverable());

    let err = TrackerError::Internal(anyhow::anyhow!("bug"));
    assert!(!err.is_recoverable());
    assert!(!err.is_not_found());
}

#[test]
fn test_invalid_state_message() {
    let err = TrackerError::InvalidState {
        op: "pause",
        state: RunState::Ready,
    };
    assert_eq!(err.to_string(), "Cannot pause while run is Ready");
}
