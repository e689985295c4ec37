use chrono::{DateTime, Utc};

/// Current wall-clock time. Centralized so tests can reason about it, and
/// so the eventual move to an injectable clock (if ever needed) touches one
/// place.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Seconds elapsed between two timestamps, saturating at zero rather than
/// going negative on a clock that moved backwards.
pub fn elapsed_secs(since: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let secs = (now - since).num_milliseconds() as f64 / 1000.0;
    secs.max(0.0)
}
