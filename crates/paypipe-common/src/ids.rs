//! Run, correlation and idempotency identifiers

use regex::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

pub fn new_run_id() -> String {
    Uuid::new_v4().to_string()
}

/// Correlation id for one extraction window.
///
/// Derived from the run and window so that re-running the same run id over the
/// same window reproduces identical envelopes, while every distinct window
/// still gets its own id.
pub fn window_correlation_id(run_id: &str, entity: &str, start_ts: i64, end_ts: i64) -> String {
    let name = format!("{run_id}/{entity}/{start_ts}-{end_ts}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}

fn unsafe_chars() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        #[allow(clippy::expect_used)]
        Regex::new(r"[^A-Za-z0-9_.=-]+").expect("static pattern is valid")
    })
}

/// Make an externally supplied id safe to embed as a single path segment.
///
/// Runs of unsafe characters collapse to `_`; leading/trailing `.` and `_`
/// are stripped so the result can never be `.` or `..`.
pub fn sanitize_id_for_path(value: &str) -> String {
    let cleaned = unsafe_chars().replace_all(value.trim(), "_");
    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        "unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_id_for_path() {
        assert_eq!(sanitize_id_for_path("evt_123"), "evt_123");
        assert_eq!(sanitize_id_for_path("../../etc/passwd"), "etc_passwd");
        assert_eq!(sanitize_id_for_path("a b/c"), "a_b_c");
        assert_eq!(sanitize_id_for_path("..."), "unknown");
        assert_eq!(sanitize_id_for_path("   "), "unknown");
    }

    #[test]
    fn test_window_correlation_id_is_stable_per_window() {
        let a = window_correlation_id("run-1", "charges", 10, 20);
        assert_eq!(a, window_correlation_id("run-1", "charges", 10, 20));
        assert_ne!(a, window_correlation_id("run-1", "charges", 11, 20));
        assert_ne!(a, window_correlation_id("run-2", "charges", 10, 20));
    }
}
