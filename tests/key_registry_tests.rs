// tests/key_registry_tests.rs

mod common;

use chrono::Duration;
use common::{numbered_keys, TestRegistry, BLOCK_SECS};
use key_rotation_manager::storage::pool::MAX_BLOCK_DURATION_SECS;
use key_rotation_manager::{
    config::StaticCredentialSource, storage::KeyHealth, Clock, KeyError, KeyRegistry,
    ManualClock,
};
use proptest::prelude::*;
use rstest::rstest;
use std::collections::HashMap;
use std::sync::Arc;

#[test]
fn test_round_robin_visits_keys_in_order() {
    let t = TestRegistry::single("gemini", &["A", "B", "C"]);
    let picked: Vec<String> = (0..6).map(|_| t.next("gemini")).collect();
    assert_eq!(picked, vec!["A", "B", "C", "A", "B", "C"]);
}

proptest! {
    #[test]
    fn prop_round_robin_is_fair(n in 1usize..12, rounds in 1usize..6) {
        let keys = numbered_keys("k", n);
        let registry = KeyRegistry::builder()
            .clock(Arc::new(ManualClock::starting_now()))
            .service("svc", keys.clone())
            .build();

        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..n * rounds {
            let lease = registry.get_key("svc").unwrap();
            *counts.entry(lease.expose().to_string()).or_default() += 1;
        }

        prop_assert_eq!(counts.len(), n);
        for key in &keys {
            prop_assert_eq!(counts[key], rounds);
        }
    }
}

#[rstest]
#[case::two_failures_then_success(&[false, false, true], false)]
#[case::three_failures(&[false, false, false], true)]
#[case::success_breaks_streak(&[false, false, true, false, false], false)]
#[case::streak_after_success(&[false, true, false, false, false], true)]
fn test_block_threshold(#[case] outcomes: &[bool], #[case] blocked: bool) {
    let t = TestRegistry::single("nvidia", &["only", "spare"]);
    let index = t.registry.get_key("nvidia").unwrap().index();

    for &ok in outcomes {
        if ok {
            t.registry.mark_success("nvidia", index).unwrap();
        } else {
            t.registry.mark_failure("nvidia", index, None).unwrap();
        }
    }

    let status = t.registry.service_status("nvidia");
    let health = status.keys[index].health;
    assert_eq!(health == KeyHealth::Blocked, blocked);
    assert_eq!(status.blocked_keys, usize::from(blocked));
}

#[test]
fn test_blocked_key_is_excluded_until_window_passes() {
    let t = TestRegistry::single("gemini", &["A", "B"]);
    let blocked = t.fail_next("gemini", 3);
    assert_eq!(blocked, 0);

    for _ in 0..4 {
        assert_eq!(t.next("gemini"), "B");
    }

    t.clock.advance(Duration::seconds(BLOCK_SECS - 1));
    assert_eq!(t.next("gemini"), "B");

    t.clock.advance(Duration::seconds(1));
    assert_eq!(t.next("gemini"), "A");
}

#[test]
fn test_lazy_recovery_resets_streak() {
    let t = TestRegistry::single("gemini", &["A"]);
    t.fail_next("gemini", 3);
    assert!(!t.registry.service_status("gemini").available);

    t.advance_past_block();

    let status = t.registry.service_status("gemini");
    assert!(status.available);
    assert_eq!(status.keys[0].health, KeyHealth::Available);
    assert_eq!(status.keys[0].consecutive_failures, 0);
    assert_eq!(status.keys[0].cumulative_failures, 3);
    assert_eq!(status.keys[0].blocked_until, None);
}

#[test]
fn test_exhaustion_reports_earliest_unblock() {
    let t = TestRegistry::single("openrouter", &["A", "B"]);
    let first_blocked_at = t.clock.now();

    t.fail_next("openrouter", 3);
    t.clock.advance(Duration::seconds(60));
    t.fail_next("openrouter", 3);

    match t.registry.get_key("openrouter") {
        Err(KeyError::AllKeysBlocked {
            service,
            next_available_at,
        }) => {
            assert_eq!(service, "openrouter");
            assert_eq!(
                next_available_at,
                Some(first_blocked_at + Duration::seconds(BLOCK_SECS))
            );
        }
        other => panic!("expected AllKeysBlocked, got {other:?}"),
    }

    let err = t.registry.get_key("openrouter").unwrap_err();
    assert!(err.is_transient());
}

#[test]
fn test_duplicate_candidates_are_dropped() {
    let source = StaticCredentialSource::new()
        .with_service("gemini", ["k1", "k2"])
        .with_service("gemini", ["k1"]);
    let registry = KeyRegistry::builder().load_from(&source).build();

    let status = registry.service_status("gemini");
    assert_eq!(status.total_keys, 2);
    assert_eq!(registry.get_key("gemini").unwrap().expose(), "k1");
    assert_eq!(registry.get_key("gemini").unwrap().expose(), "k2");
    assert_eq!(registry.get_key("gemini").unwrap().expose(), "k1");
}

#[test]
fn test_rotation_across_block_and_recovery() {
    let t = TestRegistry::single("nvidia", &["A", "B", "C"]);

    let a = t.registry.get_key("nvidia").unwrap();
    assert_eq!(a.expose(), "A");
    for _ in 0..3 {
        t.registry.mark_failure("nvidia", a.index(), None).unwrap();
    }

    assert_eq!(t.next("nvidia"), "B");
    assert_eq!(t.next("nvidia"), "C");
    assert_eq!(t.next("nvidia"), "B");

    t.advance_past_block();

    // Scan resumes after B, so C comes before the recovered A.
    assert_eq!(t.next("nvidia"), "C");

    let status = t.registry.service_status("nvidia");
    assert_eq!(status.available_keys, 3);
    assert_eq!(status.keys[0].consecutive_failures, 0);
    assert_eq!(status.keys[0].health, KeyHealth::Available);

    assert_eq!(t.next("nvidia"), "A");
}

#[test]
fn test_missing_service() {
    let t = TestRegistry::single("gemini", &["A"]);

    assert_eq!(
        t.registry.get_key("unknown").unwrap_err(),
        KeyError::ServiceNotConfigured {
            service: "unknown".to_string()
        }
    );

    let status = t.registry.service_status("unknown");
    assert_eq!(status.total_keys, 0);
    assert!(!status.available);
    assert!(status.keys.is_empty());
}

#[test]
fn test_invalid_handle_is_rejected_without_side_effects() {
    let t = TestRegistry::single("gemini", &["A", "B"]);

    let err = t.registry.mark_failure("gemini", 7, None).unwrap_err();
    assert_eq!(
        err,
        KeyError::InvalidKeyHandle {
            service: "gemini".to_string(),
            index: 7,
            pool_size: 2
        }
    );

    let status = t.registry.service_status("gemini");
    assert!(status.keys.iter().all(|k| k.total_requests == 0));
}

#[test]
fn test_per_call_block_duration_overrides_default() {
    let t = TestRegistry::single("gemini", &["A", "B"]);
    let lease = t.registry.get_key("gemini").unwrap();
    for _ in 0..3 {
        t.registry
            .mark_failure("gemini", lease.index(), Some(Duration::seconds(30)))
            .unwrap();
    }

    t.clock.advance(Duration::seconds(31));
    assert_eq!(t.registry.service_status("gemini").available_keys, 2);
}

#[test]
fn test_reset_service_unblocks_and_keeps_lifetime_counters() {
    let t = TestRegistry::single("gemini", &["A", "B"]);
    t.fail_next("gemini", 3);
    t.fail_next("gemini", 3);
    assert!(t.registry.get_key("gemini").is_err());

    t.registry.reset_service("gemini").unwrap();

    let status = t.registry.service_status("gemini");
    assert_eq!(status.available_keys, 2);
    assert!(status
        .keys
        .iter()
        .all(|k| k.consecutive_failures == 0 && k.cumulative_failures == 3));
    assert!(t.registry.get_key("gemini").is_ok());
}

#[test]
fn test_status_tracks_usage_and_success_rate() {
    let t = TestRegistry::single("gemini", &["AAAA-secret-ZZZZ"]);
    let lease = t.registry.get_key("gemini").unwrap();
    t.registry.mark_success("gemini", lease.index()).unwrap();
    t.registry.mark_success("gemini", lease.index()).unwrap();
    t.registry.mark_success("gemini", lease.index()).unwrap();
    t.registry.mark_failure("gemini", lease.index(), None).unwrap();

    let key = &t.registry.service_status("gemini").keys[0];
    assert_eq!(key.key_preview, "AAAA...ZZZZ");
    assert_eq!(key.total_requests, 4);
    assert_eq!(key.success_rate, Some(0.75));
    assert!(key.last_used.is_some());
    assert!(key.last_failure.is_some());
}

#[rstest]
#[case::far_beyond_any_date(Duration::max_value())]
#[case::negative(Duration::seconds(-60))]
#[case::zero(Duration::zero())]
fn test_extreme_block_overrides_leave_a_bounded_block(#[case] block_for: Duration) {
    let t = TestRegistry::single("gemini", &["A", "B"]);
    let start = t.clock.now();
    for _ in 0..3 {
        t.registry.mark_failure("gemini", 0, Some(block_for)).unwrap();
    }

    let status = t.registry.service_status("gemini");
    assert_eq!(status.blocked_keys, 1);
    let until = status.keys[0].blocked_until.expect("key A is blocked");
    assert!(until > start);
    assert!(until <= start + Duration::seconds(MAX_BLOCK_DURATION_SECS));

    assert_eq!(t.next("gemini"), "B");
    assert_eq!(t.next("gemini"), "B");
}
