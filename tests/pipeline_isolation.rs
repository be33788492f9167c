// tests/pipeline_isolation.rs
mod common;

use std::time::Duration;

use common::{account, harness, post, query, RecordingNotifier, StubFetcher};
use x_market_crawler::fetch::FetchError;
use x_market_crawler::{SeenStore, TargetErrorKind};

#[tokio::test]
async fn failing_target_does_not_stop_the_next_one() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seen.json");
    let h = harness(
        StubFetcher::new()
            .with_error("suspended_acct", || FetchError::NotFound("user suspended_acct".into()))
            .with_posts("$NVDA", vec![post("n1", "a", 0)]),
        RecordingNotifier::new(),
        None,
        &path,
    );

    let report = h
        .pipeline
        .run_cycle(&[account("suspended_acct"), query("$NVDA")], false)
        .await;

    assert_eq!(report.target_errors.len(), 1);
    assert_eq!(report.target_errors[0].target, "@suspended_acct");
    assert_eq!(
        report.target_errors[0].kind,
        TargetErrorKind::Fetch("not_found".into())
    );
    assert_eq!(h.notifier.ids(), ["n1"]);
    assert!(report.persisted);
    assert!(SeenStore::load(&path).unwrap().contains("n1"));
}

#[tokio::test]
async fn rate_limited_target_is_retried_next_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        StubFetcher::new().with_error("deitaone", || FetchError::RateLimited { reset_at: Some(1_700_000_000) }),
        RecordingNotifier::new(),
        None,
        &dir.path().join("seen.json"),
    );
    let targets = [account("deitaone")];

    let first = h.pipeline.run_cycle(&targets, false).await;
    assert_eq!(first.target_errors[0].kind, TargetErrorKind::Fetch("rate_limited".into()));

    h.fetcher.set_posts("deitaone", vec![post("r1", "deitaone", 0)]);
    let second = h.pipeline.run_cycle(&targets, false).await;
    assert!(second.target_errors.is_empty());
    assert_eq!(h.notifier.ids(), ["r1"]);
}

#[tokio::test]
async fn failed_delivery_is_marked_seen_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        StubFetcher::new().with_posts("a", vec![post("ok", "a", 0), post("bad", "a", 1)]),
        RecordingNotifier::new().failing_for("bad"),
        None,
        &dir.path().join("seen.json"),
    );
    let targets = [account("a")];

    let report = h.pipeline.run_cycle(&targets, false).await;
    assert_eq!(report.notified, 1);
    assert_eq!(report.delivery_failures, 1);
    assert!(h.pipeline.seen().contains("bad"));

    // the lost alert is not retried
    h.pipeline.run_cycle(&targets, false).await;
    assert_eq!(h.notifier.ids(), ["ok", "bad"]);
}

#[tokio::test]
async fn failed_delivery_is_retried_when_mark_seen_on_failure_is_off() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        StubFetcher::new().with_posts("a", vec![post("bad", "a", 0)]),
        RecordingNotifier::new().failing_for("bad"),
        None,
        &dir.path().join("seen.json"),
    );
    let pipeline = h.pipeline.with_mark_seen_on_failure(false);
    let targets = [account("a")];

    pipeline.run_cycle(&targets, false).await;
    assert!(!pipeline.seen().contains("bad"));

    let again = pipeline.run_cycle(&targets, false).await;
    assert_eq!(again.processed, 1);
    assert_eq!(h.notifier.ids(), ["bad", "bad"]);
}

#[tokio::test(start_paused = true)]
async fn cycle_budget_abandons_remaining_targets_but_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seen.json");
    let h = harness(
        StubFetcher::new()
            .with_posts("first", vec![post("f1", "first", 0)])
            .hanging("slow")
            .with_posts("never", vec![post("v1", "never", 0)]),
        RecordingNotifier::new(),
        None,
        &path,
    );

    let report = h
        .pipeline
        .run_cycle_with_budget(
            &[account("first"), account("slow"), account("never")],
            false,
            Duration::from_secs(300),
        )
        .await;

    assert!(report.timed_out);
    assert_eq!(report.target_errors.len(), 1);
    assert_eq!(report.target_errors[0].target, "@slow");
    assert_eq!(report.target_errors[0].kind, TargetErrorKind::Timeout);
    assert_eq!(h.fetcher.calls(), ["first", "slow"]);
    assert_eq!(h.notifier.ids(), ["f1"]);
    assert!(report.persisted);
    assert!(SeenStore::load(&path).unwrap().contains("f1"));
}

#[tokio::test]
async fn unrepresentable_budget_runs_unbounded() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        StubFetcher::new().with_posts("a", vec![post("1", "a", 0)]),
        RecordingNotifier::new(),
        None,
        &dir.path().join("seen.json"),
    );

    let report = h
        .pipeline
        .run_cycle_with_budget(&[account("a")], false, Duration::from_secs(u64::MAX))
        .await;

    assert!(!report.timed_out);
    assert_eq!(report.notified, 1);
    assert!(report.persisted);
}

#[tokio::test(start_paused = true)]
async fn deliveries_within_a_target_are_spaced_by_the_delay() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        StubFetcher::new()
            .with_posts("a", vec![post("1", "a", 0), post("2", "a", 1), post("3", "a", 2)])
            .with_posts("b", vec![post("4", "b", 0)]),
        RecordingNotifier::new(),
        None,
        &dir.path().join("seen.json"),
    );
    let pipeline = h.pipeline.with_notify_delay(Duration::from_millis(500));

    pipeline.run_cycle(&[account("a"), account("b")], false).await;

    assert_eq!(h.notifier.ids(), ["1", "2", "3", "4"]);
    let gaps = h.notifier.gaps();
    assert!(gaps[0] >= Duration::from_millis(500));
    assert!(gaps[1] >= Duration::from_millis(500));
    // a new target starts without waiting
    assert_eq!(gaps[2], Duration::ZERO);
}
