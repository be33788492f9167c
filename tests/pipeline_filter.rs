// tests/pipeline_filter.rs
mod common;

use std::sync::Arc;

use common::{account, harness, post, query, RecordingNotifier, StubFetcher, StubScorer};
use x_market_crawler::analyze::{MockProvider, RelevanceFilter, Scorer};
use x_market_crawler::{MessageKind, Pipeline, SeenStore};

#[tokio::test]
async fn score_equal_to_minimum_is_notified_one_below_is_not() {
    let dir = tempfile::tempdir().unwrap();
    let scorer = Arc::new(StubScorer::new(0).score_for("at", 70).score_for("below", 69));
    let h = harness(
        StubFetcher::new().with_posts(
            "deitaone",
            vec![post("at", "deitaone", 0), post("below", "deitaone", 1)],
        ),
        RecordingNotifier::new(),
        Some(scorer),
        &dir.path().join("seen.json"),
    );
    let pipeline = h.pipeline.with_min_score(70);

    let report = pipeline.run_cycle(&[account("deitaone")], true).await;

    assert_eq!(report.processed, 2);
    assert_eq!(report.notified, 1);
    assert_eq!(report.filtered_out, 1);
    assert_eq!(h.notifier.ids(), ["at"]);
    assert!(pipeline.seen().contains("below"), "filtered posts are marked seen");
}

#[tokio::test]
async fn rich_and_filtered_scenario_never_reevaluates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seen.json");
    let scorer = Arc::new(StubScorer::new(0).score_for("3", 85).score_for("4", 50));
    let h = harness(
        StubFetcher::new().with_posts("earnings", vec![post("3", "a", 0), post("4", "b", 1)]),
        RecordingNotifier::new(),
        Some(scorer.clone()),
        &path,
    );
    let pipeline = h.pipeline.with_min_score(70);
    let targets = [query("earnings")];

    pipeline.run_cycle(&targets, true).await;

    let sent = h.notifier.messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].post_id, "3");
    assert_eq!(sent[0].kind, MessageKind::Rich);
    assert!(sent[0].title.as_deref().unwrap().contains("Score: 85/100"));

    let stored = SeenStore::load(&path).unwrap();
    assert!(stored.contains("3") && stored.contains("4"));

    for _ in 0..3 {
        let r = pipeline.run_cycle(&targets, true).await;
        assert_eq!(r.processed, 0);
    }
    assert_eq!(scorer.calls(), ["3", "4"]);
    assert_eq!(h.notifier.ids(), ["3"]);
}

#[tokio::test]
async fn scoring_failure_falls_back_to_plain_message() {
    let dir = tempfile::tempdir().unwrap();
    // would be filtered if scoring had worked
    let scorer = Arc::new(StubScorer::new(5).fail_for("9"));
    let h = harness(
        StubFetcher::new().with_posts("walterbloomberg", vec![post("9", "walterbloomberg", 0)]),
        RecordingNotifier::new(),
        Some(scorer),
        &dir.path().join("seen.json"),
    );

    let report = h.pipeline.run_cycle(&[account("walterbloomberg")], true).await;

    assert_eq!(report.eval_fallbacks, 1);
    assert_eq!(report.notified, 1);
    let sent = h.notifier.messages();
    assert_eq!(sent[0].kind, MessageKind::Plain);
    assert_eq!(sent[0].context.as_deref(), Some("walterbloomberg (Priority: high)"));
    assert!(h.pipeline.seen().contains("9"));
}

#[tokio::test]
async fn enabled_filter_without_scorer_sends_plain() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        StubFetcher::new().with_posts("fed", vec![post("1", "a", 0), post("2", "a", 1)]),
        RecordingNotifier::new(),
        None,
        &dir.path().join("seen.json"),
    );
    assert!(!h.pipeline.has_scorer());

    let report = h.pipeline.run_cycle(&[query("fed")], true).await;

    assert_eq!(report.notified, 2);
    assert_eq!(report.filtered_out, 0);
    assert!(h
        .notifier
        .messages()
        .iter()
        .all(|m| m.kind == MessageKind::Plain));
}

#[tokio::test]
async fn relevance_filter_with_mock_provider_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let reply = r#"Sure, here is the analysis:
```json
{"score": 88, "category": "sec_filing", "sentiment": "bearish",
 "tickers": ["TSLA", "not a ticker"], "summary": "Form 4: CEO sold shares",
 "key_points": ["10-b5-1 plan"], "urgency": "high", "reasoning": "insider sale"}
```"#;
    let scorer: Arc<dyn Scorer> = Arc::new(RelevanceFilter::new(Arc::new(MockProvider::replying(reply))));
    let fetcher = Arc::new(StubFetcher::new().with_posts("$TSLA form 4", vec![post("42", "sec_alerts", 0)]));
    let notifier = Arc::new(RecordingNotifier::new());
    let pipeline = Pipeline::new(
        fetcher,
        notifier.clone(),
        SeenStore::empty(dir.path().join("seen.json")),
    )
    .with_scorer(Some(scorer))
    .with_notify_delay(std::time::Duration::ZERO);

    let report = pipeline.run_cycle(&[query("$TSLA form 4")], true).await;

    assert_eq!(report.notified, 1);
    let m = &notifier.messages()[0];
    assert_eq!(m.kind, MessageKind::Rich);
    assert_eq!(m.title.as_deref(), Some("⚠️ [sec_filing] Score: 88/100"));
    assert_eq!(m.color, Some("#FF9900"));
    assert_eq!(m.actions[1].url, "https://www.tradingview.com/chart/?symbol=TSLA");
}

#[tokio::test]
async fn unparseable_model_reply_is_a_fallback_not_a_drop() {
    let dir = tempfile::tempdir().unwrap();
    let scorer: Arc<dyn Scorer> =
        Arc::new(RelevanceFilter::new(Arc::new(MockProvider::replying("I cannot help with that."))));
    let notifier = Arc::new(RecordingNotifier::new());
    let pipeline = Pipeline::new(
        Arc::new(StubFetcher::new().with_posts("x", vec![post("1", "a", 0)])),
        notifier.clone(),
        SeenStore::empty(dir.path().join("seen.json")),
    )
    .with_scorer(Some(scorer));

    let report = pipeline.run_cycle(&[account("x")], true).await;

    assert_eq!(report.eval_fallbacks, 1);
    assert_eq!(notifier.messages()[0].kind, MessageKind::Plain);
}

#[tokio::test]
async fn default_gate_matches_the_config_default() {
    use x_market_crawler::config::ai::AiConfig;
    use x_market_crawler::pipeline::DEFAULT_MIN_SCORE;

    assert_eq!(AiConfig::default().min_score, DEFAULT_MIN_SCORE);

    let dir = tempfile::tempdir().unwrap();
    let scorer = Arc::new(
        StubScorer::new(0)
            .score_for("edge", DEFAULT_MIN_SCORE)
            .score_for("under", DEFAULT_MIN_SCORE - 1),
    );
    let h = harness(
        StubFetcher::new().with_posts("a", vec![post("edge", "a", 0), post("under", "a", 1)]),
        RecordingNotifier::new(),
        Some(scorer),
        &dir.path().join("seen.json"),
    );

    h.pipeline.run_cycle(&[account("a")], true).await;
    assert_eq!(h.notifier.ids(), ["edge"]);
}
