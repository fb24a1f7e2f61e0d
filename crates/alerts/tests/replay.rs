//! Replays `data/events/sample.jsonl` against `data/policies/examples.yml`.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use watchpost_alerts::{
    load_policies, AlertMatchPipeline, ChannelSink, EmitDecision, Outcome, ThrottleManager,
};
use watchpost_core::config::ThrottleConfig;
use watchpost_core::Event;

fn data_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../data")
}

fn load_events() -> Vec<Event> {
    let path = data_dir().join("events/sample.jsonl");
    let raw = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e));
    raw.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| Event::from_json_str(l).unwrap())
        .collect()
}

fn setup() -> (AlertMatchPipeline, ThrottleManager, tokio::sync::mpsc::Receiver<watchpost_alerts::AlertSignal>) {
    let path = data_dir().join("policies/examples.yml");
    let yaml = std::fs::read_to_string(&path).unwrap();
    let policies = load_policies(&yaml).unwrap();
    let throttle = ThrottleManager::in_memory(ThrottleConfig::default());
    let (sink, rx) = ChannelSink::channel(64);
    let pipeline = AlertMatchPipeline::new(policies, throttle.clone(), Arc::new(sink));
    (pipeline, throttle, rx)
}

#[tokio::test]
async fn sample_replay_produces_expected_alerts() {
    let (pipeline, _, mut rx) = setup();
    assert_eq!(pipeline.policy_count(), 3);

    let mut per_event = Vec::new();
    for event in load_events() {
        let outcomes = pipeline.process_at(&event, event.timestamp).await;
        assert_eq!(outcomes.len(), 3);
        // the disabled policy never runs
        assert_eq!(outcomes[2].outcome, Outcome::Disabled);
        per_event.push(outcomes);
    }
    drop(pipeline);

    let mut signals = Vec::new();
    while let Some(s) = rx.recv().await {
        signals.push(s);
    }
    let summary: Vec<(&str, Option<u32>)> = signals
        .iter()
        .map(|s| (s.policy_id.as_str(), s.alert_count))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("admin-login-failure", Some(1)),
            ("disk-pressure", Some(1)),
            ("disk-pressure", Some(2)),
            ("disk-pressure", Some(1)),
        ]
    );
    assert_eq!(signals[0].suppression_key, "login:alice");
    assert_eq!(signals[0].providers, vec!["slack".to_string(), "pagerduty".to_string()]);

    // second failed login 2 minutes later falls inside the 10 minute gap
    assert!(matches!(
        per_event[1][0].outcome,
        Outcome::Withheld {
            decision: EmitDecision::Throttled { .. }
        }
    ));
    // successful login does not match; other tenant is not watched
    assert_eq!(per_event[2][0].outcome, Outcome::NoMatch);
    assert_eq!(per_event[3][0].outcome, Outcome::TenantMismatch);
    // third disk alert in the 10:00 hour hits the cap of two
    assert_eq!(
        per_event[6][1].outcome,
        Outcome::Withheld {
            decision: EmitDecision::RateCapped { alert_count: 2 }
        }
    );
}

#[tokio::test]
async fn suppression_window_withholds_matches() {
    let (pipeline, throttle, _rx) = setup();
    let now = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
    throttle
        .suppress("disk-pressure", "default", now + Duration::minutes(10), Some("disk swap".into()), now)
        .await
        .unwrap();

    let event = Event::from_json_str(
        r#"{"event_type": "metric", "source": "storage-1", "payload": {"disk": {"used_pct": 99}}}"#,
    )
    .unwrap();

    let blocked = pipeline.process_at(&event, now + Duration::minutes(5)).await;
    assert!(matches!(
        blocked[1].outcome,
        Outcome::Withheld {
            decision: EmitDecision::Suppressed { .. }
        }
    ));

    let allowed = pipeline.process_at(&event, now + Duration::minutes(10)).await;
    assert!(allowed[1].signal().is_some());
}
