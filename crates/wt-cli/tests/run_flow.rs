//! End-to-end protocol test: a JSONL host stream through the tracking loop.
//!
//! Drives the real loop body with adapter-stamped timestamps, so segment
//! durations are exact and no sleeping is needed.

use tokio::io::BufReader;
use tokio::sync::mpsc;

use wt_cli::commands::run::drive;
use wt_client::Client;
use wt_core::policy::{CompiledPolicy, Policy, WorkUrlRule};
use wt_core::segment::{SegmentKind, TimeEvent};
use wt_core::shift::ShiftSchedule;
use wt_core::tracker::{Tracker, TrackerOptions};

fn fixture_tracker(monitor_non_work: bool) -> Tracker {
    let policy = Policy {
        id: 1,
        work_urls: vec![WorkUrlRule {
            url_pattern: r"/work/(\d+)".to_string(),
            work_id_extractor: r"/work/(\d+)".to_string(),
        }],
        monitor_idle_time: true,
        monitor_non_work_time: monitor_non_work,
    };
    Tracker::new(
        CompiledPolicy::compile(&policy),
        ShiftSchedule::default(),
        TrackerOptions::default(),
    )
}

/// The client is required by the loop signature but no line in these tests
/// triggers a network call.
fn offline_client() -> Client {
    Client::new("http://localhost:9", "test-token").unwrap()
}

async fn collect(tracker: &mut Tracker, input: &str) -> Vec<TimeEvent> {
    let (events, mut queue) = mpsc::unbounded_channel();
    let client = offline_client();

    drive(tracker, BufReader::new(input.as_bytes()), &events, &client)
        .await
        .unwrap();
    drop(events);

    let mut collected = Vec::new();
    while let Some(event) = queue.recv().await {
        collected.push(event);
    }
    collected
}

#[tokio::test]
async fn protocol_stream_produces_classified_events() {
    let input = concat!(
        r#"{"type":"tab_activated","tab_id":1,"url":"https://x/work/42","at":"2024-01-08T12:00:00Z"}"#, "\n",
        "this is not json\n",
        r#"{"type":"navigated","tab_id":1,"url":"https://news.example.com","at":"2024-01-08T12:00:10Z"}"#, "\n",
        r#"{"type":"idle_state_changed","state":"idle","at":"2024-01-08T12:00:30Z"}"#, "\n",
        r#"{"type":"idle_state_changed","state":"active","at":"2024-01-08T12:01:30Z"}"#, "\n",
        r#"{"type":"tab_activated","tab_id":2,"url":"chrome://settings","at":"2024-01-08T12:01:40Z"}"#, "\n",
        r#"{"type":"stop","at":"2024-01-08T12:05:00Z"}"#, "\n",
    );

    let mut tracker = fixture_tracker(true);
    let events = collect(&mut tracker, input).await;

    assert_eq!(events.len(), 3);

    assert_eq!(events[0].kind, SegmentKind::Work);
    assert_eq!(events[0].url.as_deref(), Some("https://x/work/42"));
    assert_eq!(events[0].work_id.as_ref().unwrap().as_str(), "42");
    assert_eq!(events[0].duration_ms(), 10_000);

    assert_eq!(events[1].kind, SegmentKind::NonWork);
    assert_eq!(events[1].url.as_deref(), Some("https://news.example.com"));
    assert_eq!(events[1].duration_ms(), 20_000);

    assert_eq!(events[2].kind, SegmentKind::Idle);
    assert!(events[2].url.is_none());
    assert_eq!(events[2].duration_ms(), 60_000);

    // The chrome:// activation abandoned the resumed segment, so the stop
    // at 12:05 had nothing left to flush.
}

#[tokio::test]
async fn non_work_segments_are_dropped_when_monitoring_disabled() {
    let input = concat!(
        r#"{"type":"tab_activated","tab_id":1,"url":"https://news.example.com","at":"2024-01-08T12:00:00Z"}"#, "\n",
        r#"{"type":"navigated","tab_id":1,"url":"https://x/work/9","at":"2024-01-08T12:00:10Z"}"#, "\n",
        r#"{"type":"stop","at":"2024-01-08T12:00:30Z"}"#, "\n",
    );

    let mut tracker = fixture_tracker(false);
    let events = collect(&mut tracker, input).await;

    // Only the work segment survives; the 10 s non-work visit is dropped.
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, SegmentKind::Work);
    assert_eq!(events[0].work_id.as_ref().unwrap().as_str(), "9");
    assert_eq!(events[0].duration_ms(), 20_000);
}

#[tokio::test]
async fn end_of_input_flushes_open_segment() {
    // No explicit stop: the adapter pipe closed. The open segment still
    // flushes, timestamped at processing time.
    let input = concat!(
        r#"{"type":"tab_activated","tab_id":1,"url":"https://x/work/3","at":"2024-01-08T12:00:00Z"}"#, "\n",
    );

    let mut tracker = fixture_tracker(true);
    let events = collect(&mut tracker, input).await;

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, SegmentKind::Work);
    assert!(events[0].duration_ms() >= 5000);
}

#[tokio::test]
async fn sub_noise_floor_segments_never_reach_the_channel() {
    let input = concat!(
        r#"{"type":"tab_activated","tab_id":1,"url":"https://a.example.com","at":"2024-01-08T12:00:00Z"}"#, "\n",
        r#"{"type":"navigated","tab_id":1,"url":"https://b.example.com","at":"2024-01-08T12:00:02Z"}"#, "\n",
        r#"{"type":"navigated","tab_id":1,"url":"https://c.example.com","at":"2024-01-08T12:00:04Z"}"#, "\n",
        r#"{"type":"stop","at":"2024-01-08T12:00:06Z"}"#, "\n",
    );

    let mut tracker = fixture_tracker(true);
    let events = collect(&mut tracker, input).await;
    assert!(events.is_empty());
}
