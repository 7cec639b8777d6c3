//! The tracking loop: host events in, time events out.
//!
//! Stdin carries one JSON message per line, the protocol a native-messaging
//! bridge speaks. Tracker events advance the state machine; control messages
//! manage the loop itself. Each message may carry an optional `at` timestamp
//! (ISO-8601) stamped by the adapter at capture time; without one, the
//! message is processed at arrival time.
//!
//! Accepted segments flow through an unbounded channel to an emitter task,
//! so the state machine is never blocked behind a slow collector call: by
//! the time an emission awaits, the tracker has already moved on.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use wt_client::Client;
use wt_core::policy::CompiledPolicy;
use wt_core::segment::TimeEvent;
use wt_core::shift::ShiftSchedule;
use wt_core::tracker::{HostEvent, Tracker, TrackerOptions};

use crate::Config;

use super::build_client;

/// One protocol line: an optional capture timestamp plus the message.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    message: Inbound,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Inbound {
    Host(HostEvent),
    Control(ControlMessage),
}

/// Loop control messages from the host adapter.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ControlMessage {
    /// Re-fetch the policy and shift caches; failure keeps the old ones.
    Refresh,
    /// Write the tracker status to stdout.
    Status,
    /// Flush the open segment and exit.
    Stop,
}

pub async fn run(config: &Config) -> Result<()> {
    let client = Arc::new(build_client(config)?);

    let Some(policy) = client
        .fetch_work_policy()
        .await
        .context("failed to fetch work policy")?
    else {
        tracing::error!("no work policy configured; tracking not started");
        return Ok(());
    };
    let compiled = CompiledPolicy::compile(&policy);
    tracing::info!(
        policy = compiled.id(),
        rules = compiled.rule_count(),
        "work policy loaded"
    );

    let schedule = match client.load_shift_schedule().await {
        Ok(schedule) => schedule,
        Err(error) => {
            tracing::warn!(%error, "shift schedule unavailable; idle shift gating degraded");
            ShiftSchedule::default()
        }
    };

    let options = TrackerOptions {
        gate_idle_to_shifts: config.gate_idle_to_shifts,
        utc_offset: *Local::now().offset(),
    };
    let mut tracker = Tracker::new(compiled, schedule, options);
    if tracker.idle_monitoring_enabled() {
        tracing::info!("idle monitoring enabled");
    } else {
        tracing::info!("idle monitoring disabled by policy");
    }

    let (events, queue) = mpsc::unbounded_channel();
    let emitter = tokio::spawn(emit_events(Arc::clone(&client), queue));

    let stdin = BufReader::new(tokio::io::stdin());
    drive(&mut tracker, stdin, &events, &client).await?;

    // Close the channel so the emitter drains and exits.
    drop(events);
    emitter.await.context("emitter task failed")?;
    Ok(())
}

/// Feeds protocol lines to the tracker until stop or end of input, then
/// flushes whatever is still open.
pub async fn drive<R>(
    tracker: &mut Tracker,
    reader: R,
    events: &mpsc::UnboundedSender<TimeEvent>,
    client: &Client,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines
        .next_line()
        .await
        .context("failed to read host input")?
    {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let envelope: Envelope = match serde_json::from_str(line) {
            Ok(envelope) => envelope,
            Err(error) => {
                tracing::warn!(%error, "skipping malformed host message");
                continue;
            }
        };
        let now = envelope.at.unwrap_or_else(Utc::now);

        match envelope.message {
            Inbound::Host(event) => {
                for event in tracker.handle(event, now) {
                    forward(events, event);
                }
            }
            Inbound::Control(ControlMessage::Refresh) => refresh(tracker, client).await,
            Inbound::Control(ControlMessage::Status) => {
                let payload = serde_json::to_string(&tracker.status(now))
                    .context("failed to encode status")?;
                println!("{payload}");
            }
            Inbound::Control(ControlMessage::Stop) => {
                for event in tracker.stop(now) {
                    forward(events, event);
                }
                return Ok(());
            }
        }
    }

    for event in tracker.stop(Utc::now()) {
        forward(events, event);
    }
    Ok(())
}

fn forward(events: &mpsc::UnboundedSender<TimeEvent>, event: TimeEvent) {
    if events.send(event).is_err() {
        tracing::error!("event channel closed; segment dropped");
    }
}

/// All-or-nothing cache refresh; failures keep the previous caches.
async fn refresh(tracker: &mut Tracker, client: &Client) {
    match client.fetch_work_policy().await {
        Ok(Some(policy)) => {
            tracker.replace_policy(CompiledPolicy::compile(&policy));
            tracing::debug!("work policy refreshed");
        }
        Ok(None) => tracing::warn!("no work policy on refresh; keeping the previous one"),
        Err(error) => tracing::warn!(%error, "policy refresh failed; keeping the previous one"),
    }

    match client.load_shift_schedule().await {
        Ok(schedule) => {
            tracker.replace_schedule(schedule);
            tracing::debug!("shift schedule refreshed");
        }
        Err(error) => tracing::warn!(%error, "shift refresh failed; keeping the previous cache"),
    }
}

/// Posts each accepted event once; failures are logged and the event is
/// dropped.
async fn emit_events(client: Arc<Client>, mut queue: mpsc::UnboundedReceiver<TimeEvent>) {
    while let Some(event) = queue.recv().await {
        if let Err(error) = client.create_time_event(&event).await {
            tracing::error!(%error, kind = %event.kind, "failed to emit time event; event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_parses_host_event_with_timestamp() {
        let envelope: Envelope = serde_json::from_str(
            r#"{"type":"tab_activated","tab_id":1,"url":"https://x","at":"2024-01-08T12:00:00Z"}"#,
        )
        .unwrap();
        assert!(envelope.at.is_some());
        assert!(matches!(
            envelope.message,
            Inbound::Host(HostEvent::TabActivated { tab_id: 1, .. })
        ));
    }

    #[test]
    fn envelope_parses_control_message_without_timestamp() {
        let envelope: Envelope = serde_json::from_str(r#"{"type":"refresh"}"#).unwrap();
        assert!(envelope.at.is_none());
        assert!(matches!(
            envelope.message,
            Inbound::Control(ControlMessage::Refresh)
        ));
    }

    #[test]
    fn envelope_rejects_unknown_message_type() {
        let result: Result<Envelope, _> = serde_json::from_str(r#"{"type":"reboot"}"#);
        assert!(result.is_err());
    }
}
