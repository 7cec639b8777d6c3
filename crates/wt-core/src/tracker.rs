//! The activity-segmentation state machine.
//!
//! Host adapters translate native notifications (tab focus, in-tab
//! navigation, idle transitions) into [`HostEvent`]s. The tracker reduces
//! that stream into non-overlapping, classified segments and hands each
//! accepted segment out as a [`TimeEvent`]. It is synchronous and
//! host-agnostic: state advances and closed segments transfer out before any
//! caller gets a chance to await, so an emission in flight can never be
//! touched by the next trigger.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::policy::{Classification, CompiledPolicy};
use crate::segment::{MIN_SEGMENT_MS, SegmentKind, TimeEvent};
use crate::shift::ShiftSchedule;

/// URL schemes belonging to browser-internal pages; never tracked.
const PRIVILEGED_SCHEMES: &[&str] = &[
    "chrome://",
    "chrome-extension://",
    "about:",
    "devtools://",
];

/// Returns whether a URL points at a browser-internal page.
pub fn is_privileged_url(url: &str) -> bool {
    PRIVILEGED_SCHEMES
        .iter()
        .any(|scheme| url.starts_with(scheme))
}

/// Raw idle state as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdleSignal {
    Active,
    Idle,
    Locked,
}

impl IdleSignal {
    /// Idle and locked require identical handling: both suspend tracking.
    const fn suspends(self) -> bool {
        matches!(self, Self::Idle | Self::Locked)
    }
}

/// A typed host notification consumed by the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    /// The active tab changed. `url` is the adapter-resolved URL of the
    /// newly focused tab, absent when resolution failed.
    TabActivated {
        tab_id: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    /// A tab navigated in place. Ignored unless it targets the focused tab
    /// and carries a URL.
    Navigated {
        tab_id: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    /// The host idle state changed.
    IdleStateChanged { state: IdleSignal },
    /// Periodic keep-alive; never changes state.
    Tick,
}

/// Tracker construction options.
#[derive(Debug, Clone, Copy)]
pub struct TrackerOptions {
    /// Emit idle time only where it overlaps an active shift.
    pub gate_idle_to_shifts: bool,
    /// Offset converting UTC instants to shift wall-clock time. Fixed at
    /// construction so gating stays deterministic.
    pub utc_offset: FixedOffset,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            gate_idle_to_shifts: false,
            utc_offset: Utc.fix(),
        }
    }
}

/// The focused tab as last reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FocusedTab {
    tab_id: i64,
    url: Option<String>,
}

/// The single open URL segment.
#[derive(Debug, Clone)]
struct OpenSegment {
    url: String,
    start: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Active,
    Suspended { idle_since: DateTime<Utc> },
}

/// Read-only snapshot of tracker state for UI and debugging consumers.
#[derive(Debug, Clone, Serialize)]
pub struct TrackerStatus {
    /// Whether a URL segment is currently open.
    pub tracking: bool,
    /// Whether the tracker is suspended (idle or locked).
    pub suspended: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_since: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_start: Option<DateTime<Utc>>,
    pub idle_monitoring: bool,
    pub non_work_monitoring: bool,
    pub in_active_shift: bool,
}

/// Owns all tracking state; multiple independent trackers never interfere.
#[derive(Debug)]
pub struct Tracker {
    policy: CompiledPolicy,
    schedule: ShiftSchedule,
    options: TrackerOptions,
    phase: Phase,
    focused: Option<FocusedTab>,
    open: Option<OpenSegment>,
}

impl Tracker {
    pub fn new(policy: CompiledPolicy, schedule: ShiftSchedule, options: TrackerOptions) -> Self {
        Self {
            policy,
            schedule,
            options,
            phase: Phase::Active,
            focused: None,
            open: None,
        }
    }

    /// Whether idle transitions are observed at all. When the policy turns
    /// idle monitoring off, adapters need not deliver idle notifications.
    pub const fn idle_monitoring_enabled(&self) -> bool {
        self.policy.monitor_idle_time()
    }

    /// Swaps in a freshly compiled policy. Safe at any time; filtering
    /// toggles are re-read when the next segment closes.
    pub fn replace_policy(&mut self, policy: CompiledPolicy) {
        self.policy = policy;
    }

    /// Swaps in a freshly loaded schedule, wholesale.
    pub fn replace_schedule(&mut self, schedule: ShiftSchedule) {
        self.schedule = schedule;
    }

    /// Advances the state machine by one host event, returning the accepted
    /// segments it produced. Ownership of each closed segment leaves the
    /// tracker here; callers may emit them asynchronously without locking.
    pub fn handle(&mut self, event: HostEvent, now: DateTime<Utc>) -> Vec<TimeEvent> {
        match event {
            HostEvent::Tick => Vec::new(),
            HostEvent::TabActivated { tab_id, url } => self.on_focus_change(tab_id, url, now),
            HostEvent::Navigated { tab_id, url } => {
                let Some(url) = url else {
                    return Vec::new();
                };
                if self.focused.as_ref().map(|tab| tab.tab_id) != Some(tab_id) {
                    return Vec::new();
                }
                self.on_focus_change(tab_id, Some(url), now)
            }
            HostEvent::IdleStateChanged { state } => self.on_idle_signal(state, now),
        }
    }

    /// Ends tracking: closes whatever is open through the normal filters and
    /// resets the tracker.
    pub fn stop(&mut self, now: DateTime<Utc>) -> Vec<TimeEvent> {
        self.focused = None;
        match std::mem::replace(&mut self.phase, Phase::Active) {
            Phase::Suspended { idle_since } => {
                self.close_idle_interval(idle_since, now).into_iter().collect()
            }
            Phase::Active => self.close_open_segment(now).into_iter().collect(),
        }
    }

    /// Read-only status snapshot.
    pub fn status(&self, now: DateTime<Utc>) -> TrackerStatus {
        let wall_clock = self.wall_clock(now);
        TrackerStatus {
            tracking: self.open.is_some(),
            suspended: matches!(self.phase, Phase::Suspended { .. }),
            idle_since: match self.phase {
                Phase::Suspended { idle_since } => Some(idle_since),
                Phase::Active => None,
            },
            current_url: self.open.as_ref().map(|segment| segment.url.clone()),
            segment_start: self.open.as_ref().map(|segment| segment.start),
            idle_monitoring: self.policy.monitor_idle_time(),
            non_work_monitoring: self.policy.monitor_non_work_time(),
            in_active_shift: self.schedule.is_in_active_shift(wall_clock),
        }
    }

    fn on_focus_change(
        &mut self,
        tab_id: i64,
        url: Option<String>,
        now: DateTime<Utc>,
    ) -> Vec<TimeEvent> {
        self.focused = Some(FocusedTab {
            tab_id,
            url: url.clone(),
        });

        if matches!(self.phase, Phase::Suspended { .. }) {
            // No segment churn while suspended; the snapshot above is what
            // resume reopens from.
            return Vec::new();
        }

        match url {
            Some(url) if !is_privileged_url(&url) => {
                let closed = self.close_open_segment(now);
                self.open = Some(OpenSegment { url, start: now });
                closed.into_iter().collect()
            }
            Some(url) => {
                // Browser-internal page: never tracked, and the open segment
                // is dropped rather than emitted.
                tracing::trace!(%url, "privileged URL; tracking abandoned");
                self.open = None;
                Vec::new()
            }
            None => self.close_open_segment(now).into_iter().collect(),
        }
    }

    fn on_idle_signal(&mut self, state: IdleSignal, now: DateTime<Utc>) -> Vec<TimeEvent> {
        if !self.policy.monitor_idle_time() {
            return Vec::new();
        }

        match (self.phase, state) {
            (Phase::Active, signal) if signal.suspends() => {
                let closed = self.close_open_segment(now);
                self.phase = Phase::Suspended { idle_since: now };
                closed.into_iter().collect()
            }
            (Phase::Suspended { idle_since }, IdleSignal::Active) => {
                self.phase = Phase::Active;
                let idle = self.close_idle_interval(idle_since, now);
                self.reopen_from_focus(now);
                idle.into_iter().collect()
            }
            // Self-transitions are no-ops.
            _ => Vec::new(),
        }
    }

    /// Reopens a URL segment for the focused tab, if it is trackable.
    fn reopen_from_focus(&mut self, now: DateTime<Utc>) {
        let url = self
            .focused
            .as_ref()
            .and_then(|tab| tab.url.clone())
            .filter(|url| !is_privileged_url(url));
        self.open = url.map(|url| OpenSegment { url, start: now });
    }

    /// Closes the open URL segment, if any, returning it when it passes the
    /// emission filters: the noise floor, then the non-work toggle.
    fn close_open_segment(&mut self, now: DateTime<Utc>) -> Option<TimeEvent> {
        let segment = self.open.take()?;
        let duration_ms = (now - segment.start).num_milliseconds();
        if duration_ms < MIN_SEGMENT_MS {
            tracing::trace!(url = %segment.url, duration_ms, "segment below noise floor, dropped");
            return None;
        }

        let Classification { kind, work_id } = self.policy.classify(&segment.url);
        if kind == SegmentKind::NonWork && !self.policy.monitor_non_work_time() {
            tracing::debug!(url = %segment.url, "non-work monitoring disabled, segment dropped");
            return None;
        }

        Some(TimeEvent {
            kind,
            url: Some(segment.url),
            work_id,
            start_time: segment.start,
            end_time: now,
        })
    }

    /// Closes an idle interval. Idle segments are never reclassified as
    /// non-work: eligibility is the monitor toggle (re-read here, since the
    /// policy may have been refreshed mid-suspension), optional shift
    /// gating, and the noise floor on whatever survives clipping.
    fn close_idle_interval(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Option<TimeEvent> {
        if !self.policy.monitor_idle_time() {
            return None;
        }

        let (start, end) = if self.options.gate_idle_to_shifts {
            self.gate_to_shift(start, end)?
        } else {
            (start, end)
        };

        let duration_ms = (end - start).num_milliseconds();
        if duration_ms < MIN_SEGMENT_MS {
            tracing::trace!(duration_ms, "idle interval below noise floor, dropped");
            return None;
        }

        Some(TimeEvent {
            kind: SegmentKind::Idle,
            url: None,
            work_id: None,
            start_time: start,
            end_time: end,
        })
    }

    /// Clips an idle interval to the shift it overlaps, in wall-clock time.
    fn gate_to_shift(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let (clipped_start, clipped_end) = self
            .schedule
            .clip_to_active_shift(self.wall_clock(start), self.wall_clock(end))?;
        Some((self.to_utc(clipped_start)?, self.to_utc(clipped_end)?))
    }

    fn wall_clock(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        instant.with_timezone(&self.options.utc_offset).naive_local()
    }

    fn to_utc(&self, wall_clock: NaiveDateTime) -> Option<DateTime<Utc>> {
        self.options
            .utc_offset
            .from_local_datetime(&wall_clock)
            .single()
            .map(|instant| instant.with_timezone(&Utc))
    }
}
