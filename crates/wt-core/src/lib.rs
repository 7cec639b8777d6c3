//! Core segmentation engine for the browser activity tracker.
//!
//! This crate contains the fundamental types and logic for:
//! - Policy: URL classification rules and monitoring toggles
//! - Shift scheduling: weekly windows, date-ranged assignments, idle clipping
//! - Tracker: the state machine reducing host signals into time segments

pub mod policy;
pub mod segment;
pub mod shift;
pub mod tracker;
pub mod types;

pub use policy::{Classification, CompiledPolicy, CompiledRule, Policy, RuleError, WorkUrlRule};
pub use segment::{IDLE_DETECTION_SECS, MIN_SEGMENT_MS, SegmentKind, TimeEvent};
pub use shift::{ShiftAssignment, ShiftDefinition, ShiftSchedule, ShiftWindow};
pub use tracker::{HostEvent, IdleSignal, Tracker, TrackerOptions, TrackerStatus};
pub use types::{ValidationError, WorkId};
