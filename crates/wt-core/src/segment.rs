//! Classified time segments and their wire representation.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::WorkId;

/// Minimum duration, in milliseconds, for a segment to be emitted.
///
/// Shorter segments are treated as detector noise (a tab flicked past, an
/// idle blip) and silently dropped.
pub const MIN_SEGMENT_MS: i64 = 5000;

/// Seconds of no input before the host reports a non-active idle state.
///
/// Host adapters configure their idle detector with this value so that idle
/// intervals line up with what the tracker expects.
pub const IDLE_DETECTION_SECS: u32 = 30;

/// Canonical segment classifications, the single source of truth for the
/// wire strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    Work,
    NonWork,
    Idle,
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Work => "work",
            Self::NonWork => "non_work",
            Self::Idle => "idle",
        };
        write!(f, "{s}")
    }
}

impl FromStr for SegmentKind {
    type Err = UnknownSegmentKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "work" => Ok(Self::Work),
            "non_work" => Ok(Self::NonWork),
            "idle" => Ok(Self::Idle),
            _ => Err(UnknownSegmentKind(s.to_string())),
        }
    }
}

impl Serialize for SegmentKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SegmentKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Error type for unknown segment kind strings.
#[derive(Debug, Clone)]
pub struct UnknownSegmentKind(String);

impl fmt::Display for UnknownSegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown segment kind: {}", self.0)
    }
}

impl std::error::Error for UnknownSegmentKind {}

/// The durable wire-format record of one accepted segment.
///
/// Timestamps serialize as ISO-8601; `url` and `workId` are omitted when
/// absent (idle events carry neither).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeEvent {
    #[serde(rename = "type")]
    pub kind: SegmentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_id: Option<WorkId>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl TimeEvent {
    /// Segment duration in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        (self.end_time - self.start_time).num_milliseconds()
    }
}
