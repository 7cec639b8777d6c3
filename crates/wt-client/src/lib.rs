//! REST client for the activity collector.
//!
//! Wraps the collector endpoints the tracker consumes: work policy, shift
//! assignments and definitions, and time-event submission. The wire shapes
//! vary across deployments (stringified rule lists, definitions nested under
//! a `shift` key), so the decoders here are deliberately tolerant and
//! degrade to safe defaults instead of failing the whole feature.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use thiserror::Error;

use wt_core::policy::{Policy, WorkUrlRule};
use wt_core::segment::TimeEvent;
use wt_core::shift::{
    self, ShiftAssignment, ShiftDefinition, ShiftSchedule, all_working_days,
};

/// Default request timeout for collector calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Collector client errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The provided auth token was invalid.
    #[error("invalid auth token: {reason}")]
    InvalidToken { reason: &'static str },
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Collector returned a non-success status.
    #[error("collector returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    /// Failed to parse a response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Collector API client.
///
/// # Thread Safety
///
/// The client is safe to share across tasks; each clone of the inner
/// `reqwest::Client` shares the underlying connection pool.
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a new client for the given collector base URL and bearer
    /// token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is empty or whitespace-only, or if the
    /// HTTP client fails to build.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, ApiError> {
        let token = token.into();
        if token.is_empty() {
            return Err(ApiError::InvalidToken {
                reason: "token cannot be empty",
            });
        }
        if token.trim().is_empty() {
            return Err(ApiError::InvalidToken {
                reason: "token cannot be whitespace-only",
            });
        }

        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(ApiError::ClientBuild)?;

        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }

        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn get(&self, path: &str) -> Result<String, ApiError> {
        let response = self
            .http
            .get(self.endpoint(path))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::read_success(response).await
    }

    async fn read_success(response: reqwest::Response) -> Result<String, ApiError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::Status { status, body });
        }
        Ok(body)
    }

    /// Fetches the caller's work policy, if one is configured.
    ///
    /// The collector wraps policies in a `workPolicy` array; the first
    /// record wins.
    pub async fn fetch_work_policy(&self) -> Result<Option<Policy>, ApiError> {
        let body = self.get("work-policy").await?;
        let payload: WorkPolicyResponse = serde_json::from_str(&body)
            .map_err(|err| ApiError::InvalidResponse(format!("work policy: {err}")))?;
        Ok(payload
            .work_policy
            .into_iter()
            .next()
            .map(PolicyRecord::into_policy))
    }

    /// Fetches the current user's shift assignments.
    pub async fn fetch_shift_assignments(&self) -> Result<Vec<ShiftAssignment>, ApiError> {
        let body = self.get("shift-assignments").await?;
        let records: Vec<AssignmentRecord> = serde_json::from_str(&body)
            .map_err(|err| ApiError::InvalidResponse(format!("shift assignments: {err}")))?;
        records
            .into_iter()
            .map(AssignmentRecord::into_assignment)
            .collect()
    }

    /// Fetches one shift definition by id.
    pub async fn fetch_shift_details(&self, shift_id: i64) -> Result<ShiftDefinition, ApiError> {
        let body = self.get(&format!("shifts/{shift_id}")).await?;
        let record: ShiftDetailsRecord = serde_json::from_str(&body)
            .map_err(|err| ApiError::InvalidResponse(format!("shift {shift_id}: {err}")))?;
        record.into_definition(shift_id)
    }

    /// Posts one accepted time event. Failures surface to the caller and
    /// are never retried here.
    pub async fn create_time_event(&self, event: &TimeEvent) -> Result<(), ApiError> {
        let response = self
            .http
            .post(self.endpoint("time-events"))
            .bearer_auth(&self.token)
            .json(event)
            .send()
            .await?;
        Self::read_success(response).await.map(|_| ())
    }

    /// Fetches assignments and their definitions as one complete schedule.
    ///
    /// Assignment fetch failure fails the whole load, so callers keep their
    /// previous cache. A single definition failure is logged and skipped;
    /// that assignment simply never matches.
    pub async fn load_shift_schedule(&self) -> Result<ShiftSchedule, ApiError> {
        let assignments = self.fetch_shift_assignments().await?;

        let mut definitions = Vec::new();
        let mut fetched: HashSet<i64> = HashSet::new();
        for assignment in &assignments {
            if !fetched.insert(assignment.shift_id) {
                continue;
            }
            match self.fetch_shift_details(assignment.shift_id).await {
                Ok(definition) => definitions.push(definition),
                Err(error) => {
                    tracing::warn!(
                        shift_id = assignment.shift_id,
                        %error,
                        "skipping shift definition"
                    );
                }
            }
        }

        Ok(ShiftSchedule::new(assignments, definitions))
    }
}

#[derive(Debug, Deserialize)]
struct WorkPolicyResponse {
    #[serde(rename = "workPolicy", default)]
    work_policy: Vec<PolicyRecord>,
}

#[derive(Debug, Deserialize)]
struct PolicyRecord {
    id: i64,
    #[serde(default)]
    work_urls: Option<WorkUrlsField>,
    #[serde(default)]
    monitor_idle_time: bool,
    #[serde(default)]
    monitor_non_work_time: bool,
}

/// `work_urls` arrives either as a JSON-encoded string or a plain array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WorkUrlsField {
    Encoded(String),
    Rules(Vec<WorkUrlRule>),
}

impl PolicyRecord {
    fn into_policy(self) -> Policy {
        let work_urls = match self.work_urls {
            None => Vec::new(),
            Some(WorkUrlsField::Rules(rules)) => rules,
            Some(WorkUrlsField::Encoded(raw)) => match serde_json::from_str(&raw) {
                Ok(rules) => rules,
                Err(error) => {
                    tracing::warn!(policy = self.id, %error, "work_urls does not decode; treating as empty");
                    Vec::new()
                }
            },
        };
        Policy {
            id: self.id,
            work_urls,
            monitor_idle_time: self.monitor_idle_time,
            monitor_non_work_time: self.monitor_non_work_time,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AssignmentRecord {
    #[serde(default)]
    user_id: Option<serde_json::Value>,
    shift_id: i64,
    start_date: String,
    end_date: String,
}

impl AssignmentRecord {
    fn into_assignment(self) -> Result<ShiftAssignment, ApiError> {
        Ok(ShiftAssignment {
            user_id: self.user_id.map(|value| match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            }),
            shift_id: self.shift_id,
            start_date: parse_wire_date(&self.start_date)?,
            end_date: parse_wire_date(&self.end_date)?,
        })
    }
}

/// Parses a wire date, accepting `YYYY-MM-DD` or a full ISO-8601 timestamp.
fn parse_wire_date(value: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|instant| instant.date_naive())
        })
        .ok_or_else(|| ApiError::InvalidResponse(format!("invalid date: {value:?}")))
}

/// A shift-details response; some deployments nest the definition under a
/// `shift` key.
#[derive(Debug, Deserialize)]
struct ShiftDetailsRecord {
    #[serde(default)]
    days: Option<Vec<String>>,
    #[serde(default)]
    start_time: Option<String>,
    #[serde(default)]
    end_time: Option<String>,
    #[serde(default)]
    break_duration_minutes: Option<u32>,
    #[serde(default)]
    shift: Option<Box<ShiftDetailsRecord>>,
}

impl ShiftDetailsRecord {
    fn into_definition(self, shift_id: i64) -> Result<ShiftDefinition, ApiError> {
        // Prefer the flat shape; fall back to the nested one.
        let record = match self {
            Self {
                days: None,
                shift: Some(nested),
                ..
            } => *nested,
            record => record,
        };

        let working_days = match record.days {
            Some(names) => {
                let mut days = HashSet::new();
                for name in &names {
                    match shift::parse_weekday(name) {
                        Ok(day) => {
                            days.insert(day);
                        }
                        Err(error) => tracing::warn!(shift_id, %error, "ignoring unknown weekday"),
                    }
                }
                days
            }
            None => {
                tracing::warn!(shift_id, "shift has no day list; treating all days as working days");
                all_working_days()
            }
        };

        let start_time = record.start_time.as_deref().ok_or_else(|| {
            ApiError::InvalidResponse(format!("shift {shift_id} has no start time"))
        })?;
        let end_time = record.end_time.as_deref().ok_or_else(|| {
            ApiError::InvalidResponse(format!("shift {shift_id} has no end time"))
        })?;

        Ok(ShiftDefinition {
            id: shift_id,
            working_days,
            start_time: shift::parse_time_of_day(start_time)
                .map_err(|err| ApiError::InvalidResponse(err.to_string()))?,
            end_time: shift::parse_time_of_day(end_time)
                .map_err(|err| ApiError::InvalidResponse(err.to_string()))?,
            break_minutes: record.break_duration_minutes.unwrap_or(0),
        })
    }
}
