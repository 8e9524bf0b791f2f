use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use uuid::Uuid;

/// Lifecycle state of a task. See the state machine: 0 Queued, 1 Running,
/// 2 Succeeded, 3 Failed. Serialized on the wire as the bare integer, to
/// match the original task-service's `status_code` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum TaskStatusCode {
    Queued = 0,
    Running = 1,
    Succeeded = 2,
    Failed = 3,
}

impl TaskStatusCode {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl TryFrom<i16> for TaskStatusCode {
    type Error = crate::error::TaskflowError;

    fn try_from(v: i16) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::Queued),
            1 => Ok(Self::Running),
            2 => Ok(Self::Succeeded),
            3 => Ok(Self::Failed),
            other => Err(crate::error::TaskflowError::InvalidInput(format!(
                "unknown status_code {other}"
            ))),
        }
    }
}

impl From<TaskStatusCode> for i16 {
    fn from(v: TaskStatusCode) -> i16 {
        v as i16
    }
}

impl Serialize for TaskStatusCode {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i16((*self).into())
    }
}

impl<'de> Deserialize<'de> for TaskStatusCode {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let v = i16::deserialize(d)?;
        TaskStatusCode::try_from(v).map_err(serde::de::Error::custom)
    }
}

/// A unit of work tracked by the task store. `input` is immutable once
/// created; `state`, `output`, `status`, `progress_percentage`,
/// `scheduled_start_timestamp` and `status_code` are the only mutable
/// fields (see [`MUTABLE_FIELDS`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub name: String,
    pub workspace_id: i64,
    pub creation_timestamp: DateTime<Utc>,
    pub modification_timestamp: DateTime<Utc>,
    pub scheduled_start_timestamp: DateTime<Utc>,
    pub start_timestamp: Option<DateTime<Utc>>,
    pub end_timestamp: Option<DateTime<Utc>>,
    pub status_code: TaskStatusCode,
    pub status: Value,
    pub progress_percentage: i16,
    pub input: Value,
    pub state: Value,
    pub output: Value,
}

/// The set of fields a `PUT /task/{id}` caller may supply. Anything outside
/// this set is rejected with `TaskflowError::InvalidInput`, matching the
/// original `provided_fields.issubset(...)` check.
pub const MUTABLE_FIELDS: &[&str] = &[
    "status_code",
    "status",
    "progress_percentage",
    "output",
    "state",
    "scheduled_start_timestamp",
];

/// A partial update to a task, as received over the wire. All fields are
/// optional; only fields present in the original JSON body should be set
/// here (distinguish "absent" from "null" at the deserialization site).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskUpdate {
    pub status_code: Option<i16>,
    pub status: Option<Value>,
    pub progress_percentage: Option<i16>,
    pub output: Option<Value>,
    pub state: Option<Value>,
    pub scheduled_start_timestamp: Option<i64>,
}

/// Request body for `POST /task`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskRequest {
    pub name: String,
    pub input: Value,
    #[serde(default)]
    pub workspace_id: i64,
    pub scheduled_start_timestamp: Option<i64>,
}

/// The subset of a task returned by `GET /task/{id}/status`.
#[derive(Debug, Clone, Serialize)]
pub struct TaskStatusView {
    pub status_code: TaskStatusCode,
    pub status: Value,
    pub progress_percentage: i16,
    pub start_timestamp: Option<i64>,
    pub end_timestamp: Option<i64>,
}

impl From<&Task> for TaskStatusView {
    fn from(t: &Task) -> Self {
        Self {
            status_code: t.status_code,
            status: t.status.clone(),
            progress_percentage: t.progress_percentage,
            start_timestamp: t.start_timestamp.map(|ts| ts.timestamp()),
            end_timestamp: t.end_timestamp.map(|ts| ts.timestamp()),
        }
    }
}

/// Validates that an update only touches allowed fields and, if it sets
/// `status_code`, that the transition is legal from `current`. Does not
/// apply side effects (timestamps, forced progress) — callers apply those
/// in the same store transaction that commits the update; see
/// `taskflow-postgres::store::apply_update_side_effects` for the exact
/// ordering, grounded on the original `PUT /task/{id}` handler.
pub fn validate_transition(current: TaskStatusCode, next: TaskStatusCode) -> crate::error::Result<()> {
    use TaskStatusCode::*;
    let legal = matches!(
        (current, next),
        (Queued, Queued) | (Queued, Running) | (Queued, Failed) | (Running, Succeeded) | (Running, Failed)
    );
    if legal {
        Ok(())
    } else {
        Err(crate::error::TaskflowError::IllegalTransition(format!(
            "{:?} -> {:?} is not a permitted transition",
            current, next
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_round_trips_through_json() {
        let v = serde_json::to_value(TaskStatusCode::Succeeded).unwrap();
        assert_eq!(v, serde_json::json!(2));
        let back: TaskStatusCode = serde_json::from_value(v).unwrap();
        assert_eq!(back, TaskStatusCode::Succeeded);
    }

    #[test]
    fn unknown_status_code_rejected() {
        let err = serde_json::from_value::<TaskStatusCode>(serde_json::json!(9));
        assert!(err.is_err());
    }

    #[test]
    fn queued_to_running_is_legal() {
        assert!(validate_transition(TaskStatusCode::Queued, TaskStatusCode::Running).is_ok());
    }

    #[test]
    fn succeeded_to_running_is_illegal() {
        assert!(validate_transition(TaskStatusCode::Succeeded, TaskStatusCode::Running).is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(TaskStatusCode::Succeeded.is_terminal());
        assert!(TaskStatusCode::Failed.is_terminal());
        assert!(!TaskStatusCode::Queued.is_terminal());
        assert!(!TaskStatusCode::Running.is_terminal());
    }
}
