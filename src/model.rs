use std::fmt;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Pending,
    Completed,
    Blocked,
}

impl Status {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "blocked" => Ok(Self::Blocked),
            _ => bail!("invalid status '{s}': must be pending, completed, or blocked"),
        }
    }

    /// Decode a stored value. Anything unrecognised reads as pending.
    pub fn from_stored(s: &str) -> Self {
        Self::parse(s).unwrap_or_default()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Blocked => "blocked",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Self::Pending => ".",
            Self::Completed => "x",
            Self::Blocked => "~",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        Ok(raw.as_deref().map(Status::from_stored).unwrap_or_default())
    }
}

/// Urgency rank. Declaration order is sort order: high sorts first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Strict conversion for user input.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "1" | "high" => Ok(Self::High),
            "2" | "medium" => Ok(Self::Medium),
            "3" | "low" => Ok(Self::Low),
            _ => bail!("invalid priority '{s}': must be 1/high, 2/medium, or 3/low"),
        }
    }

    /// Lenient conversion for stored ranks; unknown values read as medium.
    pub fn from_rank(rank: i64) -> Self {
        match rank {
            1 => Self::High,
            3 => Self::Low,
            _ => Self::Medium,
        }
    }

    pub fn rank(self) -> u8 {
        match self {
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.rank())
    }
}

impl Serialize for Priority {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u8(self.rank())
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(d)?;
        Ok(lenient::integer(&raw).map(Priority::from_rank).unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(deserialize_with = "lenient::id")]
    pub id: String,
    #[serde(default)]
    pub zone: String,
    #[serde(default)]
    pub label: String,
    #[serde(default, deserialize_with = "lenient::minutes")]
    pub duration: i64,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub status: Status,
    #[serde(default, deserialize_with = "lenient::optional_id")]
    pub dependency: Option<String>,
    #[serde(default, deserialize_with = "lenient::days")]
    pub recurrence: u32,
    #[serde(
        default,
        alias = "lastCompleted",
        deserialize_with = "lenient::timestamp"
    )]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
}

impl Task {
    pub fn icon(&self) -> &'static str {
        self.status.icon()
    }

    pub fn is_pending(&self) -> bool {
        self.status == Status::Pending
    }

    pub fn is_completed(&self) -> bool {
        self.status == Status::Completed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

/// Fields for a task that does not exist yet.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub zone: String,
    pub label: String,
    pub duration: i64,
    pub priority: Priority,
    pub recurrence: u32,
    pub dependency: Option<String>,
    pub image_path: Option<String>,
}

/// Partial update of a task. `None` leaves a field alone; for clearable
/// fields `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub zone: Option<String>,
    pub label: Option<String>,
    pub duration: Option<i64>,
    pub priority: Option<Priority>,
    pub status: Option<Status>,
    pub dependency: Option<Option<String>>,
    pub recurrence: Option<u32>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
    pub completed_by: Option<Option<String>>,
    pub image_path: Option<Option<String>>,
}

impl TaskPatch {
    pub fn completed(at: DateTime<Utc>, by: Option<String>) -> Self {
        Self {
            status: Some(Status::Completed),
            completed_at: Some(Some(at)),
            completed_by: Some(by),
            ..Self::default()
        }
    }

    /// Back to pending with the completion record cleared.
    pub fn reactivated() -> Self {
        Self {
            status: Some(Status::Pending),
            completed_at: Some(None),
            completed_by: Some(None),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(label) = &self.label {
            if label.trim().is_empty() {
                bail!("label must not be empty");
            }
        }
        if let Some(zone) = &self.zone {
            if zone.trim().is_empty() {
                bail!("zone must not be empty");
            }
        }
        if let Some(d) = self.duration {
            if d <= 0 {
                bail!("duration must be a positive number of minutes, got {d}");
            }
        }
        if let Some(Some(dep)) = &self.dependency {
            if dep.is_empty() {
                bail!("dependency id must not be empty");
            }
        }
        let stamped = matches!(self.completed_at, Some(Some(_)));
        match self.status {
            Some(Status::Blocked) => {
                bail!("blocked is derived from dependencies and cannot be set directly")
            }
            Some(Status::Completed) if !stamped => {
                bail!("marking a task completed requires a completion time")
            }
            Some(Status::Pending) if stamped => {
                bail!("a pending task cannot carry a completion time")
            }
            _ => {}
        }
        Ok(())
    }

    pub fn apply(&self, task: &mut Task) {
        if let Some(v) = &self.zone {
            task.zone = v.clone();
        }
        if let Some(v) = &self.label {
            task.label = v.clone();
        }
        if let Some(v) = self.duration {
            task.duration = v;
        }
        if let Some(v) = self.priority {
            task.priority = v;
        }
        if let Some(v) = self.status {
            task.status = v;
        }
        if let Some(v) = &self.dependency {
            task.dependency = v.clone();
        }
        if let Some(v) = self.recurrence {
            task.recurrence = v;
        }
        if let Some(v) = self.completed_at {
            task.completed_at = v;
        }
        if let Some(v) = &self.completed_by {
            task.completed_by = v.clone();
        }
        if let Some(v) = &self.image_path {
            task.image_path = v.clone();
        }
    }
}

/// A write the scheduler asks the store to perform.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskUpdate {
    pub id: String,
    pub patch: TaskPatch,
}

/// Tolerant decoders for hand-edited or legacy JSON.
mod lenient {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn integer(v: &Value) -> Option<i64> {
        match v {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn text(v: Value) -> Option<String> {
        match v {
            Value::String(s) if !s.is_empty() => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        text(Value::deserialize(d)?).ok_or_else(|| serde::de::Error::custom("task id is missing"))
    }

    pub fn optional_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(text(Value::deserialize(d)?))
    }

    pub fn minutes<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        Ok(integer(&Value::deserialize(d)?).unwrap_or(0))
    }

    pub fn days<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
        let n = integer(&Value::deserialize(d)?).unwrap_or(0);
        Ok(n.clamp(0, u32::MAX as i64) as u32)
    }

    /// RFC 3339 text or epoch milliseconds; anything else is "never".
    pub fn timestamp<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            Value::Number(n) => n
                .as_i64()
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn task() -> Task {
        Task {
            id: "t1".into(),
            zone: "Kitchen".into(),
            label: "Wipe counters".into(),
            duration: 10,
            priority: Priority::Medium,
            status: Status::Pending,
            dependency: None,
            recurrence: 0,
            completed_at: None,
            completed_by: None,
            image_path: None,
        }
    }

    #[test]
    fn priority_orders_high_first() {
        assert!(Priority::High < Priority::Medium);
        assert!(Priority::Medium < Priority::Low);
    }

    #[test]
    fn unknown_priority_reads_as_medium() {
        assert_eq!(Priority::from_rank(0), Priority::Medium);
        assert_eq!(Priority::from_rank(7), Priority::Medium);
        assert_eq!(Priority::from_rank(1), Priority::High);
    }

    #[test]
    fn unknown_status_reads_as_pending() {
        assert_eq!(Status::from_stored("done"), Status::Pending);
        assert_eq!(Status::from_stored("completed"), Status::Completed);
    }

    #[test]
    fn legacy_json_is_accepted() {
        let json = r#"{
            "id": 7, "zone": "Kitchen", "label": "Load dishwasher",
            "duration": "10", "priority": 9, "status": "weird",
            "dependency": 3, "recurrence": -2, "lastCompleted": 86400000
        }"#;
        let t: Task = serde_json::from_str(json).unwrap();
        assert_eq!(t.id, "7");
        assert_eq!(t.duration, 10);
        assert_eq!(t.priority, Priority::Medium);
        assert_eq!(t.status, Status::Pending);
        assert_eq!(t.dependency.as_deref(), Some("3"));
        assert_eq!(t.recurrence, 0);
        assert_eq!(
            t.completed_at,
            Some(Utc.with_ymd_and_hms(1970, 1, 2, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn bad_timestamp_reads_as_never() {
        let json = r#"{"id": "a", "completedAt": "yesterday-ish", "dependency": null}"#;
        let t: Task = serde_json::from_str(json).unwrap();
        assert!(t.completed_at.is_none());
        assert!(t.dependency.is_none());
    }

    #[test]
    fn completed_patch_requires_timestamp() {
        let patch = TaskPatch {
            status: Some(Status::Completed),
            ..TaskPatch::default()
        };
        assert!(patch.validate().is_err());

        let at = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        assert!(TaskPatch::completed(at, None).validate().is_ok());
    }

    #[test]
    fn pending_patch_rejects_timestamp() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let patch = TaskPatch {
            status: Some(Status::Pending),
            completed_at: Some(Some(at)),
            ..TaskPatch::default()
        };
        assert!(patch.validate().is_err());
        assert!(TaskPatch::reactivated().validate().is_ok());
    }

    #[test]
    fn blocked_cannot_be_written() {
        let patch = TaskPatch {
            status: Some(Status::Blocked),
            ..TaskPatch::default()
        };
        assert!(patch.validate().is_err());
    }

    #[test]
    fn non_positive_duration_rejected_on_write() {
        let patch = TaskPatch {
            duration: Some(0),
            ..TaskPatch::default()
        };
        assert!(patch.validate().is_err());
    }

    #[test]
    fn apply_merges_only_set_fields() {
        let mut t = task();
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        TaskPatch::completed(at, Some("sam".into())).apply(&mut t);
        assert_eq!(t.status, Status::Completed);
        assert_eq!(t.completed_at, Some(at));
        assert_eq!(t.completed_by.as_deref(), Some("sam"));
        assert_eq!(t.label, "Wipe counters");

        TaskPatch::reactivated().apply(&mut t);
        assert_eq!(t.status, Status::Pending);
        assert!(t.completed_at.is_none());
        assert!(t.completed_by.is_none());
    }
}
