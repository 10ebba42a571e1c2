use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::datetime::deadline_serde;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    #[serde(alias = "common")]
    Shared,
    #[serde(alias = "private", alias = "husband", alias = "wife")]
    Personal,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Shared => f.write_str("shared"),
            Visibility::Personal => f.write_str("personal"),
        }
    }
}

impl std::str::FromStr for Visibility {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shared" | "common" => Ok(Visibility::Shared),
            "personal" | "private" => Ok(Visibility::Personal),
            other => Err(anyhow::anyhow!("unknown visibility: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Pending,
    #[serde(alias = "completed")]
    Done,
}

impl Status {
    pub fn toggled(self) -> Self {
        match self {
            Status::Pending => Status::Done,
            Status::Done => Status::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RepeatRule {
    Daily,
    Weekly,
    Monthly,
}

impl RepeatRule {
    /// Unknown rule names mean "no recurrence" rather than an error.
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "daily" => Some(RepeatRule::Daily),
            "weekly" => Some(RepeatRule::Weekly),
            "monthly" => Some(RepeatRule::Monthly),
            _ => None,
        }
    }
}

impl fmt::Display for RepeatRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepeatRule::Daily => f.write_str("daily"),
            RepeatRule::Weekly => f.write_str("weekly"),
            RepeatRule::Monthly => f.write_str("monthly"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subtask {
    #[serde(deserialize_with = "id_serde::deserialize")]
    pub id: Uuid,
    pub title: String,
    #[serde(default, alias = "isDone")]
    pub is_done: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    #[serde(deserialize_with = "id_serde::deserialize")]
    pub id: Uuid,

    pub title: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub visibility: Visibility,

    #[serde(default)]
    pub status: Status,

    #[serde(default, with = "deadline_serde")]
    pub deadline: Option<DateTime<Utc>>,

    #[serde(default, alias = "repeatRule", with = "repeat_rule_serde")]
    pub repeat_rule: Option<RepeatRule>,

    #[serde(default)]
    pub subtasks: Vec<Subtask>,
}

impl Task {
    pub fn from_new(new: NewTask) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: new.title,
            description: new.description,
            visibility: new.visibility,
            status: Status::Pending,
            deadline: new.deadline,
            repeat_rule: new.repeat_rule,
            subtasks: vec![],
        }
    }

    pub fn is_done(&self) -> bool {
        self.status == Status::Done
    }

    pub fn is_shared(&self) -> bool {
        self.visibility == Visibility::Shared
    }

    /// `(done, total)`, or `None` when the task has no subtasks.
    pub fn subtask_progress(&self) -> Option<(usize, usize)> {
        if self.subtasks.is_empty() {
            return None;
        }
        let done = self.subtasks.iter().filter(|sub| sub.is_done).count();
        Some((done, self.subtasks.len()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub visibility: Visibility,
    pub deadline: Option<DateTime<Utc>>,
    pub repeat_rule: Option<RepeatRule>,
}

/// Field-level update. The outer `Option` means "leave unchanged".
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub visibility: Option<Visibility>,
    pub status: Option<Status>,
    pub deadline: Option<Option<DateTime<Utc>>>,
    pub repeat_rule: Option<Option<RepeatRule>>,
}

impl TaskPatch {
    pub fn status(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.visibility.is_none()
            && self.status.is_none()
            && self.deadline.is_none()
            && self.repeat_rule.is_none()
    }

    pub fn apply(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(visibility) = self.visibility {
            task.visibility = visibility;
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(deadline) = self.deadline {
            task.deadline = deadline;
        }
        if let Some(repeat_rule) = self.repeat_rule {
            task.repeat_rule = repeat_rule;
        }
    }
}

/// Stable uuid for an integer id written by the old server store.
///
/// The number fills the first uuid group, so the 8-character short id shown by the CLI is
/// the old number in hex.
pub fn legacy_id(number: u32) -> Uuid {
    Uuid::from_fields(number, 0, 0, b"hearthv0")
}

mod id_serde {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};
    use uuid::Uuid;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum WireId {
        Uuid(Uuid),
        Number(u64),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Uuid, D::Error>
    where
        D: Deserializer<'de>,
    {
        match WireId::deserialize(deserializer)? {
            WireId::Uuid(id) => Ok(id),
            WireId::Number(number) => u32::try_from(number)
                .map(super::legacy_id)
                .map_err(|_| D::Error::custom(format!("legacy id {number} is out of range"))),
        }
    }
}

mod repeat_rule_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::RepeatRule;

    pub fn serialize<S>(rule: &Option<RepeatRule>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        rule.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<RepeatRule>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(|value| {
            let parsed = RepeatRule::parse_lenient(value);
            if parsed.is_none() && !value.trim().is_empty() {
                tracing::warn!(repeat_rule = %value, "unrecognized repeat rule; treating as none");
            }
            parsed
        }))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn deserializes_store_snapshot_without_utc_marker() {
        let raw = r#"{
            "id": "7f1c8a52-3c1e-4f57-9a53-0d5d1e0f9b11",
            "title": "Take out trash",
            "description": null,
            "visibility": "common",
            "status": "pending",
            "deadline": "2024-01-10T15:30:00",
            "repeat_rule": "weekly",
            "subtasks": [
                {"id": "0e6b8d0e-5d3b-4c2a-8f0e-6a4a0b1a2c3d", "title": "bins", "is_done": true}
            ]
        }"#;

        let task: Task = serde_json::from_str(raw).expect("parse task");
        assert_eq!(task.visibility, Visibility::Shared);
        assert_eq!(task.repeat_rule, Some(RepeatRule::Weekly));
        assert_eq!(
            task.deadline,
            Utc.with_ymd_and_hms(2024, 1, 10, 15, 30, 0).single()
        );
        assert_eq!(task.subtask_progress(), Some((1, 1)));
    }

    #[test]
    fn unknown_repeat_rule_and_bad_deadline_degrade_to_none() {
        let raw = r#"{
            "id": "7f1c8a52-3c1e-4f57-9a53-0d5d1e0f9b11",
            "title": "Water plants",
            "visibility": "wife",
            "deadline": "next tuesday-ish",
            "repeatRule": "fortnightly"
        }"#;

        let task: Task = serde_json::from_str(raw).expect("parse task");
        assert_eq!(task.visibility, Visibility::Personal);
        assert_eq!(task.deadline, None);
        assert_eq!(task.repeat_rule, None);
        assert_eq!(task.status, Status::Pending);
        assert_eq!(task.subtask_progress(), None);
    }

    #[test]
    fn integer_ids_from_the_old_store_map_to_stable_uuids() {
        let raw = r#"{
            "id": 42,
            "title": "Mop floors",
            "subtasks": [{"id": 7, "title": "kitchen", "isDone": false}]
        }"#;

        let task: Task = serde_json::from_str(raw).expect("parse task");
        assert_eq!(task.id, legacy_id(42));
        assert_eq!(task.subtasks[0].id, legacy_id(7));
        assert!(task.id.to_string().starts_with("0000002a-"));

        let again: Task = serde_json::from_str(raw).expect("parse task again");
        assert_eq!(again.id, task.id);

        let written = serde_json::to_string(&task).expect("serialize");
        let reread: Task = serde_json::from_str(&written).expect("reparse");
        assert_eq!(reread.id, legacy_id(42));

        assert!(serde_json::from_str::<Task>(r#"{"id": -1, "title": "x"}"#).is_err());
    }

    #[test]
    fn patch_only_touches_named_fields() {
        let mut task = Task::from_new(NewTask {
            title: "Pay rent".to_string(),
            deadline: Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).single(),
            repeat_rule: Some(RepeatRule::Monthly),
            ..NewTask::default()
        });

        TaskPatch::status(Status::Done).apply(&mut task);
        assert!(task.is_done());
        assert_eq!(task.repeat_rule, Some(RepeatRule::Monthly));

        let clear = TaskPatch {
            deadline: Some(None),
            repeat_rule: Some(None),
            ..TaskPatch::default()
        };
        clear.apply(&mut task);
        assert_eq!(task.deadline, None);
        assert_eq!(task.repeat_rule, None);
        assert_eq!(task.title, "Pay rent");
    }
}
