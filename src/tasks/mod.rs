//! Task graph data model.
//!
//! The persisted document is a map of tag name to [`TagData`]; tags
//! partition the task graph like independent branches. Task IDs are
//! positive integers unique within their tag, and subtask IDs are scoped to
//! their parent (`"3.2"` is subtask 2 of task 3).
//!
//! Serialization uses camelCase field names to match the on-disk document
//! format.

pub mod extract;
pub mod reconcile;
pub mod store;

pub use reconcile::{MergeMode, Reconciler};
pub use store::TaskStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// The whole persisted document: tag name to tag contents.
///
/// `BTreeMap` keeps tag order stable across save/load cycles.
pub type TaskDocument = BTreeMap<String, TagData>;

/// Default tag name used when the caller does not specify one.
pub const DEFAULT_TAG: &str = "master";

// =============================================================================
// Status / Priority
// =============================================================================

/// Task lifecycle status.
///
/// This is an open string enum: unknown statuses from older documents or
/// AI output are preserved verbatim rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Done,
    Completed,
    Deferred,
    Cancelled,
    Other(String),
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    /// Canonical string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Done => "done",
            Self::Completed => "completed",
            Self::Deferred => "deferred",
            Self::Cancelled => "cancelled",
            Self::Other(s) => s,
        }
    }

    /// Whether this status marks the item complete and therefore immutable
    /// under AI-driven updates.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Done | Self::Completed)
    }
}

impl From<String> for TaskStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" => Self::Pending,
            "in-progress" => Self::InProgress,
            "done" => Self::Done,
            "completed" => Self::Completed,
            "deferred" => Self::Deferred,
            "cancelled" => Self::Cancelled,
            _ => Self::Other(s),
        }
    }
}

impl From<TaskStatus> for String {
    fn from(status: TaskStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    High,
    #[default]
    Medium,
    Low,
}

impl TaskPriority {
    /// Canonical string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Task / Subtask
// =============================================================================

/// A subtask, scoped to its parent task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    pub id: u32,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<u32>,
}

/// A task within a tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: u32,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_strategy: Option<String>,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub dependencies: Vec<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtasks: Vec<Subtask>,
}

impl Task {
    /// Find a subtask by its parent-scoped id.
    #[must_use]
    pub fn subtask(&self, id: u32) -> Option<&Subtask> {
        self.subtasks.iter().find(|s| s.id == id)
    }
}

// =============================================================================
// Tags
// =============================================================================

/// Bookkeeping attached to a tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagMetadata {
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TagMetadata {
    /// Metadata for a freshly created tag.
    #[must_use]
    pub fn now(description: Option<String>) -> Self {
        let ts = Utc::now();
        Self {
            created: ts,
            updated: ts,
            description,
        }
    }

    /// Mark the tag as modified.
    pub fn touch(&mut self) {
        self.updated = Utc::now();
    }
}

/// One tag's tasks plus metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagData {
    pub tasks: Vec<Task>,
    pub metadata: TagMetadata,
}

impl TagData {
    /// An empty tag created now.
    #[must_use]
    pub fn empty(description: Option<String>) -> Self {
        Self {
            tasks: Vec::new(),
            metadata: TagMetadata::now(description),
        }
    }

    /// Find a task by id.
    #[must_use]
    pub fn task(&self, id: u32) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Find a task by id, mutably.
    pub fn task_mut(&mut self, id: u32) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// The next sequential task id: `max(existing) + 1`, or 1 for an empty
    /// tag.
    #[must_use]
    pub fn next_task_id(&self) -> u32 {
        self.tasks.iter().map(|t| t.id).max().unwrap_or(0) + 1
    }

    /// Remove `removed_id` from every task's dependency list.
    ///
    /// Called after task removal so no task keeps a dangling reference.
    pub fn strip_dependency(&mut self, removed_id: u32) {
        for task in &mut self.tasks {
            task.dependencies.retain(|&d| d != removed_id);
        }
    }
}

// =============================================================================
// Task Selectors
// =============================================================================

/// A task or subtask reference as typed on the command line: `"5"` or
/// `"5.2"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSelector {
    Task(u32),
    Subtask { parent: u32, subtask: u32 },
}

/// Error for parsing [`TaskSelector`] from a string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid task id '{0}'. Expected a positive integer like '5' or a subtask id like '5.2'")]
pub struct ParseTaskSelectorError(pub String);

impl FromStr for TaskSelector {
    type Err = ParseTaskSelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_id = |part: &str| {
            part.parse::<u32>()
                .ok()
                .filter(|&n| n > 0)
                .ok_or_else(|| ParseTaskSelectorError(s.to_string()))
        };

        match s.split_once('.') {
            None => Ok(Self::Task(parse_id(s)?)),
            Some((parent, subtask)) => Ok(Self::Subtask {
                parent: parse_id(parent)?,
                subtask: parse_id(subtask)?,
            }),
        }
    }
}

impl std::fmt::Display for TaskSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Task(id) => write!(f, "{id}"),
            Self::Subtask { parent, subtask } => write!(f, "{parent}.{subtask}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn task(id: u32, title: &str) -> Task {
        Task {
            id,
            title: title.to_string(),
            description: format!("{title} description"),
            details: None,
            test_strategy: None,
            priority: TaskPriority::Medium,
            status: TaskStatus::Pending,
            dependencies: Vec::new(),
            subtasks: Vec::new(),
        }
    }

    #[test]
    fn test_status_open_enum_roundtrip() {
        let known: TaskStatus = serde_json::from_str("\"in-progress\"").unwrap();
        assert_eq!(known, TaskStatus::InProgress);

        let unknown: TaskStatus = serde_json::from_str("\"blocked\"").unwrap();
        assert_eq!(unknown, TaskStatus::Other("blocked".to_string()));
        assert_eq!(serde_json::to_string(&unknown).unwrap(), "\"blocked\"");
    }

    #[test]
    fn test_status_completion_predicate() {
        assert!(TaskStatus::Done.is_complete());
        assert!(TaskStatus::Completed.is_complete());
        assert!(!TaskStatus::Pending.is_complete());
        assert!(!TaskStatus::Other("blocked".into()).is_complete());
    }

    #[test]
    fn test_task_serializes_camel_case() {
        let mut t = task(1, "Build API");
        t.test_strategy = Some("integration tests".to_string());
        let json = serde_json::to_string(&t).unwrap();
        assert!(json.contains("\"testStrategy\""));
        assert!(json.contains("\"status\":\"pending\""));
        assert!(!json.contains("\"subtasks\""));
    }

    #[test]
    fn test_task_deserializes_with_missing_optionals() {
        let t: Task =
            serde_json::from_str(r#"{"id": 3, "title": "T", "description": "D"}"#).unwrap();
        assert_eq!(t.id, 3);
        assert_eq!(t.priority, TaskPriority::Medium);
        assert_eq!(t.status, TaskStatus::Pending);
        assert!(t.dependencies.is_empty());
        assert!(t.subtasks.is_empty());
    }

    #[test]
    fn test_next_task_id_continues_from_max() {
        let mut tag = TagData::empty(None);
        assert_eq!(tag.next_task_id(), 1);

        tag.tasks.push(task(1, "a"));
        tag.tasks.push(task(7, "b"));
        assert_eq!(tag.next_task_id(), 8);
    }

    #[test]
    fn test_strip_dependency_removes_dangling_references() {
        let mut tag = TagData::empty(None);
        let mut a = task(1, "a");
        let mut b = task(2, "b");
        a.dependencies = vec![2, 3];
        b.dependencies = vec![3];
        tag.tasks.push(a);
        tag.tasks.push(b);

        tag.strip_dependency(3);
        assert_eq!(tag.task(1).unwrap().dependencies, vec![2]);
        assert!(tag.task(2).unwrap().dependencies.is_empty());
    }

    #[test]
    fn test_selector_parses_task_and_subtask_forms() {
        assert_eq!("5".parse::<TaskSelector>().unwrap(), TaskSelector::Task(5));
        assert_eq!(
            "5.2".parse::<TaskSelector>().unwrap(),
            TaskSelector::Subtask {
                parent: 5,
                subtask: 2
            }
        );
        assert_eq!("5.2".parse::<TaskSelector>().unwrap().to_string(), "5.2");
    }

    #[test]
    fn test_selector_rejects_garbage() {
        assert!("".parse::<TaskSelector>().is_err());
        assert!("0".parse::<TaskSelector>().is_err());
        assert!("five".parse::<TaskSelector>().is_err());
        assert!("5.".parse::<TaskSelector>().is_err());
        assert!("5.2.1".parse::<TaskSelector>().is_err());
    }
}
