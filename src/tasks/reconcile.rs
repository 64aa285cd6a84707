//! Task reconciliation: turning raw AI output into invariant-preserving
//! task graph mutations.
//!
//! Pipeline: raw text → extracted JSON → parsed tasks → schema-validated →
//! corrected → merged. Only the first four stages can fail; correction is a
//! total function that always produces a usable task, logging each fix
//! through the [`LogSink`](crate::logging::LogSink) as it goes.
//!
//! Invariants enforced here:
//! - new batches get sequential ids continuing from `max(existing) + 1`
//! - dependencies only ever point backward at tasks that exist
//! - completed tasks and subtasks are immutable under AI-driven updates
//! - subtask ids stay unique within their parent after any merge

use crate::error::{FieldIssue, Result, TaskForgeError};
use crate::logging::SharedSink;
use crate::tasks::extract::extract_json;
use crate::tasks::{Subtask, TagData, Task, TaskPriority, TaskStatus};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// How a reconciled batch lands in the target tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Concatenate the new batch after the existing tasks.
    Append,
    /// Substitute the tag's entire task list.
    Replace,
}

/// Reconciliation engine. Holds the log sink through which every
/// auto-correction is reported.
pub struct Reconciler {
    sink: SharedSink,
}

impl Reconciler {
    /// Create a reconciler reporting through the given sink.
    #[must_use]
    pub fn new(sink: SharedSink) -> Self {
        Self { sink }
    }

    // =========================================================================
    // Parse + validate
    // =========================================================================

    /// Parse a raw AI response into a batch of schema-valid tasks.
    ///
    /// Accepts either a bare JSON array or an object wrapping the array
    /// under a `"tasks"` key. Ids in the result are the AI's self-chosen
    /// local ids; call [`Reconciler::assign_ids`] before merging.
    pub fn parse_batch(&self, raw: &str) -> Result<Vec<Task>> {
        let value = extract_json(raw)?;
        let items = match &value {
            Value::Array(items) => items.clone(),
            Value::Object(map) => match map.get("tasks") {
                Some(Value::Array(items)) => items.clone(),
                _ => {
                    return Err(TaskForgeError::parse_failure(
                        "expected a JSON array of tasks or an object with a 'tasks' array",
                        raw,
                    ))
                }
            },
            _ => {
                return Err(TaskForgeError::parse_failure(
                    "expected a JSON array of tasks or an object with a 'tasks' array",
                    raw,
                ))
            }
        };

        let mut tasks = Vec::with_capacity(items.len());
        let mut issues = Vec::new();
        for (index, item) in items.iter().enumerate() {
            match validate_task(item, &format!("tasks[{index}]")) {
                Ok(task) => tasks.push(task),
                Err(mut item_issues) => issues.append(&mut item_issues),
            }
        }
        if !issues.is_empty() {
            return Err(TaskForgeError::SchemaViolation { issues });
        }
        Ok(tasks)
    }

    /// Parse a raw AI response into one schema-valid task.
    pub fn parse_single(&self, raw: &str) -> Result<Task> {
        let value = extract_json(raw)?;
        validate_task(&value, "task").map_err(|issues| TaskForgeError::SchemaViolation { issues })
    }

    // =========================================================================
    // ID assignment + dependency remap
    // =========================================================================

    /// Assign final sequential ids to a new batch and remap dependencies.
    ///
    /// New ids continue from `max(existing) + 1` in batch order. Each
    /// dependency is mapped through the local-id table (or kept as-is when
    /// it names a pre-existing task) and retained only if the mapped target
    /// is strictly less than the task's own final id. Entries that fail the
    /// check are dropped without error; the drop is visible at debug level.
    #[must_use]
    pub fn assign_ids(&self, existing: &TagData, batch: Vec<Task>) -> Vec<Task> {
        let start = existing.next_task_id();
        let local_to_final: HashMap<u32, u32> = batch
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id, start + i as u32))
            .collect();

        batch
            .into_iter()
            .enumerate()
            .map(|(i, mut task)| {
                let final_id = start + i as u32;
                task.id = final_id;
                task.dependencies = task
                    .dependencies
                    .iter()
                    .filter_map(|&dep| {
                        let mapped = local_to_final
                            .get(&dep)
                            .copied()
                            .or_else(|| existing.task(dep).map(|t| t.id));
                        match mapped {
                            Some(target) if target < final_id => Some(target),
                            _ => {
                                self.sink.debug(&format!(
                                    "dropping dependency {dep} of task {final_id}: \
                                     unresolved, forward, or self reference"
                                ));
                                None
                            }
                        }
                    })
                    .collect();
                task
            })
            .collect()
    }

    // =========================================================================
    // Merge
    // =========================================================================

    /// Merge an id-assigned batch into a tag.
    ///
    /// Replacing a tag that already has tasks requires
    /// `overwrite_confirmed`; refusing otherwise prevents silent data loss.
    /// Appending is always an explicit request and needs no confirmation.
    pub fn merge(
        &self,
        tag_name: &str,
        tag: &mut TagData,
        batch: Vec<Task>,
        mode: MergeMode,
        overwrite_confirmed: bool,
    ) -> Result<()> {
        match mode {
            MergeMode::Append => tag.tasks.extend(batch),
            MergeMode::Replace => {
                if !tag.tasks.is_empty() && !overwrite_confirmed {
                    return Err(TaskForgeError::TagNotEmpty {
                        tag: tag_name.to_string(),
                        count: tag.tasks.len(),
                    });
                }
                tag.tasks = batch;
            }
        }
        tag.metadata.touch();
        Ok(())
    }

    // =========================================================================
    // Single-task update corrections
    // =========================================================================

    /// Correct an AI-updated task against its pre-update snapshot.
    ///
    /// Total and idempotent: every deviation is fixed in place and logged
    /// as a warning, never raised as an error. Applying this to an
    /// already-correct task returns it unchanged with no warnings.
    ///
    /// `existing` is the tag the task lives in; dependency entries are
    /// pruned against it under the same backward-pointing rule as
    /// [`Reconciler::assign_ids`]. `instruction` is the natural-language
    /// prompt that produced the update; an explicit mention of "status"
    /// there permits a status change.
    #[must_use]
    pub fn correct_update(
        &self,
        existing: &TagData,
        original: &Task,
        mut updated: Task,
        instruction: &str,
    ) -> Task {
        // A completed task is immutable wholesale under AI updates.
        if original.status.is_complete() {
            if updated != *original {
                self.sink.warn(&format!(
                    "task {} is completed; discarding AI modifications",
                    original.id
                ));
                return original.clone();
            }
            return updated;
        }

        if updated.id != original.id {
            self.sink.warn(&format!(
                "AI changed task id {} to {}; restoring expected id",
                original.id, updated.id
            ));
            updated.id = original.id;
        }

        if updated.title != original.title {
            self.sink.warn(&format!(
                "AI changed the title of task {}; restoring original",
                original.id
            ));
            updated.title = original.title.clone();
        }

        // Same rule as batch remap: dependencies point backward at tasks
        // that exist. Drops are quiet, matching assign_ids.
        let own_id = updated.id;
        updated.dependencies.retain(|&dep| {
            let keep = dep < own_id && existing.task(dep).is_some();
            if !keep {
                self.sink.debug(&format!(
                    "dropping dependency {dep} of task {own_id}: \
                     unresolved, forward, or self reference"
                ));
            }
            keep
        });

        if updated.status != original.status && !mentions_status(instruction) {
            self.sink.warn(&format!(
                "AI changed status of task {} without an explicit instruction; restoring '{}'",
                original.id, original.status
            ));
            updated.status = original.status.clone();
        }

        // Completed subtasks come back verbatim, whether altered or omitted.
        for (index, original_sub) in original.subtasks.iter().enumerate() {
            if !original_sub.status.is_complete() {
                continue;
            }
            match updated.subtasks.iter().position(|s| s.id == original_sub.id) {
                Some(pos) => {
                    if updated.subtasks[pos] != *original_sub {
                        self.sink.warn(&format!(
                            "subtask {}.{} is completed; restoring original content",
                            original.id, original_sub.id
                        ));
                        updated.subtasks[pos] = original_sub.clone();
                    }
                }
                None => {
                    self.sink.warn(&format!(
                        "AI omitted completed subtask {}.{}; re-inserting it",
                        original.id, original_sub.id
                    ));
                    let pos = index.min(updated.subtasks.len());
                    updated.subtasks.insert(pos, original_sub.clone());
                }
            }
        }

        // Keep the first occurrence of each subtask id, drop later ones.
        let mut seen = HashSet::new();
        let before = updated.subtasks.len();
        updated.subtasks.retain(|s| seen.insert(s.id));
        let dropped = before - updated.subtasks.len();
        if dropped > 0 {
            self.sink.warn(&format!(
                "dropped {dropped} duplicate subtask(s) of task {}",
                original.id
            ));
        }

        updated
    }
}

fn mentions_status(instruction: &str) -> bool {
    instruction.to_lowercase().contains("status")
}

// =============================================================================
// Schema validation
// =============================================================================

/// Validate one AI-produced task value against the task schema.
///
/// Required: positive integer `id`, non-empty `title` and `description`.
/// Optional: `details`, `testStrategy`, `priority` in {high, medium, low},
/// `dependencies` of positive integers, `status`, `subtasks`. Every
/// problem is collected so the caller can surface them all at once.
fn validate_task(value: &Value, path: &str) -> std::result::Result<Task, Vec<FieldIssue>> {
    let mut issues = Vec::new();

    let Some(obj) = value.as_object() else {
        return Err(vec![FieldIssue::new(path, "must be a JSON object")]);
    };

    let id = match obj.get("id").and_then(Value::as_u64) {
        Some(id) if id > 0 && id <= u64::from(u32::MAX) => id as u32,
        _ => {
            issues.push(FieldIssue::new(
                format!("{path}.id"),
                "must be a positive integer",
            ));
            0
        }
    };

    let title = required_string(obj, "title", path, &mut issues);
    let description = required_string(obj, "description", path, &mut issues);

    let details = optional_string(obj, "details", path, &mut issues);
    let test_strategy = optional_string(obj, "testStrategy", path, &mut issues);

    let priority = match obj.get("priority") {
        None | Some(Value::Null) => TaskPriority::default(),
        Some(Value::String(s)) => match s.as_str() {
            "high" => TaskPriority::High,
            "medium" => TaskPriority::Medium,
            "low" => TaskPriority::Low,
            other => {
                issues.push(FieldIssue::new(
                    format!("{path}.priority"),
                    format!("'{other}' is not one of high, medium, low"),
                ));
                TaskPriority::default()
            }
        },
        Some(_) => {
            issues.push(FieldIssue::new(format!("{path}.priority"), "must be a string"));
            TaskPriority::default()
        }
    };

    let status = match obj.get("status") {
        None | Some(Value::Null) => TaskStatus::default(),
        Some(Value::String(s)) => TaskStatus::from(s.clone()),
        Some(_) => {
            issues.push(FieldIssue::new(format!("{path}.status"), "must be a string"));
            TaskStatus::default()
        }
    };

    let dependencies = match obj.get("dependencies") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| match item.as_u64() {
                Some(dep) if dep > 0 && dep <= u64::from(u32::MAX) => Some(dep as u32),
                _ => {
                    issues.push(FieldIssue::new(
                        format!("{path}.dependencies[{i}]"),
                        "must be a positive integer",
                    ));
                    None
                }
            })
            .collect(),
        Some(_) => {
            issues.push(FieldIssue::new(
                format!("{path}.dependencies"),
                "must be an array of positive integers",
            ));
            Vec::new()
        }
    };

    let subtasks = match obj.get("subtasks") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| {
                validate_subtask(item, &format!("{path}.subtasks[{i}]"), &mut issues)
            })
            .collect(),
        Some(_) => {
            issues.push(FieldIssue::new(
                format!("{path}.subtasks"),
                "must be an array",
            ));
            Vec::new()
        }
    };

    if !issues.is_empty() {
        return Err(issues);
    }

    Ok(Task {
        id,
        title,
        description,
        details,
        test_strategy,
        priority,
        status,
        dependencies,
        subtasks,
    })
}

fn validate_subtask(value: &Value, path: &str, issues: &mut Vec<FieldIssue>) -> Option<Subtask> {
    let Some(obj) = value.as_object() else {
        issues.push(FieldIssue::new(path, "must be a JSON object"));
        return None;
    };

    let id = match obj.get("id").and_then(Value::as_u64) {
        Some(id) if id > 0 && id <= u64::from(u32::MAX) => id as u32,
        _ => {
            issues.push(FieldIssue::new(
                format!("{path}.id"),
                "must be a positive integer",
            ));
            return None;
        }
    };
    let title = match obj.get("title").and_then(Value::as_str) {
        Some(title) if !title.trim().is_empty() => title.to_string(),
        _ => {
            issues.push(FieldIssue::new(format!("{path}.title"), "is required"));
            return None;
        }
    };

    Some(Subtask {
        id,
        title,
        description: obj
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        details: obj
            .get("details")
            .and_then(Value::as_str)
            .map(str::to_string),
        status: obj
            .get("status")
            .and_then(Value::as_str)
            .map(|s| TaskStatus::from(s.to_string()))
            .unwrap_or_default(),
        dependencies: obj
            .get("dependencies")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_u64)
                    .filter(|&d| d > 0 && d <= u64::from(u32::MAX))
                    .map(|d| d as u32)
                    .collect()
            })
            .unwrap_or_default(),
    })
}

fn required_string(
    obj: &serde_json::Map<String, Value>,
    field: &str,
    path: &str,
    issues: &mut Vec<FieldIssue>,
) -> String {
    match obj.get(field).and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => s.to_string(),
        _ => {
            issues.push(FieldIssue::new(format!("{path}.{field}"), "is required"));
            String::new()
        }
    }
}

fn optional_string(
    obj: &serde_json::Map<String, Value>,
    field: &str,
    path: &str,
    issues: &mut Vec<FieldIssue>,
) -> Option<String> {
    match obj.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            issues.push(FieldIssue::new(format!("{path}.{field}"), "must be a string"));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{BufferSink, LogLevel};
    use std::sync::Arc;

    fn reconciler() -> (Reconciler, Arc<BufferSink>) {
        let sink = BufferSink::shared();
        (Reconciler::new(sink.clone()), sink)
    }

    fn task(id: u32, title: &str) -> Task {
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

    /// A tag containing just the task under correction.
    fn tag_of(task: &Task) -> TagData {
        let mut tag = TagData::empty(None);
        tag.tasks.push(task.clone());
        tag
    }

    fn subtask(id: u32, title: &str, status: TaskStatus) -> Subtask {
        Subtask {
            id,
            title: title.to_string(),
            description: format!("{title} description"),
            details: None,
            status,
            dependencies: Vec::new(),
        }
    }

    // =========================================================================
    // Parse + validate
    // =========================================================================

    #[test]
    fn test_parse_batch_accepts_wrapped_and_bare_arrays() {
        let (r, _) = reconciler();

        let wrapped = r#"{"tasks": [{"id": 1, "title": "A", "description": "d"}]}"#;
        assert_eq!(r.parse_batch(wrapped).unwrap().len(), 1);

        let bare = r#"[{"id": 1, "title": "A", "description": "d"}]"#;
        assert_eq!(r.parse_batch(bare).unwrap().len(), 1);
    }

    #[test]
    fn test_parse_batch_collects_all_field_issues() {
        let (r, _) = reconciler();
        let raw = r#"[
            {"id": 0, "title": "A", "description": "d"},
            {"id": 2, "description": "d", "priority": "urgent"}
        ]"#;

        let err = r.parse_batch(raw).unwrap_err();
        match err {
            TaskForgeError::SchemaViolation { issues } => {
                let fields: Vec<&str> = issues.iter().map(|i| i.field.as_str()).collect();
                assert!(fields.contains(&"tasks[0].id"));
                assert!(fields.contains(&"tasks[1].title"));
                assert!(fields.contains(&"tasks[1].priority"));
            }
            other => panic!("expected SchemaViolation, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_batch_non_array_payload_is_parse_failure() {
        let (r, _) = reconciler();
        let err = r.parse_batch(r#"{"message": "no tasks here"}"#).unwrap_err();
        assert!(matches!(err, TaskForgeError::ParseFailure { .. }));
    }

    #[test]
    fn test_parse_single_from_prose_wrapped_response() {
        let (r, _) = reconciler();
        let raw = r#"Here is the updated task:
            {"id": 4, "title": "T", "description": "d", "status": "in-progress"}"#;
        let task = r.parse_single(raw).unwrap();
        assert_eq!(task.id, 4);
        assert_eq!(task.status, TaskStatus::InProgress);
    }

    #[test]
    fn test_parse_single_missing_description_aborts() {
        let (r, _) = reconciler();
        let err = r.parse_single(r#"{"id": 4, "title": "T"}"#).unwrap_err();
        assert!(matches!(err, TaskForgeError::SchemaViolation { .. }));
    }

    #[test]
    fn test_validate_keeps_unknown_status_open() {
        let (r, _) = reconciler();
        let task = r
            .parse_single(r#"{"id": 1, "title": "T", "description": "d", "status": "blocked"}"#)
            .unwrap();
        assert_eq!(task.status, TaskStatus::Other("blocked".to_string()));
    }

    // =========================================================================
    // ID assignment + dependency remap
    // =========================================================================

    #[test]
    fn test_remap_round_trip_against_existing_tag() {
        let (r, _) = reconciler();
        let mut existing = TagData::empty(None);
        let mut done = task(1, "Done task");
        done.status = TaskStatus::Done;
        existing.tasks.push(done);

        let mut t2 = task(1, "T2");
        t2.dependencies = vec![];
        let mut t3 = task(2, "T3");
        t3.dependencies = vec![1];

        let batch = r.assign_ids(&existing, vec![t2, t3]);

        assert_eq!(batch[0].id, 2);
        assert_eq!(batch[1].id, 3);
        // Local id 1 maps to final id 2, not pre-existing task 1.
        assert_eq!(batch[1].dependencies, vec![2]);
    }

    #[test]
    fn test_remap_keeps_references_to_preexisting_tasks() {
        let (r, _) = reconciler();
        let mut existing = TagData::empty(None);
        existing.tasks.push(task(3, "existing"));

        let mut new_task = task(1, "new");
        new_task.dependencies = vec![3];
        let batch = r.assign_ids(&existing, vec![new_task]);

        assert_eq!(batch[0].id, 4);
        assert_eq!(batch[0].dependencies, vec![3]);
    }

    #[test]
    fn test_remap_drops_forward_and_unknown_references_silently() {
        let (r, sink) = reconciler();
        let existing = TagData::empty(None);

        let mut t1 = task(1, "first");
        t1.dependencies = vec![2, 99]; // forward ref and unknown ref
        let mut t2 = task(2, "second");
        t2.dependencies = vec![2]; // self ref

        let batch = r.assign_ids(&existing, vec![t1, t2]);

        assert!(batch[0].dependencies.is_empty());
        assert!(batch[1].dependencies.is_empty());
        // Dropped quietly: debug trail only, no warnings raised.
        assert_eq!(sink.warning_count(), 0);
        assert!(sink.contains(LogLevel::Debug, "dropping dependency"));
    }

    // =========================================================================
    // Merge
    // =========================================================================

    #[test]
    fn test_merge_append_concatenates() {
        let (r, _) = reconciler();
        let mut tag = TagData::empty(None);
        tag.tasks.push(task(1, "existing"));

        r.merge(
            "master",
            &mut tag,
            vec![task(2, "new")],
            MergeMode::Append,
            false,
        )
        .unwrap();
        assert_eq!(tag.tasks.len(), 2);
    }

    #[test]
    fn test_merge_replace_refuses_nonempty_tag_without_confirmation() {
        let (r, _) = reconciler();
        let mut tag = TagData::empty(None);
        tag.tasks.push(task(1, "existing"));

        let err = r
            .merge(
                "master",
                &mut tag,
                vec![task(1, "new")],
                MergeMode::Replace,
                false,
            )
            .unwrap_err();
        assert!(matches!(err, TaskForgeError::TagNotEmpty { count: 1, .. }));
        // Nothing was lost.
        assert_eq!(tag.tasks[0].title, "existing");
    }

    #[test]
    fn test_merge_replace_with_confirmation_substitutes() {
        let (r, _) = reconciler();
        let mut tag = TagData::empty(None);
        tag.tasks.push(task(1, "existing"));

        r.merge(
            "master",
            &mut tag,
            vec![task(1, "new")],
            MergeMode::Replace,
            true,
        )
        .unwrap();
        assert_eq!(tag.tasks.len(), 1);
        assert_eq!(tag.tasks[0].title, "new");
    }

    // =========================================================================
    // Single-task update corrections
    // =========================================================================

    #[test]
    fn test_completed_subtask_restored_verbatim_when_altered() {
        let (r, sink) = reconciler();
        let mut original = task(5, "Parent");
        original
            .subtasks
            .push(subtask(1, "done sub", TaskStatus::Done));

        let mut updated = original.clone();
        updated.subtasks[0].description = "rewritten by AI".to_string();

        let corrected = r.correct_update(&tag_of(&original), &original, updated, "expand the task");
        assert_eq!(corrected.subtasks[0], original.subtasks[0]);
        assert!(sink.contains(LogLevel::Warn, "restoring original content"));
    }

    #[test]
    fn test_completed_subtask_reinserted_when_omitted() {
        let (r, sink) = reconciler();
        let mut original = task(5, "Parent");
        original
            .subtasks
            .push(subtask(1, "done sub", TaskStatus::Done));
        original
            .subtasks
            .push(subtask(2, "open sub", TaskStatus::Pending));

        let mut updated = original.clone();
        updated.subtasks.remove(0); // AI dropped the completed subtask

        let corrected = r.correct_update(&tag_of(&original), &original, updated, "expand the task");
        assert_eq!(corrected.subtasks.len(), 2);
        assert_eq!(corrected.subtasks[0], original.subtasks[0]);
        assert!(sink.contains(LogLevel::Warn, "re-inserting"));
    }

    #[test]
    fn test_duplicate_subtasks_keep_first_occurrence() {
        let (r, sink) = reconciler();
        let original = task(5, "Parent");

        let mut updated = original.clone();
        updated.subtasks.push(subtask(7, "first", TaskStatus::Pending));
        updated
            .subtasks
            .push(subtask(7, "second duplicate", TaskStatus::Pending));

        let corrected = r.correct_update(&tag_of(&original), &original, updated, "add subtasks");
        assert_eq!(corrected.subtasks.len(), 1);
        assert_eq!(corrected.subtasks[0].title, "first");
        assert!(sink.contains(LogLevel::Warn, "duplicate subtask"));
    }

    #[test]
    fn test_title_and_id_restored() {
        let (r, sink) = reconciler();
        let original = task(5, "Original title");

        let mut updated = original.clone();
        updated.id = 9;
        updated.title = "Renamed by AI".to_string();

        let corrected = r.correct_update(&tag_of(&original), &original, updated, "refine details");
        assert_eq!(corrected.id, 5);
        assert_eq!(corrected.title, "Original title");
        assert_eq!(sink.warning_count(), 2);
    }

    #[test]
    fn test_update_prunes_invalid_dependencies_quietly() {
        let (r, sink) = reconciler();
        let mut existing = TagData::empty(None);
        existing.tasks.push(task(1, "earlier"));
        existing.tasks.push(task(5, "subject"));
        existing.tasks.push(task(7, "later"));
        let original = existing.task(5).unwrap().clone();

        let mut updated = original.clone();
        // One valid backward reference plus a self, forward, and unknown one.
        updated.dependencies = vec![1, 5, 7, 99];

        let corrected = r.correct_update(&existing, &original, updated, "link related work");
        assert_eq!(corrected.dependencies, vec![1]);
        // Pruned quietly, like the batch remap: debug trail, no warnings.
        assert_eq!(sink.warning_count(), 0);
        assert!(sink.contains(LogLevel::Debug, "dropping dependency"));
    }

    #[test]
    fn test_status_restored_unless_instruction_mentions_status() {
        let (r, _) = reconciler();
        let original = task(5, "T");

        let mut updated = original.clone();
        updated.status = TaskStatus::InProgress;
        let corrected =
            r.correct_update(&tag_of(&original), &original, updated, "flesh out the details");
        assert_eq!(corrected.status, TaskStatus::Pending);

        let mut updated = original.clone();
        updated.status = TaskStatus::InProgress;
        let corrected = r.correct_update(
            &tag_of(&original),
            &original,
            updated,
            "set the status to in-progress",
        );
        assert_eq!(corrected.status, TaskStatus::InProgress);
    }

    #[test]
    fn test_completed_task_is_immutable_wholesale() {
        let (r, sink) = reconciler();
        let mut original = task(5, "T");
        original.status = TaskStatus::Completed;

        let mut updated = original.clone();
        updated.description = "rewritten".to_string();

        let corrected = r.correct_update(&tag_of(&original), &original, updated, "update the task");
        assert_eq!(corrected, original);
        assert!(sink.contains(LogLevel::Warn, "completed"));
    }

    #[test]
    fn test_correction_is_idempotent() {
        let (r, _) = reconciler();
        let mut original = task(5, "Parent");
        original
            .subtasks
            .push(subtask(1, "done sub", TaskStatus::Done));

        let mut updated = original.clone();
        updated.id = 9;
        updated.title = "Renamed".to_string();
        updated.subtasks[0].description = "altered".to_string();

        let first = r.correct_update(&tag_of(&original), &original, updated, "refine details");

        // Second pass over already-corrected input: identical output, no
        // new warnings.
        let (r2, sink2) = reconciler();
        let second =
            r2.correct_update(&tag_of(&original), &original, first.clone(), "refine details");
        assert_eq!(second, first);
        assert_eq!(sink2.warning_count(), 0);
    }
}
