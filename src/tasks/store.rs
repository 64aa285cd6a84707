//! Tag-scoped task document persistence.
//!
//! The store owns one JSON file (`.taskforge/tasks.json`) holding the whole
//! tagged task graph. Writes go through an exclusive advisory file lock and
//! a write-temp-then-rename cycle, so concurrent invocations cannot
//! interleave a read-modify-write and partially written documents are never
//! observed. [`TaskStore::mutate`] holds the lock across the whole
//! read-modify-write so two processes cannot silently overwrite each
//! other's changes.
//!
//! A corrupted document is an error, never silently discarded: task data is
//! the user's work product.

use crate::error::{Result, TaskForgeError};
use crate::tasks::{TagData, Task, TaskDocument, TaskSelector, TaskStatus};
use fs2::FileExt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Task document file name.
const TASKS_FILE: &str = "tasks.json";

/// Temporary file suffix for atomic writes.
const TMP_SUFFIX: &str = ".tmp";

/// Lock file suffix for cross-process exclusion.
const LOCK_SUFFIX: &str = ".lock";

/// File-backed task document store.
#[derive(Debug, Clone)]
pub struct TaskStore {
    /// Directory holding the document (usually `<project>/.taskforge`).
    dir: PathBuf,
}

impl TaskStore {
    /// Create a store rooted at a state directory.
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// The store for a project directory.
    #[must_use]
    pub fn for_project(project_dir: impl AsRef<Path>) -> Self {
        Self::new(project_dir.as_ref().join(crate::config::CONFIG_DIR))
    }

    /// Path to the task document.
    #[must_use]
    pub fn document_path(&self) -> PathBuf {
        self.dir.join(TASKS_FILE)
    }

    fn tmp_path(&self) -> PathBuf {
        self.dir.join(format!("{TASKS_FILE}{TMP_SUFFIX}"))
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(format!("{TASKS_FILE}{LOCK_SUFFIX}"))
    }

    fn open_lock_file(&self) -> Result<File> {
        fs::create_dir_all(&self.dir)?;
        Ok(File::create(self.lock_path())?)
    }

    fn acquire_lock(&self) -> Result<File> {
        let lock_file = self.open_lock_file()?;
        FileExt::lock_exclusive(&lock_file)
            .map_err(|e| TaskForgeError::store(format!("failed to acquire task lock: {e}")))?;
        Ok(lock_file)
    }

    fn read_document(&self) -> Result<TaskDocument> {
        let path = self.document_path();
        if !path.exists() {
            return Ok(TaskDocument::new());
        }
        let contents = fs::read_to_string(&path)?;
        serde_json::from_str(&contents).map_err(|e| {
            TaskForgeError::store(format!(
                "task document at {} is not valid JSON: {e}",
                path.display()
            ))
        })
    }

    fn write_document(&self, doc: &TaskDocument) -> Result<()> {
        let tmp_path = self.tmp_path();
        let json = serde_json::to_string_pretty(doc)?;

        let mut tmp_file = File::create(&tmp_path)?;
        tmp_file.write_all(json.as_bytes())?;
        tmp_file.sync_all()?;

        fs::rename(&tmp_path, self.document_path())?;
        Ok(())
    }

    /// Load the document (shared read; an empty document if the file does
    /// not exist yet).
    ///
    /// The lock file is created before the shared lock is taken, so even
    /// the first-ever reader excludes a concurrent writer mid-cycle.
    pub fn load(&self) -> Result<TaskDocument> {
        let lock_file = self.open_lock_file()?;
        FileExt::lock_shared(&lock_file)
            .map_err(|e| TaskForgeError::store(format!("failed to acquire task lock: {e}")))?;
        self.read_document()
    }

    /// Save the document atomically under the exclusive lock.
    pub fn save(&self, doc: &TaskDocument) -> Result<()> {
        let _lock = self.acquire_lock()?;
        self.write_document(doc)
    }

    /// Run a read-modify-write cycle under one exclusive lock.
    ///
    /// The mutation sees the freshest on-disk state and its result is
    /// written back before the lock is released. If the mutation fails,
    /// nothing is written.
    pub fn mutate<T>(&self, f: impl FnOnce(&mut TaskDocument) -> Result<T>) -> Result<T> {
        let _lock = self.acquire_lock()?;
        let mut doc = self.read_document()?;
        let result = f(&mut doc)?;
        self.write_document(&doc)?;
        Ok(result)
    }

    // =========================================================================
    // Task operations
    // =========================================================================

    /// Set the status of a task or subtask.
    ///
    /// This is a direct edit, exempt from the completed-item immutability
    /// that AI-driven updates observe.
    pub fn set_status(&self, tag: &str, selector: TaskSelector, status: TaskStatus) -> Result<()> {
        self.mutate(|doc| {
            let tag_data = tag_mut(doc, tag, selector)?;
            match selector {
                TaskSelector::Task(id) => {
                    let task = tag_data
                        .task_mut(id)
                        .ok_or_else(|| not_found(selector, tag))?;
                    task.status = status;
                }
                TaskSelector::Subtask { parent, subtask } => {
                    let task = tag_data
                        .task_mut(parent)
                        .ok_or_else(|| not_found(selector, tag))?;
                    let sub = task
                        .subtasks
                        .iter_mut()
                        .find(|s| s.id == subtask)
                        .ok_or_else(|| not_found(selector, tag))?;
                    sub.status = status;
                }
            }
            tag_data.metadata.touch();
            Ok(())
        })
    }

    /// Remove a task or subtask.
    ///
    /// Removing a task also strips its id from every other task's
    /// dependency list so no dangling reference survives.
    pub fn remove_task(&self, tag: &str, selector: TaskSelector) -> Result<()> {
        self.mutate(|doc| {
            let tag_data = tag_mut(doc, tag, selector)?;
            match selector {
                TaskSelector::Task(id) => {
                    let before = tag_data.tasks.len();
                    tag_data.tasks.retain(|t| t.id != id);
                    if tag_data.tasks.len() == before {
                        return Err(not_found(selector, tag));
                    }
                    tag_data.strip_dependency(id);
                }
                TaskSelector::Subtask { parent, subtask } => {
                    let task = tag_data
                        .task_mut(parent)
                        .ok_or_else(|| not_found(selector, tag))?;
                    let before = task.subtasks.len();
                    task.subtasks.retain(|s| s.id != subtask);
                    if task.subtasks.len() == before {
                        return Err(not_found(selector, tag));
                    }
                }
            }
            tag_data.metadata.touch();
            Ok(())
        })
    }

    /// Replace one task in place (used after a reconciled single-task
    /// update).
    pub fn replace_task(&self, tag: &str, task: Task) -> Result<()> {
        self.mutate(|doc| {
            let selector = TaskSelector::Task(task.id);
            let tag_data = tag_mut(doc, tag, selector)?;
            let slot = tag_data
                .task_mut(task.id)
                .ok_or_else(|| not_found(selector, tag))?;
            *slot = task;
            tag_data.metadata.touch();
            Ok(())
        })
    }
}

fn tag_mut<'a>(
    doc: &'a mut TaskDocument,
    tag: &str,
    selector: TaskSelector,
) -> Result<&'a mut TagData> {
    doc.get_mut(tag).ok_or_else(|| not_found(selector, tag))
}

fn not_found(selector: TaskSelector, tag: &str) -> TaskForgeError {
    TaskForgeError::TaskNotFound {
        id: selector.to_string(),
        tag: tag.to_string(),
    }
}
