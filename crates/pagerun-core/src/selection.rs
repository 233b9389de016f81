//! Choosing which tasks take part in a run.

use crate::{CoreError, TaskDefinition, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Filters applied to the loaded task set before scheduling.
///
/// Skipped tasks are not filtered out here; the scheduler records them as
/// `SKIPPED` so they still show up in the summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskSelection {
    /// Only these ids, when non-empty. Unknown ids are an error.
    pub ids: Vec<TaskId>,
    /// Keep tasks carrying at least one of these tags, when non-empty.
    pub include_tags: Vec<String>,
    /// Drop tasks carrying any of these tags.
    pub exclude_tags: Vec<String>,
}

impl TaskSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<TaskId>) -> Self {
        self.ids.push(id.into());
        self
    }

    pub fn with_include_tag(mut self, tag: impl Into<String>) -> Self {
        self.include_tags.push(tag.into());
        self
    }

    pub fn with_exclude_tag(mut self, tag: impl Into<String>) -> Self {
        self.exclude_tags.push(tag.into());
        self
    }

    /// Whether a single task passes the id and tag filters.
    pub fn matches(&self, task: &TaskDefinition) -> bool {
        if !self.ids.is_empty() && !self.ids.contains(&task.id) {
            return false;
        }
        if !self.include_tags.is_empty() && !task.has_any_tag(&self.include_tags) {
            return false;
        }
        !task.has_any_tag(&self.exclude_tags)
    }

    /// Filter `tasks`, keeping definition order.
    ///
    /// Fails on duplicate ids in the input or on requested ids that no
    /// task carries.
    pub fn apply(&self, tasks: Vec<TaskDefinition>) -> Result<Vec<TaskDefinition>, CoreError> {
        let seen = unique_ids(&tasks)?;

        let missing: Vec<&str> = self
            .ids
            .iter()
            .filter(|id| !seen.contains(*id))
            .map(TaskId::as_str)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if !missing.is_empty() {
            return Err(CoreError::TasksNotFound(missing.join(", ")));
        }

        Ok(tasks.into_iter().filter(|t| self.matches(t)).collect())
    }
}

/// Ids of `tasks`; fails on the first id seen twice.
pub fn unique_ids(tasks: &[TaskDefinition]) -> Result<BTreeSet<TaskId>, CoreError> {
    let mut seen = BTreeSet::new();
    for task in tasks {
        if !seen.insert(task.id.clone()) {
            return Err(CoreError::DuplicateTaskId(task.id.to_string()));
        }
    }
    Ok(seen)
}
