//! Loading task definitions from JSON files.
//!
//! A task file holds one definition or an array of them. Definitions without
//! an `id` take the file stem (suffixed with their position in arrays).

use crate::error::CliError;
use pagerun_core::{TaskDefinition, TaskId};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Load every task under `path`: a single file, or the `*.json` files of a
/// directory in name order.
pub fn load_tasks(path: &Path) -> Result<Vec<TaskDefinition>, CliError> {
    let files = if path.is_dir() {
        let files = task_files(path)?;
        if files.is_empty() {
            return Err(CliError::NoTasks(path.to_path_buf()));
        }
        files
    } else {
        vec![path.to_path_buf()]
    };

    let mut tasks = Vec::new();
    for file in files {
        let loaded = load_file(&file)?;
        debug!(path = %file.display(), count = loaded.len(), "Loaded task file");
        tasks.extend(loaded);
    }
    Ok(tasks)
}

fn task_files(dir: &Path) -> Result<Vec<PathBuf>, CliError> {
    let entries = std::fs::read_dir(dir).map_err(|e| CliError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| CliError::io(dir, e))?.path();
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Parse one task file.
pub fn load_file(path: &Path) -> Result<Vec<TaskDefinition>, CliError> {
    let raw = std::fs::read_to_string(path).map_err(|e| CliError::io(path, e))?;
    let value: Value = serde_json::from_str(&raw).map_err(|e| CliError::json(path, e))?;
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("task")
        .to_string();

    let entries = match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| (item, format!("{}-{}", stem, i + 1)))
            .collect(),
        item => vec![(item, stem)],
    };

    entries
        .into_iter()
        .map(|(item, fallback_id)| {
            let mut task: TaskDefinition =
                serde_json::from_value(item).map_err(|e| CliError::json(path, e))?;
            if task.id.as_str().trim().is_empty() {
                task.id = TaskId::new(fallback_id);
            }
            task.validate().map_err(|source| CliError::Task {
                path: path.to_path_buf(),
                source,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pagerun-loader-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    const LOGIN: &str = r#"{
        "task": "Sign in with the demo account",
        "start_url": "https://app.test/login",
        "pass": "URL contains /dashboard",
        "fail": ["\"Invalid password\" is shown"],
        "credentials": {"password": "hunter2"},
        "tags": ["smoke"],
        "timeout": 90
    }"#;

    #[test]
    fn test_single_object_takes_file_stem_as_id() {
        let dir = scratch_dir();
        let path = dir.join("login.json");
        fs::write(&path, LOGIN).unwrap();

        let tasks = load_file(&path).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id.as_str(), "login");
        assert_eq!(tasks[0].pass_criteria, vec!["URL contains /dashboard"]);
        assert!(tasks[0].has_tag("SMOKE"));
        assert_eq!(tasks[0].timeout_secs, Some(90.0));

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_array_file_and_directory_order() {
        let dir = scratch_dir();
        fs::write(dir.join("b.json"), LOGIN).unwrap();
        fs::write(
            dir.join("a.json"),
            r#"[
                {"id": "search", "objective": "Search for mugs", "pass": "\"Results\" shown", "fail": "error page"},
                {"objective": "Open cart", "pass": "URL contains /cart", "fail": "error page"}
            ]"#,
        )
        .unwrap();
        fs::write(dir.join("notes.txt"), "not a task").unwrap();

        let tasks = load_tasks(&dir).unwrap();
        let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["search", "a-2", "b"]);

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_invalid_task_names_the_file() {
        let dir = scratch_dir();
        let path = dir.join("broken.json");
        fs::write(&path, r#"{"objective": "No criteria"}"#).unwrap();

        let err = load_file(&path).unwrap_err();
        assert!(matches!(err, CliError::Task { .. }));
        assert!(err.to_string().contains("broken.json"));

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_empty_directory_is_an_error() {
        let dir = scratch_dir();
        assert!(matches!(load_tasks(&dir), Err(CliError::NoTasks(_))));
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_malformed_json() {
        let dir = scratch_dir();
        let path = dir.join("bad.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_file(&path), Err(CliError::Json { .. })));
        fs::remove_dir_all(dir).ok();
    }
}
