//! Task listing and execution against records.

use serde_json::{json, Value};
use swimlane_client::Session;

use crate::error::{Error, ErrorKind, Result};

/// A server-side task (integration action) that can run against a record.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    pub name: String,
    raw: Value,
}

impl Task {
    pub(crate) fn from_raw(raw: Value) -> Self {
        let attr = |key: &str| {
            raw.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Self {
            id: attr("id"),
            name: attr("name"),
            raw,
        }
    }

    /// The raw server document.
    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Task: {}>", self.name)
    }
}

/// List the lightweight task index.
pub(crate) async fn list(session: &Session) -> Result<Vec<Task>> {
    let raw: Vec<Value> = session.get_json("task/light").await?;
    Ok(raw.into_iter().map(Task::from_raw).collect())
}

/// Fetch one task's full document.
pub(crate) async fn get_by_id(session: &Session, id: &str) -> Result<Task> {
    let raw: Value = session.get_json(&format!("task/{}", id)).await?;
    Ok(Task::from_raw(raw))
}

/// Execute a task by name against a record envelope. Task failures reported
/// in the response body surface as errors.
pub(crate) async fn execute_for_record(
    session: &Session,
    task_name: &str,
    record_raw: &Value,
) -> Result<Value> {
    let task = list(session)
        .await?
        .into_iter()
        .find(|t| t.name == task_name)
        .ok_or_else(|| {
            Error::new(ErrorKind::NotFound(format!(
                "No task with name \"{}\"",
                task_name
            )))
        })?;

    let body = json!({
        "taskId": task.id,
        "record": record_raw,
    });
    let response: Value = session.post_json("task/execute/record", &body).await?;

    if let Some(message) = response.get("errorMessage").and_then(Value::as_str) {
        return Err(Error::new(ErrorKind::InvalidOperation(format!(
            "Task \"{}\" failed: {}",
            task_name, message
        ))));
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_from_raw() {
        let task = Task::from_raw(json!({"id": "t1", "name": "Enrich IP"}));
        assert_eq!(task.id, "t1");
        assert_eq!(format!("{}", task), "<Task: Enrich IP>");
    }
}
