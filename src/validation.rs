use crate::error::AppError;

pub fn require_non_empty(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Minimal shape check for a generated workflow file.
///
/// A valid workflow has a `name`, a `nodes` array, and a `connections` field.
/// The failure message names the first offending field so the retry prompt
/// can point the model at it.
pub fn validate_workflow_shape(value: &serde_json::Value) -> Result<(), AppError> {
    let obj = value
        .as_object()
        .ok_or_else(|| AppError::Validation("workflow must be a JSON object".into()))?;

    let mut missing = Vec::new();
    for field in ["name", "nodes", "connections"] {
        if !obj.contains_key(field) {
            missing.push(field);
        }
    }
    if !missing.is_empty() {
        return Err(AppError::Validation(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    }

    if !obj["nodes"].is_array() {
        return Err(AppError::Validation("nodes must be an array".into()));
    }

    Ok(())
}
