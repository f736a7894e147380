//! Argument extraction helpers. Malformed arguments become
//! `ToolError::InvalidArguments`, never a panic.

use ferrocode_core::error::ToolError;
use serde_json::Value;

pub fn required_str<'a>(arguments: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    match arguments.get(key) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(ToolError::InvalidArguments(format!(
            "'{key}' must be a string, got {other}"
        ))),
        None => Err(ToolError::InvalidArguments(format!("Missing '{key}' argument"))),
    }
}

pub fn optional_str<'a>(arguments: &'a Value, key: &str) -> Result<Option<&'a str>, ToolError> {
    match arguments.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(ToolError::InvalidArguments(format!(
            "'{key}' must be a string, got {other}"
        ))),
    }
}

pub fn optional_bool(arguments: &Value, key: &str) -> Result<Option<bool>, ToolError> {
    match arguments.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(other) => Err(ToolError::InvalidArguments(format!(
            "'{key}' must be a boolean, got {other}"
        ))),
    }
}

pub fn optional_usize(arguments: &Value, key: &str) -> Result<Option<usize>, ToolError> {
    match arguments.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| {
                ToolError::InvalidArguments(format!("'{key}' must be a non-negative integer, got {v}"))
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wrong_types_are_rejected() {
        let args = json!({"path": 3, "limit": -1, "recursive": "yes"});
        assert!(required_str(&args, "path").is_err());
        assert!(optional_usize(&args, "limit").is_err());
        assert!(optional_bool(&args, "recursive").is_err());
        assert!(required_str(&args, "missing").is_err());
    }

    #[test]
    fn absent_optionals_are_none() {
        let args = json!({"path": "src", "offset": null});
        assert_eq!(required_str(&args, "path").unwrap(), "src");
        assert_eq!(optional_usize(&args, "offset").unwrap(), None);
        assert_eq!(optional_str(&args, "glob").unwrap(), None);
    }
}
