// Core types for the tool dispatch system
//
// Tool definitions follow the JSON-schema function-calling format that
// OpenAI-compatible providers expect.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool definition exposed to the LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: ToolInputSchema,
}

/// JSON Schema for tool input parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInputSchema {
    #[serde(rename = "type")]
    pub schema_type: String, // Usually "object"
    pub properties: Value,
    pub required: Vec<String>,
}

impl ToolInputSchema {
    /// Build a schema from a `properties` object and required key names.
    pub fn new(properties: Value, required: &[&str]) -> Self {
        Self {
            schema_type: "object".to_string(),
            properties,
            required: required.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Outcome of one dispatched tool call.
///
/// Exactly one of `display_text` (success) or `error` (failure) carries
/// the payload; `raw_value` is advisory and callers never depend on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub tool_name: String,
    pub success: bool,
    pub display_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn success(tool_name: &str, display_text: String, raw_value: Option<Value>) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            success: true,
            display_text,
            raw_value,
            error: None,
        }
    }

    pub fn failure(tool_name: &str, error: String) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            success: false,
            display_text: String::new(),
            raw_value: None,
            error: Some(error),
        }
    }

    /// The text appended to the conversation as the tool-response message.
    pub fn render(&self) -> String {
        if self.success {
            self.display_text.clone()
        } else {
            format!(
                "Error: {}",
                self.error.as_deref().unwrap_or("unknown error")
            )
        }
    }
}

// ── Argument extraction helpers ─────────────────────────────────────────

pub fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .with_context(|| format!("missing required parameter: {}", key))
}

pub fn optional_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

pub fn optional_f64(args: &Value, key: &str) -> Option<f64> {
    args.get(key).and_then(Value::as_f64)
}

pub fn required_f64(args: &Value, key: &str) -> Result<f64> {
    args.get(key)
        .and_then(Value::as_f64)
        .with_context(|| format!("missing required numeric parameter: {}", key))
}

pub fn optional_usize(args: &Value, key: &str) -> Option<usize> {
    args.get(key).and_then(Value::as_u64).map(|v| v as usize)
}

pub fn number_list(args: &Value, key: &str) -> Result<Vec<f64>> {
    let items = args
        .get(key)
        .and_then(Value::as_array)
        .with_context(|| format!("missing required array parameter: {}", key))?;
    items
        .iter()
        .map(|item| {
            item.as_f64()
                .with_context(|| format!("parameter {} must contain only numbers", key))
        })
        .collect()
}

pub fn optional_number_list(args: &Value, key: &str) -> Option<Vec<f64>> {
    let items = args.get(key)?.as_array()?;
    items.iter().map(Value::as_f64).collect()
}

pub fn string_list(args: &Value, key: &str) -> Result<Vec<String>> {
    let items = args
        .get(key)
        .and_then(Value::as_array)
        .with_context(|| format!("missing required array parameter: {}", key))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .with_context(|| format!("parameter {} must contain only strings", key))
        })
        .collect()
}

pub fn matrix_arg(args: &Value, key: &str) -> Result<Vec<Vec<f64>>> {
    let rows = args
        .get(key)
        .and_then(Value::as_array)
        .with_context(|| format!("missing required matrix parameter: {}", key))?;
    rows.iter()
        .map(|row| {
            let cells = row
                .as_array()
                .with_context(|| format!("parameter {} must be a list of rows", key))?;
            cells
                .iter()
                .map(|cell| {
                    cell.as_f64()
                        .with_context(|| format!("parameter {} must contain only numbers", key))
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outcome_render_success() {
        let outcome = ToolOutcome::success("simplify", "$x$".to_string(), None);
        assert!(outcome.success);
        assert_eq!(outcome.render(), "$x$");
    }

    #[test]
    fn test_outcome_render_failure() {
        let outcome = ToolOutcome::failure("solve", "no real solutions".to_string());
        assert!(!outcome.success);
        assert_eq!(outcome.render(), "Error: no real solutions");
    }

    #[test]
    fn test_required_str() {
        let args = json!({"expression": "x + 1"});
        assert_eq!(required_str(&args, "expression").unwrap(), "x + 1");
        assert!(required_str(&args, "missing").is_err());
    }

    #[test]
    fn test_matrix_arg() {
        let args = json!({"matrix": [[1, 2], [3, 4]]});
        let matrix = matrix_arg(&args, "matrix").unwrap();
        assert_eq!(matrix, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);

        let bad = json!({"matrix": [[1, "x"]]});
        assert!(matrix_arg(&bad, "matrix").is_err());
    }

    #[test]
    fn test_schema_serialization() {
        let schema = ToolInputSchema::new(
            json!({"expression": {"type": "string", "description": "Formula"}}),
            &["expression"],
        );
        let text = serde_json::to_string(&schema).unwrap();
        assert!(text.contains("\"type\":\"object\""));
        assert!(text.contains("\"required\":[\"expression\"]"));
    }
}
