//! MCP tool definitions and result rendering
//!
//! Tool definitions come straight from the core registry. Results keep the
//! backend payload verbatim; notes and filter warnings ride along as extra
//! text content.

use crate::protocol::*;
use pia_core::{PiaError, ToolOutcome, ToolRegistry};
use serde_json::{json, Value};

/// One definition per registry entry, in catalog order
pub fn tool_definitions(registry: &ToolRegistry) -> Vec<ToolDefinition> {
    registry
        .iter()
        .map(|spec| ToolDefinition {
            name: spec.name.clone(),
            description: spec.description.clone(),
            input_schema: spec.input_schema(),
        })
        .collect()
}

/// Render a successful call
pub fn outcome_result(outcome: &ToolOutcome) -> ToolResult {
    let mut content = payload_content(&outcome.payload);

    let mut extra = Vec::new();
    if let Some(filter) = &outcome.filter {
        extra.push(format!("Filter applied: {}", filter));
    }
    for note in &outcome.notes {
        extra.push(format!("Note: {}", note));
    }
    for warning in &outcome.warnings {
        extra.push(format!("Warning: {}", warning));
    }
    if !extra.is_empty() {
        content.push(Content::text(extra.join("\n")));
    }

    ToolResult {
        content,
        structured_content: serde_json::to_value(outcome).ok(),
        is_error: None,
    }
}

/// Render a failed call with its error kind
pub fn error_result(err: &PiaError) -> ToolResult {
    let kind = err.kind();
    let kind_name = serde_json::to_value(kind)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "internal".to_string());

    ToolResult {
        content: vec![Content::text(format!("Error: {}", err))],
        structured_content: Some(json!({
            "error": {
                "kind": kind_name,
                "message": err.to_string(),
            }
        })),
        is_error: Some(true),
    }
}

/// Text content for a backend payload.
///
/// A payload that already carries MCP text content is passed through;
/// anything else is pretty-printed JSON.
fn payload_content(payload: &Value) -> Vec<Content> {
    let texts: Vec<Content> = payload
        .get("content")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .map(Content::text)
                .collect()
        })
        .unwrap_or_default();
    if !texts.is_empty() {
        return texts;
    }

    let text = match payload {
        Value::Null => "No results returned from the search backend".to_string(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    };
    vec![Content::text(text)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pia_core::error::SyntaxError;

    fn outcome(payload: Value) -> ToolOutcome {
        ToolOutcome {
            tool: "pia_search_content".to_string(),
            payload,
            filter: None,
            notes: Vec::new(),
            warnings: Vec::new(),
            attempts: 1,
        }
    }

    #[test]
    fn test_definitions_cover_catalog() {
        let registry = ToolRegistry::pia().unwrap();
        let defs = tool_definitions(&registry);
        assert_eq!(defs.len(), registry.len());
        assert!(defs
            .iter()
            .all(|d| d.input_schema["type"] == "object" && !d.description.is_empty()));
    }

    #[test]
    fn test_payload_pretty_printed() {
        let result = outcome_result(&outcome(json!({"output": {"total_count": 0}})));
        assert_eq!(result.content.len(), 1);
        let Content::Text { text } = &result.content[0];
        assert!(text.contains("\"total_count\": 0"));
        assert_eq!(result.is_error, None);
        assert_eq!(
            result.structured_content.unwrap()["payload"]["output"]["total_count"],
            0
        );
    }

    #[test]
    fn test_text_content_passed_through() {
        let result = outcome_result(&outcome(json!({
            "content": [{"type": "text", "text": "three results"}]
        })));
        assert_eq!(result.content, vec![Content::text("three results")]);
    }

    #[test]
    fn test_notes_appended() {
        let mut o = outcome(json!({}));
        o.filter = Some("RecStatus eq 'Open'".to_string());
        o.notes.push("page_size 100 exceeds the maximum of 50; using 50".to_string());
        let result = outcome_result(&o);
        assert_eq!(result.content.len(), 2);
        let Content::Text { text } = &result.content[1];
        assert!(text.contains("Filter applied: RecStatus eq 'Open'"));
        assert!(text.contains("Note: page_size 100"));
    }

    #[test]
    fn test_error_structured() {
        let err = PiaError::from(SyntaxError::new(3, "expected comparison operator"));
        let result = error_result(&err);
        assert_eq!(result.is_error, Some(true));
        let structured = result.structured_content.unwrap();
        assert_eq!(structured["error"]["kind"], "syntax_error");
        assert!(structured["error"]["message"]
            .as_str()
            .unwrap()
            .contains("offset 3"));
    }
}
