//! Research prompts offered to MCP clients

use crate::protocol::*;
use anyhow::Result;
use serde_json::{Map, Value};

const fn arg(name: &'static str, description: &'static str, required: bool) -> PromptArgument {
    PromptArgument {
        name,
        description,
        required,
    }
}

pub fn prompt_definitions() -> Vec<PromptDefinition> {
    vec![
        PromptDefinition {
            name: "fraud_investigation_search",
            description: "Search for fraud investigations and related findings in the PIA database",
            arguments: vec![
                arg("topic", "The fraud topic or area to investigate", true),
                arg(
                    "time_period",
                    "Time period for the search (e.g., 'last 5 years')",
                    false,
                ),
            ],
        },
        PromptDefinition {
            name: "compliance_recommendations",
            description: "Find compliance recommendations and regulatory guidance",
            arguments: vec![
                arg("area", "The compliance area or domain to search", true),
                arg("data_source", "Specific data source (GAO, OIG, etc.)", false),
            ],
        },
        PromptDefinition {
            name: "risk_analysis",
            description: "Analyze risk factors and vulnerabilities in specific domains",
            arguments: vec![
                arg("domain", "The domain or sector to analyze for risks", true),
                arg(
                    "risk_type",
                    "Type of risk to focus on (financial, operational, etc.)",
                    false,
                ),
            ],
        },
        PromptDefinition {
            name: "findings_summary",
            description: "Generate a comprehensive summary of findings about a specific subject",
            arguments: vec![
                arg("subject", "The subject or entity to summarize findings about", true),
                arg(
                    "max_results",
                    "Maximum number of results to include in summary",
                    false,
                ),
            ],
        },
    ]
}

/// Render a prompt; required arguments must be present and non-blank
pub fn get_prompt(name: &str, arguments: &Value) -> Result<PromptResult> {
    let definition = prompt_definitions()
        .into_iter()
        .find(|p| p.name == name)
        .ok_or_else(|| anyhow::anyhow!("Prompt '{}' not found", name))?;

    let empty = Map::new();
    let args = arguments.as_object().unwrap_or(&empty);
    let get = |key: &str| -> Option<String> {
        args.get(key).and_then(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    };

    for argument in definition.arguments.iter().filter(|a| a.required) {
        if get(argument.name).is_none() {
            anyhow::bail!("Missing required argument '{}' for prompt '{}'", argument.name, name);
        }
    }
    let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

    let text = match name {
        "fraud_investigation_search" => fraud_investigation(
            &or("topic", ""),
            &or("time_period", "all available years"),
        ),
        "compliance_recommendations" => {
            compliance(&or("area", ""), &or("data_source", "all sources"))
        }
        "risk_analysis" => risk(&or("domain", ""), &or("risk_type", "all risk types")),
        "findings_summary" => findings(&or("subject", ""), &or("max_results", "20")),
        _ => anyhow::bail!("Prompt '{}' not found", name),
    };

    Ok(PromptResult {
        description: definition.description,
        messages: vec![PromptMessage {
            role: "user",
            content: Content::text(text),
        }],
    })
}

fn fraud_investigation(topic: &str, time_period: &str) -> String {
    format!(
        r#"You are a fraud investigation analyst working with the Program Integrity Alliance (PIA) database.

Find fraud investigations and related findings on: "{topic}"
Time period: {time_period}

Suggested approach:
1. Run a broad "pia_search_content" query on the topic.
2. Call "pia_search_content_facets" to see which filter values exist, then narrow with a filter such as SourceDocumentPublishDate ge 2020-01-01.
3. Use "pia_search_content_doj" for enforcement actions and "pia_search_content_oig" for inspector general work.
4. Retrieve the most relevant documents in full with "fetch".

Look for investigation reports, audit findings, compliance violations, recommended corrective actions and follow-up enforcement.

Summarize what you find and cite every source with its link."#
    )
}

fn compliance(area: &str, data_source: &str) -> String {
    format!(
        r#"You are a compliance analyst working with the Program Integrity Alliance (PIA) database.

Find compliance recommendations and regulatory guidance for: "{area}"
Preferred data source: {data_source}

Suggested approach:
1. Search recommendations with "pia_search_content".
2. To stay within one source, use the matching agency tool (for example "pia_search_content_gao") or filter on SourceDocumentDataSource.
3. Use "pia_search_content_facets" to explore sources and recommendation status values.
4. Retrieve detailed recommendations with "fetch".

Organize the findings by recommendation type, source agency, implementation priority and monitoring requirements. Cite every source with its link."#
    )
}

fn risk(domain: &str, risk_type: &str) -> String {
    format!(
        r#"You are a risk analyst working with the Program Integrity Alliance (PIA) database.

Analyze risk factors and vulnerabilities in: "{domain}"
Risk focus: {risk_type}

Suggested approach:
1. Search risk assessments and vulnerability reports with "pia_search_content".
2. Narrow on fraud risk themes with a filter on RecFraudRiskManagementThemePIA when a risk type is given.
3. Use "pia_search_content_facets" to discover risk categories.
4. Retrieve detailed analyses with "fetch".

Report known weaknesses, historical incidents, mitigation strategies and monitoring needs, with severity and likely impact. Cite every source with its link."#
    )
}

fn findings(subject: &str, max_results: &str) -> String {
    format!(
        r#"You are a research analyst working with the Program Integrity Alliance (PIA) database.

Summarize the findings about: "{subject}"
Review at most {max_results} results.

Suggested approach:
1. Search broadly with "pia_search_content", then page through results.
2. Use "pia_search_content_facets" to find relevant sources and categories.
3. Retrieve the most significant documents with "fetch".
4. Use "search" for quick follow-up lookups.

Structure the summary as:
## Executive Summary
## Findings by Category
## Sources and Citations
## Timeline
## Recommendations and Next Steps

Cite every finding with a link to its source document."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_four_prompts() {
        let names: Vec<_> = prompt_definitions().iter().map(|p| p.name).collect();
        assert_eq!(
            names,
            vec![
                "fraud_investigation_search",
                "compliance_recommendations",
                "risk_analysis",
                "findings_summary"
            ]
        );
    }

    #[test]
    fn test_render_with_defaults() {
        let result = get_prompt("risk_analysis", &json!({"domain": "Medicaid"})).unwrap();
        let Content::Text { text } = &result.messages[0].content;
        assert!(text.contains("\"Medicaid\""));
        assert!(text.contains("Risk focus: all risk types"));
        assert_eq!(result.messages[0].role, "user");
    }

    #[test]
    fn test_numeric_argument() {
        let result =
            get_prompt("findings_summary", &json!({"subject": "SNAP", "max_results": 5})).unwrap();
        let Content::Text { text } = &result.messages[0].content;
        assert!(text.contains("at most 5 results"));
    }

    #[test]
    fn test_missing_required_argument() {
        let err = get_prompt("compliance_recommendations", &json!({})).unwrap_err();
        assert!(err.to_string().contains("'area'"));
    }

    #[test]
    fn test_unknown_prompt() {
        assert!(get_prompt("nope", &Value::Null).is_err());
    }
}
