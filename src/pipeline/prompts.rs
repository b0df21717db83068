//! Prompt templates for the research and extraction calls.
//!
//! Prompts are built deterministically from the report configuration: the
//! same config (and the same research text) always yields the same prompt.

use serde_json::{json, Value};

use crate::error::FieldError;
use crate::report::ReportConfig;

/// System prompt for the research call.
pub const RESEARCH_SYSTEM_PROMPT: &str =
    "You are a senior market research analyst. Report facts with specific figures and name the companies involved.";

/// System prompt for the extraction call.
pub const EXTRACTION_SYSTEM_PROMPT: &str =
    "You are an expert business analyst. Respond with a single JSON object and nothing else.";

const RESEARCH_PROMPT: &str = r#"Search the web for comprehensive information about {subject}.

Focus on gathering:
1. Market size and growth metrics
2. Key players and market share data
3. Consumer behavior and trends
4. Competitive landscape
5. Growth drivers and challenges
6. Future projections and forecasts

Analysis Type: {analysis_type}
Required depth: Professional analyst level
Sources needed: Recent, authoritative business and market research sources"#;

const SOURCES_INSTRUCTION: &str =
    "Name the source of every figure you report (publisher and year, or URL).";

const ANALYSIS_PROMPT: &str = r#"As an expert business analyst, analyze the following research data and create a structured report.

Research Data:
{research}

Generate a comprehensive analysis with:
1. Executive Summary (2-3 key insights)
2. Key Findings (5-7 specific data points)
3. Market Size information (if available)
{charts_instruction}
5. Strategic Recommendations (3-5 actionable items)
6. Risk Factors (if applicable)
7. Methodology notes

Make sure all data is factual and based on the research provided.

Return exactly one JSON object with this shape:
{schema}"#;

const CHARTS_INSTRUCTION: &str = r#"4. 3-4 meaningful charts with proper data

Charts should include:
- Market size/growth charts (bar or line)
- Market share charts (pie or doughnut)
- Trend analysis (line charts)
- Competitive comparison (bar charts)"#;

const NO_CHARTS_INSTRUCTION: &str = "4. No charts: return \"charts\" as an empty list";

const RECORD_SHAPE: &str = r#"{
  "executiveSummary": string,
  "keyFindings": [string, ...]                  (at least one),
  "marketSize": {                               (optional; omit figures you do not have)
    "current": number | null,
    "projected": number | null,
    "unit": string,
    "growthRate": number | null                 (percent)
  },
  "charts": [{
    "type": "bar" | "line" | "pie" | "doughnut" | "radar",
    "title": string,
    "labels": [string, ...],
    "datasets": [{
      "label": string,
      "data": [number, ...]                     (exactly one value per label),
      "backgroundColor": [string, ...]          (optional)
    }, ...]                                     (at least one)
  }, ...],
  "recommendations": [string, ...]              (at least one),
  "riskFactors": [string, ...]                  (optional),
  "methodology": string                         (optional)
}"#;

const STRICT_RETRY_PROMPT: &str = r#"Your previous answer was rejected because it did not match the required shape:
{violations}

Answer again. Output ONLY the JSON object, with no markdown fences and no commentary. Every required field must be present, list fields must not be empty, and every dataset must have exactly one number per chart label."#;

/// Build the research prompt.
///
/// Empty timeframe and absent region are left out of the subject line.
pub fn research_prompt(config: &ReportConfig) -> String {
    let mut subject = config.topic.clone();
    if !config.timeframe.is_empty() {
        subject.push_str(&format!(" for {}", config.timeframe));
    }
    if let Some(region) = &config.region {
        subject.push_str(&format!(" in {}", region));
    }

    let mut prompt = RESEARCH_PROMPT
        .replace("{analysis_type}", config.analysis_type.as_str())
        .replace("{subject}", &subject);
    if config.include_sources {
        prompt.push('\n');
        prompt.push_str(SOURCES_INSTRUCTION);
    }
    prompt
}

/// Build the extraction prompt embedding the research text and the target shape.
pub fn analysis_prompt(research: &str, config: &ReportConfig) -> String {
    let charts = if config.include_charts {
        CHARTS_INSTRUCTION
    } else {
        NO_CHARTS_INSTRUCTION
    };
    ANALYSIS_PROMPT
        .replace("{charts_instruction}", charts)
        .replace("{schema}", RECORD_SHAPE)
        .replace("{research}", research)
}

/// Follow-up message for the single re-prompt after a schema violation.
pub fn strict_retry_prompt(violations: &[FieldError]) -> String {
    let listed: Vec<String> = violations.iter().map(|v| format!("- {}", v)).collect();
    STRICT_RETRY_PROMPT.replace("{violations}", &listed.join("\n"))
}

/// JSON Schema of the report record, sent as the structured-output constraint.
///
/// Strict structured output wants every object closed and every key listed in
/// `required`, so optional fields are nullable instead of omitted. The
/// validator treats `null` as absent. Non-empty lists and the length
/// agreement between labels and series are enforced by the validator.
pub fn record_json_schema() -> Value {
    let string_list = json!({ "type": "array", "items": { "type": "string" } });
    let nullable_string_list = json!({ "type": ["array", "null"], "items": { "type": "string" } });
    let nullable_number = json!({ "type": ["number", "null"] });
    let nullable_string = json!({ "type": ["string", "null"] });

    let dataset = strict_object(json!({
        "label": { "type": "string" },
        "data": { "type": "array", "items": { "type": "number" } },
        "backgroundColor": nullable_string_list,
        "borderColor": nullable_string,
        "borderWidth": nullable_number
    }));
    let chart = strict_object(json!({
        "type": { "type": "string", "enum": ["bar", "line", "pie", "doughnut", "radar"] },
        "title": { "type": "string" },
        "labels": string_list,
        "datasets": { "type": "array", "items": dataset }
    }));
    let mut market_size = strict_object(json!({
        "current": nullable_number,
        "projected": nullable_number,
        "unit": nullable_string,
        "growthRate": nullable_number
    }));
    market_size["type"] = json!(["object", "null"]);

    strict_object(json!({
        "executiveSummary": { "type": "string" },
        "keyFindings": string_list,
        "marketSize": market_size,
        "charts": { "type": "array", "items": chart },
        "recommendations": string_list,
        "riskFactors": nullable_string_list,
        "methodology": nullable_string
    }))
}

/// A closed object schema requiring every one of `properties`.
fn strict_object(properties: Value) -> Value {
    let required: Vec<Value> = properties
        .as_object()
        .map(|props| props.keys().cloned().map(Value::String).collect())
        .unwrap_or_default();
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}
