//! Structural validation of report configurations and report records.
//!
//! Input arrives as untyped JSON (from a request body or from a model's
//! structured output). The validator walks it field by field, collecting
//! every problem instead of stopping at the first, and only builds the typed
//! value when nothing was rejected.

use serde_json::{Map, Value};

use crate::error::FieldError;
use crate::report::{
    AnalysisType, ChartDataset, ChartOptions, ChartSpec, ChartType, MarketSize, OutputFormat,
    ReportConfig, ReportRecord,
};

/// Accumulated result of validating one document.
#[derive(Debug, Clone, Default)]
pub struct SchemaValidationResult {
    /// Every rejected field, in document order.
    pub errors: Vec<FieldError>,
}

impl SchemaValidationResult {
    /// Create an empty (valid) result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an error to the result.
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    /// Whether no errors were recorded.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Hand back `value` when valid, the collected errors otherwise.
    pub fn into_result<T>(self, value: Option<T>) -> Result<T, Vec<FieldError>> {
        match value {
            Some(value) if self.errors.is_empty() => Ok(value),
            _ if !self.errors.is_empty() => Err(self.errors),
            _ => Err(vec![FieldError::new("$", "document could not be validated")]),
        }
    }
}

/// Validator for report configurations and report records.
pub struct SchemaValidator;

impl SchemaValidator {
    /// Validate and normalize a report configuration.
    ///
    /// Applies defaults (`includeCharts`, `includeSources` = true,
    /// `outputFormat` = pdf), trims free-text fields and drops blank optional
    /// strings. `format` is accepted as an alias of `outputFormat`.
    pub fn validate_config(raw: &Value) -> Result<ReportConfig, Vec<FieldError>> {
        let mut result = SchemaValidationResult::new();
        let Some(obj) = expect_object(raw, "$", &mut result) else {
            return Err(result.errors);
        };

        let title = required_text(obj, "title", "title", &mut result);
        let subtitle = optional_text(obj, "subtitle", "subtitle", &mut result);
        let topic = required_text(obj, "topic", "topic", &mut result);
        let analysis_type = required_enum(
            obj,
            "analysisType",
            AnalysisType::parse,
            &AnalysisType::ALL.map(|t| t.as_str()),
            &mut result,
        );
        let timeframe = match obj.get("timeframe") {
            None | Some(Value::Null) => {
                result.add_error("timeframe", "is required");
                None
            }
            Some(Value::String(s)) => Some(s.trim().to_string()),
            Some(_) => {
                result.add_error("timeframe", "expected a string");
                None
            }
        };
        let region = optional_text(obj, "region", "region", &mut result);
        let include_charts = optional_bool(obj, "includeCharts", true, &mut result);
        let include_sources = optional_bool(obj, "includeSources", true, &mut result);

        let format_key = if obj.contains_key("outputFormat") {
            "outputFormat"
        } else {
            "format"
        };
        let output_format = match obj.get(format_key) {
            None | Some(Value::Null) => Some(OutputFormat::default()),
            Some(Value::String(s)) => OutputFormat::parse(s).or_else(|| {
                result.add_error(format_key, "expected one of: pdf, html, markdown");
                None
            }),
            Some(_) => {
                result.add_error(format_key, "expected one of: pdf, html, markdown");
                None
            }
        };

        let config = (|| {
            Some(ReportConfig {
                title: title?,
                subtitle,
                topic: topic?,
                analysis_type: analysis_type?,
                timeframe: timeframe?,
                region,
                include_charts,
                include_sources,
                output_format: output_format?,
            })
        })();
        result.into_result(config)
    }

    /// Validate and normalize a structured report record.
    ///
    /// Enforces required sections, non-empty finding and recommendation
    /// lists, chart type membership, label/series length agreement and the
    /// rule that axis options only appear on bar and line charts.
    pub fn validate_record(raw: &Value) -> Result<ReportRecord, Vec<FieldError>> {
        let mut result = SchemaValidationResult::new();
        let Some(obj) = expect_object(raw, "$", &mut result) else {
            return Err(result.errors);
        };

        let executive_summary =
            required_text(obj, "executiveSummary", "executiveSummary", &mut result);
        let key_findings = match obj.get("keyFindings") {
            None | Some(Value::Null) => {
                result.add_error("keyFindings", "is required");
                None
            }
            Some(value) => string_list(value, "keyFindings", true, &mut result),
        };
        let market_size = match obj.get("marketSize") {
            None | Some(Value::Null) => None,
            Some(value) => market_size(value, "marketSize", &mut result),
        };
        let charts = match obj.get("charts") {
            None | Some(Value::Null) => {
                result.add_error("charts", "is required (use an empty list for no charts)");
                None
            }
            Some(Value::Array(items)) => {
                let charts: Vec<Option<ChartSpec>> = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| chart(item, &format!("charts[{}]", i), &mut result))
                    .collect();
                charts.into_iter().collect::<Option<Vec<_>>>()
            }
            Some(_) => {
                result.add_error("charts", "expected an array");
                None
            }
        };
        let recommendations = match obj.get("recommendations") {
            None | Some(Value::Null) => {
                result.add_error("recommendations", "is required");
                None
            }
            Some(value) => string_list(value, "recommendations", true, &mut result),
        };
        let risk_factors = match obj.get("riskFactors") {
            None | Some(Value::Null) => Some(None),
            Some(value) => string_list(value, "riskFactors", false, &mut result).map(Some),
        };
        let methodology = optional_text(obj, "methodology", "methodology", &mut result);

        let record = (|| {
            Some(ReportRecord {
                executive_summary: executive_summary?,
                key_findings: key_findings?,
                market_size,
                charts: charts?,
                recommendations: recommendations?,
                risk_factors: risk_factors?,
                methodology,
            })
        })();
        result.into_result(record)
    }
}

fn expect_object<'a>(
    value: &'a Value,
    path: &str,
    result: &mut SchemaValidationResult,
) -> Option<&'a Map<String, Value>> {
    match value.as_object() {
        Some(obj) => Some(obj),
        None => {
            result.add_error(path, "expected an object");
            None
        }
    }
}

fn join(parent: &str, key: &str) -> String {
    if parent.is_empty() || parent == "$" {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

/// Required string that must be non-empty after trimming. Returns it trimmed.
fn required_text(
    obj: &Map<String, Value>,
    key: &str,
    path: &str,
    result: &mut SchemaValidationResult,
) -> Option<String> {
    match obj.get(key) {
        None | Some(Value::Null) => {
            result.add_error(path, "is required");
            None
        }
        Some(Value::String(s)) if s.trim().is_empty() => {
            result.add_error(path, "must not be empty");
            None
        }
        Some(Value::String(s)) => Some(s.trim().to_string()),
        Some(_) => {
            result.add_error(path, "expected a string");
            None
        }
    }
}

/// Optional string; blank values normalize to `None`.
fn optional_text(
    obj: &Map<String, Value>,
    key: &str,
    path: &str,
    result: &mut SchemaValidationResult,
) -> Option<String> {
    match obj.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => Some(s.trim().to_string()),
        Some(_) => {
            result.add_error(path, "expected a string");
            None
        }
    }
}

fn optional_bool(
    obj: &Map<String, Value>,
    key: &str,
    default: bool,
    result: &mut SchemaValidationResult,
) -> bool {
    match obj.get(key) {
        None | Some(Value::Null) => default,
        Some(Value::Bool(b)) => *b,
        Some(_) => {
            result.add_error(key, "expected a boolean");
            default
        }
    }
}

fn optional_number(
    obj: &Map<String, Value>,
    key: &str,
    parent: &str,
    result: &mut SchemaValidationResult,
) -> Option<f64> {
    match obj.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => n.as_f64(),
        Some(_) => {
            result.add_error(join(parent, key), "expected a number");
            None
        }
    }
}

fn required_enum<T: Copy>(
    obj: &Map<String, Value>,
    key: &str,
    parse: fn(&str) -> Option<T>,
    allowed: &[&str],
    result: &mut SchemaValidationResult,
) -> Option<T> {
    let reject = |result: &mut SchemaValidationResult| {
        result.add_error(key, format!("expected one of: {}", allowed.join(", ")));
    };
    match obj.get(key) {
        None | Some(Value::Null) => {
            result.add_error(key, "is required");
            None
        }
        Some(Value::String(s)) => {
            let parsed = parse(s.trim());
            if parsed.is_none() {
                reject(result);
            }
            parsed
        }
        Some(_) => {
            reject(result);
            None
        }
    }
}

fn string_list(
    value: &Value,
    path: &str,
    non_empty: bool,
    result: &mut SchemaValidationResult,
) -> Option<Vec<String>> {
    let Some(items) = value.as_array() else {
        result.add_error(path, "expected an array of strings");
        return None;
    };
    if non_empty && items.is_empty() {
        result.add_error(path, "must contain at least one entry");
        return None;
    }
    let before = result.errors.len();
    let strings: Vec<String> = items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| match item {
            Value::String(s) => Some(s.clone()),
            _ => {
                result.add_error(format!("{}[{}]", path, i), "expected a string");
                None
            }
        })
        .collect();
    (result.errors.len() == before).then_some(strings)
}

fn market_size(
    value: &Value,
    path: &str,
    result: &mut SchemaValidationResult,
) -> Option<MarketSize> {
    let obj = expect_object(value, path, result)?;
    let unit = match obj.get("unit") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            result.add_error(join(path, "unit"), "expected a string");
            None
        }
    };
    Some(MarketSize {
        current: optional_number(obj, "current", path, result),
        projected: optional_number(obj, "projected", path, result),
        unit,
        growth_rate: optional_number(obj, "growthRate", path, result),
    })
}

fn chart(value: &Value, path: &str, result: &mut SchemaValidationResult) -> Option<ChartSpec> {
    let obj = expect_object(value, path, result)?;
    let before = result.errors.len();

    let type_key = if obj.contains_key("type") {
        "type"
    } else {
        "chartType"
    };
    let chart_type = match obj.get(type_key).and_then(Value::as_str) {
        Some(s) => ChartType::parse(s).or_else(|| {
            result.add_error(
                join(path, type_key),
                "expected one of: bar, line, pie, doughnut, radar",
            );
            None
        }),
        None => {
            result.add_error(join(path, "type"), "is required");
            None
        }
    };

    let title = match obj.get("title") {
        Some(Value::String(s)) => Some(s.clone()),
        None | Some(Value::Null) => {
            result.add_error(join(path, "title"), "is required");
            None
        }
        Some(_) => {
            result.add_error(join(path, "title"), "expected a string");
            None
        }
    };

    let id = match obj.get("id") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            result.add_error(join(path, "id"), "expected a string");
            None
        }
    };

    let labels_path = join(path, "labels");
    let labels = match obj.get("labels") {
        None | Some(Value::Null) => {
            result.add_error(&labels_path, "is required");
            None
        }
        Some(value) => string_list(value, &labels_path, false, result),
    };

    let series_key = if obj.contains_key("datasets") {
        "datasets"
    } else {
        "series"
    };
    let series_path = join(path, series_key);
    let datasets = match obj.get(series_key) {
        Some(Value::Array(items)) if items.is_empty() => {
            result.add_error(&series_path, "must contain at least one series");
            None
        }
        Some(Value::Array(items)) => {
            let parsed: Vec<Option<ChartDataset>> = items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    dataset(
                        item,
                        &format!("{}[{}]", series_path, i),
                        labels.as_ref().map(Vec::len),
                        title.as_deref().unwrap_or_default(),
                        result,
                    )
                })
                .collect();
            parsed.into_iter().collect::<Option<Vec<_>>>()
        }
        None | Some(Value::Null) => {
            result.add_error(join(path, "datasets"), "is required");
            None
        }
        Some(_) => {
            result.add_error(&series_path, "expected an array of series");
            None
        }
    };

    let options_path = join(path, "options");
    let options = match obj.get("options") {
        None | Some(Value::Null) => None,
        Some(value) => match serde_json::from_value::<ChartOptions>(value.clone()) {
            Ok(options) => {
                if options.scales.is_some() && chart_type.is_some_and(|t| !t.has_axes()) {
                    result.add_error(
                        join(&options_path, "scales"),
                        "axis options are only valid for bar and line charts",
                    );
                }
                Some(options)
            }
            Err(e) => {
                result.add_error(&options_path, format!("invalid rendering options: {}", e));
                None
            }
        },
    };

    if result.errors.len() != before {
        return None;
    }
    Some(ChartSpec {
        id,
        chart_type: chart_type?,
        title: title?,
        labels: labels?,
        datasets: datasets?,
        options,
    })
}

fn dataset(
    value: &Value,
    path: &str,
    expected_len: Option<usize>,
    chart_title: &str,
    result: &mut SchemaValidationResult,
) -> Option<ChartDataset> {
    let obj = expect_object(value, path, result)?;
    let before = result.errors.len();

    let label = match obj.get("label") {
        None | Some(Value::Null) => chart_title.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(_) => {
            result.add_error(join(path, "label"), "expected a string");
            String::new()
        }
    };

    let data_path = join(path, "data");
    let data = match obj.get("data") {
        Some(Value::Array(items)) => {
            let numbers: Vec<Option<f64>> = items.iter().map(Value::as_f64).collect();
            if numbers.iter().any(Option::is_none) {
                result.add_error(&data_path, "expected an array of numbers");
                None
            } else {
                let numbers: Vec<f64> = numbers.into_iter().flatten().collect();
                if let Some(expected) = expected_len {
                    if numbers.len() != expected {
                        result.add_error(
                            &data_path,
                            format!(
                                "series has {} values but the chart has {} labels",
                                numbers.len(),
                                expected
                            ),
                        );
                    }
                }
                Some(numbers)
            }
        }
        None | Some(Value::Null) => {
            result.add_error(&data_path, "is required");
            None
        }
        Some(_) => {
            result.add_error(&data_path, "expected an array of numbers");
            None
        }
    };

    let background_color = match obj.get("backgroundColor") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(vec![s.clone()]),
        Some(value) => string_list(value, &join(path, "backgroundColor"), false, result),
    };
    let border_color = match obj.get("borderColor") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            result.add_error(join(path, "borderColor"), "expected a string");
            None
        }
    };
    let border_width = optional_number(obj, "borderWidth", path, result);

    if result.errors.len() != before {
        return None;
    }
    Some(ChartDataset {
        label,
        data: data?,
        background_color,
        border_color,
        border_width,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_record() -> Value {
        json!({
            "executiveSummary": "Oat milk keeps growing.",
            "keyFindings": ["Sales up 12%", "Three brands hold 60% share"],
            "marketSize": { "current": 2.5, "projected": 4.1, "unit": "USD billion", "growthRate": 9.8 },
            "charts": [{
                "type": "bar",
                "title": "Revenue by year",
                "labels": ["2023", "2024", "2025"],
                "datasets": [{ "label": "Revenue", "data": [1.9, 2.2, 2.5] }]
            }],
            "recommendations": ["Expand barista lines"],
            "riskFactors": ["Price competition"],
            "methodology": "Desk research"
        })
    }

    fn paths(errors: &[FieldError]) -> Vec<&str> {
        errors.iter().map(|e| e.path.as_str()).collect()
    }

    #[test]
    fn test_config_minimal_brief_gets_defaults() {
        let config = SchemaValidator::validate_config(&json!({
            "title": "Oat Milk Report",
            "topic": "oat milk",
            "analysisType": "market-analysis",
            "timeframe": "2025"
        }))
        .expect("config should validate");

        assert_eq!(config.title, "Oat Milk Report");
        assert_eq!(config.analysis_type, AnalysisType::MarketAnalysis);
        assert!(config.include_charts);
        assert!(config.include_sources);
        assert_eq!(config.output_format, OutputFormat::Pdf);
        assert_eq!(config.region, None);
    }

    #[test]
    fn test_config_missing_title_cites_path() {
        let errors = SchemaValidator::validate_config(&json!({
            "topic": "oat milk",
            "analysisType": "market-analysis",
            "timeframe": "2025"
        }))
        .expect_err("missing title must fail");
        assert_eq!(paths(&errors), vec!["title"]);
    }

    #[test]
    fn test_config_reports_every_problem() {
        let errors = SchemaValidator::validate_config(&json!({
            "title": "   ",
            "topic": 42,
            "analysisType": "vibes",
            "includeCharts": "yes",
            "format": "docx"
        }))
        .expect_err("should fail");
        let p = paths(&errors);
        assert!(p.contains(&"title"));
        assert!(p.contains(&"topic"));
        assert!(p.contains(&"analysisType"));
        assert!(p.contains(&"timeframe"));
        assert!(p.contains(&"includeCharts"));
        assert!(p.contains(&"format"));
    }

    #[test]
    fn test_config_trims_and_drops_blank_optionals() {
        let config = SchemaValidator::validate_config(&json!({
            "title": "  EV Outlook ",
            "subtitle": "  ",
            "topic": "electric vehicles",
            "analysisType": "trend-analysis",
            "timeframe": "",
            "region": " Europe ",
            "outputFormat": "html"
        }))
        .expect("valid");
        assert_eq!(config.title, "EV Outlook");
        assert_eq!(config.subtitle, None);
        assert_eq!(config.timeframe, "");
        assert_eq!(config.region.as_deref(), Some("Europe"));
        assert_eq!(config.output_format, OutputFormat::Html);
    }

    #[test]
    fn test_config_rejects_non_object() {
        let errors = SchemaValidator::validate_config(&json!("title")).expect_err("not an object");
        assert_eq!(paths(&errors), vec!["$"]);
    }

    #[test]
    fn test_record_valid() {
        let record = SchemaValidator::validate_record(&valid_record()).expect("valid record");
        assert_eq!(record.key_findings.len(), 2);
        assert_eq!(record.charts.len(), 1);
        assert_eq!(record.charts[0].chart_type, ChartType::Bar);
        let market = record.market_size.expect("market size");
        assert_eq!(market.growth_rate, Some(9.8));
    }

    #[test]
    fn test_record_missing_recommendations() {
        let mut raw = valid_record();
        raw.as_object_mut().expect("object").remove("recommendations");
        let errors = SchemaValidator::validate_record(&raw).expect_err("should fail");
        assert_eq!(paths(&errors), vec!["recommendations"]);
    }

    #[test]
    fn test_record_empty_lists_rejected() {
        let mut raw = valid_record();
        raw["keyFindings"] = json!([]);
        raw["recommendations"] = json!([]);
        let errors = SchemaValidator::validate_record(&raw).expect_err("should fail");
        assert_eq!(paths(&errors), vec!["keyFindings", "recommendations"]);
    }

    #[test]
    fn test_record_series_length_mismatch() {
        let mut raw = valid_record();
        raw["charts"][0]["datasets"][0]["data"] = json!([1.0, 2.0]);
        let errors = SchemaValidator::validate_record(&raw).expect_err("should fail");
        assert_eq!(paths(&errors), vec!["charts[0].datasets[0].data"]);
        assert!(errors[0].reason.contains("2 values"));
    }

    #[test]
    fn test_record_accepts_aliases_and_empty_charts() {
        let mut raw = valid_record();
        raw["charts"] = json!([{
            "chartType": "pie",
            "title": "Share",
            "labels": ["A", "B"],
            "series": [{ "data": [60, 40], "backgroundColor": "#3498db" }]
        }]);
        let record = SchemaValidator::validate_record(&raw).expect("aliases accepted");
        let chart = &record.charts[0];
        assert_eq!(chart.chart_type, ChartType::Pie);
        assert_eq!(chart.datasets[0].label, "Share");
        assert_eq!(
            chart.datasets[0].background_color,
            Some(vec!["#3498db".to_string()])
        );

        raw["charts"] = json!([]);
        let record = SchemaValidator::validate_record(&raw).expect("empty charts are fine");
        assert!(record.charts.is_empty());
    }

    #[test]
    fn test_record_axis_options_only_for_cartesian_charts() {
        let mut raw = valid_record();
        raw["charts"][0]["type"] = json!("pie");
        raw["charts"][0]["options"] = json!({
            "responsive": true,
            "scales": { "x": {}, "y": { "beginAtZero": true } }
        });
        let errors = SchemaValidator::validate_record(&raw).expect_err("should fail");
        assert_eq!(paths(&errors), vec!["charts[0].options.scales"]);
    }

    #[test]
    fn test_record_options_default_display_flags() {
        let mut raw = valid_record();
        raw["charts"][0]["type"] = json!("bar");
        raw["charts"][0]["options"] = json!({ "plugins": { "title": { "text": "T" }, "legend": {} } });
        let record = SchemaValidator::validate_record(&raw).expect("defaults apply");
        let options = record.charts[0].options.as_ref().expect("options kept");
        assert!(options.responsive);
        let title = options.plugins.title.as_ref().expect("title kept");
        assert!(title.display);
        assert_eq!(title.text, "T");
        assert!(options.plugins.legend.as_ref().map(|l| l.display).unwrap_or(false));
    }

    #[test]
    fn test_record_market_size_fields_independently_nullable() {
        let mut raw = valid_record();
        raw["marketSize"] = json!({ "current": null, "projected": 3.0, "growthRate": "fast" });
        let errors = SchemaValidator::validate_record(&raw).expect_err("bad growthRate");
        assert_eq!(paths(&errors), vec!["marketSize.growthRate"]);

        raw["marketSize"] = json!({ "current": null, "projected": 3.0 });
        let record = SchemaValidator::validate_record(&raw).expect("valid");
        let market = record.market_size.expect("present");
        assert_eq!(market.current, None);
        assert_eq!(market.projected, Some(3.0));
    }

    #[test]
    fn test_record_non_numeric_series() {
        let mut raw = valid_record();
        raw["charts"][0]["datasets"][0]["data"] = json!([1, "two", 3]);
        let errors = SchemaValidator::validate_record(&raw).expect_err("should fail");
        assert_eq!(paths(&errors), vec!["charts[0].datasets[0].data"]);
    }

    #[test]
    fn test_validated_record_round_trips() {
        let record = SchemaValidator::validate_record(&valid_record()).expect("valid");
        let value = serde_json::to_value(&record).expect("serialize");
        let again = SchemaValidator::validate_record(&value).expect("round trip");
        assert_eq!(record, again);
    }
}
