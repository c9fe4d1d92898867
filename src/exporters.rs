use anyhow::{Context, Result};
use prettytable::{Cell, Row, Table};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Export formats supported by the tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// JSON format
    Json,
    /// YAML format
    Yaml,
    /// CSV format, one `metric,key,value` row per scalar
    Csv,
    /// Plain text table
    Text,
}

impl ExportFormat {
    /// Parse a string into an export format
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(ExportFormat::Json),
            "yaml" | "yml" => Some(ExportFormat::Yaml),
            "csv" => Some(ExportFormat::Csv),
            "text" | "txt" => Some(ExportFormat::Text),
            _ => None,
        }
    }

    /// Guess the format from an output file extension
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_str)
    }
}

/// Export metric results in the specified format, to a file or stdout
pub fn export_results<P: AsRef<Path>>(
    results: &Map<String, Value>,
    format: ExportFormat,
    output_path: Option<P>,
) -> Result<()> {
    let content = format_results(results, format)?;

    if let Some(path) = output_path {
        let mut file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create output file: {:?}", path.as_ref()))?;
        file.write_all(content.as_bytes())?;
    } else {
        println!("{}", content);
    }

    Ok(())
}

/// Render metric results as a string in the given format
pub fn format_results(results: &Map<String, Value>, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => {
            serde_json::to_string_pretty(results).context("Failed to serialize results to JSON")
        }
        ExportFormat::Yaml => {
            serde_yaml::to_string(results).context("Failed to serialize results to YAML")
        }
        ExportFormat::Csv => format_as_csv(results),
        ExportFormat::Text => Ok(format_as_text(results)),
    }
}

/// Flattens every metric into `(metric, key, value)` rows.
///
/// Nested keys are joined with `.`; arrays of scalars collapse into one
/// `;`-separated value, other arrays are indexed.
pub fn flatten_results(results: &Map<String, Value>) -> Vec<(String, String, String)> {
    let mut rows = Vec::new();
    for (metric, value) in results {
        flatten_value(metric, "", value, &mut rows);
    }
    rows
}

fn join_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn flatten_value(metric: &str, prefix: &str, value: &Value, rows: &mut Vec<(String, String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                flatten_value(metric, &join_key(prefix, key), nested, rows);
            }
        }
        Value::Array(items) => {
            let scalars: Option<Vec<String>> = items.iter().map(scalar_to_string).collect();
            match scalars {
                Some(scalars) => {
                    rows.push((metric.to_string(), prefix.to_string(), scalars.join(";")));
                }
                None => {
                    for (i, item) in items.iter().enumerate() {
                        flatten_value(metric, &join_key(prefix, &i.to_string()), item, rows);
                    }
                }
            }
        }
        scalar => {
            let text = scalar_to_string(scalar).unwrap_or_default();
            rows.push((metric.to_string(), prefix.to_string(), text));
        }
    }
}

fn format_as_csv(results: &Map<String, Value>) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(["metric", "key", "value"])?;
    for (metric, key, value) in flatten_results(results) {
        wtr.write_record([metric, key, value])?;
    }
    let buffer = wtr.into_inner().context("Failed to flush CSV output")?;
    String::from_utf8(buffer).context("CSV output is not valid UTF-8")
}

fn format_as_text(results: &Map<String, Value>) -> String {
    let mut table = Table::new();
    table.add_row(Row::new(vec![
        Cell::new("Metric"),
        Cell::new("Key"),
        Cell::new("Value"),
    ]));
    for (metric, key, value) in flatten_results(results) {
        table.add_row(Row::new(vec![
            Cell::new(&metric),
            Cell::new(&key),
            Cell::new(&value),
        ]));
    }
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_nested_and_arrays() {
        let mut results = Map::new();
        results.insert("density".to_string(), json!({ "density": 0.5 }));
        results.insert(
            "longest_path".to_string(),
            json!({ "longest_path": { "start_node": "a", "length": 1, "path": ["a", "b"] } }),
        );

        let rows = flatten_results(&results);
        assert_eq!(rows[0], ("density".into(), "density".into(), "0.5".into()));
        assert!(rows.contains(&(
            "longest_path".into(),
            "longest_path.path".into(),
            "a;b".into()
        )));
        assert!(rows.contains(&(
            "longest_path".into(),
            "longest_path.length".into(),
            "1".into()
        )));
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!(ExportFormat::from_str("YAML"), Some(ExportFormat::Yaml));
        assert_eq!(ExportFormat::from_path("out.csv"), Some(ExportFormat::Csv));
        assert_eq!(ExportFormat::from_str("html"), None);
    }
}
