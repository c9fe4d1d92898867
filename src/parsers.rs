use anyhow::{Context, Result};
use lazy_static::lazy_static;
use log::{debug, info};
use regex::Regex;
use serde_json::Value;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

use crate::models::{PackageRecord, PackageSet, VulnerabilityRecord};
use crate::reporting::{SkipEvent, SkipReporter};

lazy_static! {
    static ref REQUIREMENT_RE: Regex =
        Regex::new(r"(?s)^([a-z0-9_.\-]+)(.*)$").expect("requirement pattern is valid");
}

/// A parsed `Requires-Dist` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    /// Lowercase package name
    pub name: String,
    /// Everything after the name, trimmed (extras, version, marker)
    pub constraint: String,
    /// Requested extras, e.g. `["security"]` for `requests[security]`
    pub extras: Vec<String>,
    /// Version specifier with surrounding parentheses removed
    pub version_spec: Option<String>,
    /// Environment marker after `;`
    pub marker: Option<String>,
}

impl Requirement {
    /// Whether the dependency was declared as a bare name
    pub fn is_unconstrained(&self) -> bool {
        self.constraint.is_empty()
    }
}

/// Parses a raw dependency string such as `"urllib3 (<3,>=1.21.1) ; extra == 'socks'"`.
///
/// Returns `None` when the string does not start with a package name.
pub fn parse_dependency(raw: &str) -> Option<Requirement> {
    let lowered = raw.trim().to_lowercase();
    let Some(captures) = REQUIREMENT_RE.captures(&lowered) else {
        debug!("Failed to parse dependency: {}", raw);
        return None;
    };
    let name = captures.get(1)?.as_str().to_string();
    let constraint = captures.get(2).map_or("", |m| m.as_str()).trim().to_string();

    let (spec_part, marker) = match constraint.split_once(';') {
        Some((spec, marker)) => (spec.trim(), Some(marker.trim().to_string())),
        None => (constraint.as_str(), None),
    };

    let (extras, version_part) = match spec_part.strip_prefix('[') {
        Some(rest) => match rest.split_once(']') {
            Some((extras, tail)) => (
                extras
                    .split(',')
                    .map(str::trim)
                    .filter(|extra| !extra.is_empty())
                    .map(str::to_string)
                    .collect(),
                tail.trim(),
            ),
            None => (Vec::new(), spec_part),
        },
        None => (Vec::new(), spec_part),
    };

    let version_spec = version_part
        .trim_start_matches('(')
        .trim_end_matches(')')
        .trim();
    let version_spec = (!version_spec.is_empty()).then(|| version_spec.to_string());

    debug!("Parsed dependency {}: name={}, constraint={}", raw, name, constraint);
    Some(Requirement {
        name,
        constraint,
        extras,
        version_spec,
        marker,
    })
}

/// Reads a JSON (or YAML) document into a generic value
fn read_document(file_path: &Path) -> Result<Value> {
    let extension = file_path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase();
    let content = fs::read_to_string(file_path)
        .with_context(|| format!("Failed to read file: {:?}", file_path))?;

    match extension.as_str() {
        "yml" | "yaml" => serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML content from: {:?}", file_path)),
        _ => serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON content from: {:?}", file_path)),
    }
}

/// Validates and converts a single snapshot entry
fn package_from_value(value: Value) -> Result<PackageRecord, String> {
    let object = value.as_object().ok_or("record is not an object")?;
    match object.get("name").and_then(Value::as_str) {
        Some(name) if !name.trim().is_empty() => {}
        _ => return Err("missing package name".to_string()),
    }
    if object.get("version").map_or(true, Value::is_null) {
        return Err("missing version".to_string());
    }
    let mut record: PackageRecord =
        serde_json::from_value(value).map_err(|e| e.to_string())?;
    record.name = record.name.trim().to_lowercase();
    Ok(record)
}

/// Loads the package snapshot (a JSON array of package records).
///
/// Malformed entries are reported and skipped; an unreadable file is an error.
pub fn load_package_records<P: AsRef<Path>>(
    file_path: P,
    reporter: &dyn SkipReporter,
) -> Result<PackageSet> {
    let file_path = file_path.as_ref();
    let document = read_document(file_path)?;
    let Value::Array(entries) = document else {
        return Err(anyhow::anyhow!(
            "Expected a list of package records in {:?}",
            file_path
        ));
    };

    let total = entries.len();
    let mut packages = PackageSet::new();
    for (position, entry) in entries.into_iter().enumerate() {
        match package_from_value(entry) {
            Ok(record) => {
                if let Some(previous) = packages.insert(record) {
                    debug!("Replacing duplicate record for {}", previous.name);
                }
            }
            Err(reason) => reporter.report(SkipEvent::MalformedRecord {
                source: format!("{}[{}]", file_path.display(), position),
                reason,
            }),
        }
    }

    info!("Loaded {} of {} package records from {:?}", packages.len(), total, file_path);
    Ok(packages)
}

/// Loads one advisory file
pub fn load_advisory_file<P: AsRef<Path>>(file_path: P) -> Result<VulnerabilityRecord> {
    let file_path = file_path.as_ref();
    let document = read_document(file_path)?;
    serde_json::from_value(document)
        .with_context(|| format!("Failed to parse advisory from: {:?}", file_path))
}

/// Loads every `*.json` advisory under `path` (a directory walked recursively, or a single file).
///
/// Files that cannot be read or parsed are reported and skipped.
pub fn load_advisories<P: AsRef<Path>>(
    path: P,
    reporter: &dyn SkipReporter,
) -> Result<Vec<VulnerabilityRecord>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(anyhow::anyhow!("Advisory path does not exist: {:?}", path));
    }

    let mut advisories = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                reporter.report(SkipEvent::MalformedRecord {
                    source: path.display().to_string(),
                    reason: e.to_string(),
                });
                continue;
            }
        };
        let is_json = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if !entry.file_type().is_file() || !is_json {
            continue;
        }

        match load_advisory_file(entry.path()) {
            Ok(advisory) => advisories.push(advisory),
            Err(e) => reporter.report(SkipEvent::MalformedRecord {
                source: entry.path().display().to_string(),
                reason: format!("{:#}", e),
            }),
        }
    }

    info!("Loaded {} advisories from {:?}", advisories.len(), path);
    Ok(advisories)
}
