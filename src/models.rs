use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Treats an explicit JSON `null` the same as a missing list.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A vulnerability attached directly to a package release in the PyPI metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageVulnerability {
    /// Advisory identifier, e.g. "PYSEC-2021-66"
    pub id: String,
    /// Other identifiers for the same advisory (CVE, GHSA, ...)
    #[serde(default, deserialize_with = "null_as_empty")]
    pub aliases: Vec<String>,
    /// One-line summary, if the source provides one
    #[serde(default)]
    pub summary: Option<String>,
    /// Free-form description
    #[serde(default)]
    pub details: Option<String>,
    /// Versions that fix the vulnerability
    #[serde(default, deserialize_with = "null_as_empty")]
    pub fixed_in: Vec<String>,
    /// Link to the advisory
    #[serde(default)]
    pub link: Option<String>,
}

/// One package snapshot record as produced by the dataset step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageRecord {
    /// Package name, lowercased once the record is accepted
    pub name: String,
    /// Version the record describes (the latest release)
    #[serde(default)]
    pub version: Option<String>,
    /// Declared `Requires-Python` specifier
    #[serde(default)]
    pub require_python: Option<String>,
    /// Raw `Requires-Dist` strings, in declaration order
    #[serde(default, deserialize_with = "null_as_empty")]
    pub require_dist: Vec<String>,
    /// Vulnerabilities affecting this release
    #[serde(default, deserialize_with = "null_as_empty")]
    pub package_vulnerabilities: Vec<PackageVulnerability>,
    /// PyPI serial of the release
    #[serde(default)]
    pub last_serial: Option<u64>,
    /// Distinct vulnerability ids across all releases of the package
    #[serde(default)]
    pub historically_num_of_vulnerabilities: Option<u64>,
}

impl PackageRecord {
    /// Creates an empty record for the given name
    pub fn new(name: &str) -> Self {
        PackageRecord {
            name: name.to_lowercase(),
            version: None,
            require_python: None,
            require_dist: Vec::new(),
            package_vulnerabilities: Vec::new(),
            last_serial: None,
            historically_num_of_vulnerabilities: None,
        }
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    pub fn with_python(mut self, requirement: &str) -> Self {
        self.require_python = Some(requirement.to_string());
        self
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.require_dist = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_vulnerability(mut self, id: &str) -> Self {
        self.package_vulnerabilities.push(PackageVulnerability {
            id: id.to_string(),
            aliases: Vec::new(),
            summary: None,
            details: None,
            fixed_in: Vec::new(),
            link: None,
        });
        self
    }
}

/// Packages keyed by lowercase name, iterated in first-insertion order
#[derive(Debug, Clone, Default)]
pub struct PackageSet {
    records: Vec<PackageRecord>,
    by_name: HashMap<String, usize>,
}

impl PackageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record, replacing (in place) any earlier record with the same name.
    /// Returns the replaced record.
    pub fn insert(&mut self, mut record: PackageRecord) -> Option<PackageRecord> {
        record.name = record.name.to_lowercase();
        match self.by_name.get(&record.name) {
            Some(&slot) => Some(std::mem::replace(&mut self.records[slot], record)),
            None => {
                self.by_name.insert(record.name.clone(), self.records.len());
                self.records.push(record);
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&PackageRecord> {
        self.by_name.get(name).map(|&slot| &self.records[slot])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PackageRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<PackageRecord> for PackageSet {
    fn from_iter<I: IntoIterator<Item = PackageRecord>>(iter: I) -> Self {
        let mut set = PackageSet::new();
        for record in iter {
            set.insert(record);
        }
        set
    }
}

/// Package reference inside an OSV `affected` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffectedPackageRef {
    pub name: String,
    #[serde(default)]
    pub ecosystem: Option<String>,
}

/// One `affected` entry of an advisory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffectedEntry {
    #[serde(default)]
    pub package: Option<AffectedPackageRef>,
}

impl AffectedEntry {
    pub fn for_package(name: &str) -> Self {
        AffectedEntry {
            package: Some(AffectedPackageRef {
                name: name.to_string(),
                ecosystem: Some("PyPI".to_string()),
            }),
        }
    }
}

/// An advisory describing one or more affected packages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VulnerabilityRecord {
    /// Advisory id
    pub id: String,
    /// Ids of the same advisory in other databases
    #[serde(default, deserialize_with = "null_as_empty")]
    pub aliases: Vec<String>,
    /// Affected packages
    #[serde(default, deserialize_with = "null_as_empty")]
    pub affected: Vec<AffectedEntry>,
    /// Source-specific details, possibly merged from alias records
    #[serde(default)]
    pub database_specific: Option<serde_json::Value>,
}

impl VulnerabilityRecord {
    pub fn new(id: &str, affected: &[&str]) -> Self {
        VulnerabilityRecord {
            id: id.to_string(),
            aliases: Vec::new(),
            affected: affected.iter().map(|name| AffectedEntry::for_package(name)).collect(),
            database_specific: None,
        }
    }

    /// Names of the affected packages, in entry order
    pub fn affected_packages(&self) -> impl Iterator<Item = &str> {
        self.affected
            .iter()
            .filter_map(|entry| entry.package.as_ref())
            .map(|package| package.name.as_str())
    }
}
