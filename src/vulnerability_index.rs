use log::{debug, info};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::models::{AffectedEntry, PackageSet, VulnerabilityRecord};

/// Mapping from lowercase package name to the advisories affecting it
#[derive(Debug, Clone, Default)]
pub struct VulnerabilityIndex {
    by_package: HashMap<String, Vec<Arc<VulnerabilityRecord>>>,
}

impl VulnerabilityIndex {
    /// Builds the index from an advisory corpus.
    ///
    /// Each advisory is appended to the bucket of every package named in its
    /// `affected` entries, in order. An advisory naming the same package twice
    /// lands in that bucket twice; consumers count distinct ids.
    pub fn build<I>(advisories: I) -> Self
    where
        I: IntoIterator<Item = VulnerabilityRecord>,
    {
        let mut by_package: HashMap<String, Vec<Arc<VulnerabilityRecord>>> = HashMap::new();
        let mut advisory_count = 0usize;

        for advisory in advisories {
            advisory_count += 1;
            let advisory = Arc::new(advisory);
            for package in advisory.affected_packages() {
                by_package
                    .entry(package.to_lowercase())
                    .or_default()
                    .push(Arc::clone(&advisory));
            }
        }

        info!(
            "Indexed {} advisories affecting {} packages",
            advisory_count,
            by_package.len()
        );
        VulnerabilityIndex { by_package }
    }

    /// Advisories affecting `package`, in insertion order
    pub fn lookup(&self, package: &str) -> &[Arc<VulnerabilityRecord>] {
        self.by_package
            .get(&package.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Distinct advisory ids affecting `package`
    pub fn vulnerability_ids(&self, package: &str) -> BTreeSet<String> {
        self.lookup(package)
            .iter()
            .map(|record| record.id.clone())
            .collect()
    }

    pub fn is_vulnerable(&self, package: &str) -> bool {
        !self.lookup(package).is_empty()
    }

    /// Number of packages with at least one advisory
    pub fn package_count(&self) -> usize {
        self.by_package.len()
    }
}

/// Turns the vulnerabilities attached to each package record into advisories affecting that package
pub fn advisories_from_packages(packages: &PackageSet) -> Vec<VulnerabilityRecord> {
    packages
        .iter()
        .flat_map(|package| {
            package
                .package_vulnerabilities
                .iter()
                .map(move |vulnerability| VulnerabilityRecord {
                    id: vulnerability.id.clone(),
                    aliases: vulnerability.aliases.clone(),
                    affected: vec![AffectedEntry::for_package(&package.name)],
                    database_specific: None,
                })
        })
        .collect()
}

/// Fills in `database_specific` details from the records each advisory lists as an alias.
///
/// Keys already present on a record are kept.
pub fn merge_alias_details(records: &mut [VulnerabilityRecord]) {
    let details: HashMap<String, serde_json::Map<String, Value>> = records
        .iter()
        .filter_map(|record| match &record.database_specific {
            Some(Value::Object(map)) => Some((record.id.clone(), map.clone())),
            _ => None,
        })
        .collect();
    if details.is_empty() {
        return;
    }

    let mut merged = 0usize;
    for record in records.iter_mut() {
        for alias in &record.aliases {
            let Some(alias_details) = details.get(alias) else {
                continue;
            };
            let target = record
                .database_specific
                .get_or_insert_with(|| Value::Object(serde_json::Map::new()));
            let Value::Object(target) = target else {
                debug!("{} has non-object details; alias {} not merged", record.id, alias);
                continue;
            };
            for (key, value) in alias_details {
                target.entry(key.clone()).or_insert_with(|| value.clone());
            }
            merged += 1;
        }
    }
    debug!("Merged details from {} alias records", merged);
}
