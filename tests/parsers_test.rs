use std::fs::{self, File};
use std::io::Write;
use tempfile::tempdir;

use pypi_vuln_graph::parsers::{self, parse_dependency};
use pypi_vuln_graph::reporting::{CollectingReporter, SkipEvent};

#[test]
fn test_parse_constrained_dependency() {
    let requirement = parse_dependency("foo (>=1.0)").unwrap();
    assert_eq!(requirement.name, "foo");
    assert_eq!(requirement.constraint, "(>=1.0)");
    assert_eq!(requirement.version_spec.as_deref(), Some(">=1.0"));
    assert!(!requirement.is_unconstrained());
}

#[test]
fn test_parse_bare_dependency() {
    let requirement = parse_dependency("  Requests ").unwrap();
    assert_eq!(requirement.name, "requests");
    assert!(requirement.is_unconstrained());
    assert!(requirement.extras.is_empty());
    assert_eq!(requirement.version_spec, None);
    assert_eq!(requirement.marker, None);
}

#[test]
fn test_parse_extras_and_marker() {
    let requirement =
        parse_dependency("urllib3[socks, secure] (<3,>=1.21.1) ; extra == 'socks'").unwrap();
    assert_eq!(requirement.name, "urllib3");
    assert_eq!(requirement.extras, vec!["socks", "secure"]);
    assert_eq!(requirement.version_spec.as_deref(), Some("<3,>=1.21.1"));
    assert_eq!(requirement.marker.as_deref(), Some("extra == 'socks'"));
}

#[test]
fn test_parse_unparsable_dependency() {
    assert!(parse_dependency("!!!").is_none());
    assert!(parse_dependency("").is_none());
}

#[test]
fn test_load_package_records() {
    let dir = tempdir().unwrap();
    let file_path = dir.path().join("packages.json");

    let json_content = r#"[
  {
    "name": "Requests",
    "version": "2.31.0",
    "require_python": ">=3.7",
    "require_dist": ["urllib3 (<3,>=1.21.1)", "idna"],
    "package_vulnerabilities": [
      {"id": "PYSEC-2023-74", "aliases": ["CVE-2023-32681"], "summary": null, "fixed_in": ["2.31.0"]}
    ],
    "last_serial": 18575033,
    "historically_num_of_vulnerabilities": 7
  },
  {"name": "idna", "version": "3.4", "require_python": null, "require_dist": null, "package_vulnerabilities": []},
  {"name": "", "version": "1.0"},
  {"name": "nover", "version": null},
  "not a record",
  {"name": "requests", "version": "2.32.0"}
]"#;

    let mut file = File::create(&file_path).unwrap();
    file.write_all(json_content.as_bytes()).unwrap();

    let reporter = CollectingReporter::new();
    let packages = parsers::load_package_records(&file_path, &reporter).unwrap();

    assert_eq!(packages.len(), 2);
    let names: Vec<_> = packages.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["requests", "idna"]);

    // The later duplicate replaces the first record in place.
    let requests = packages.get("requests").unwrap();
    assert_eq!(requests.version.as_deref(), Some("2.32.0"));

    let idna = packages.get("idna").unwrap();
    assert!(idna.require_dist.is_empty());
    assert_eq!(idna.require_python, None);

    let malformed = reporter
        .events()
        .into_iter()
        .filter(|event| matches!(event, SkipEvent::MalformedRecord { .. }))
        .count();
    assert_eq!(malformed, 3);
}

#[test]
fn test_load_package_record_fields() {
    let dir = tempdir().unwrap();
    let file_path = dir.path().join("packages.json");
    fs::write(
        &file_path,
        r#"[{"name": "jinja2", "version": "3.1.2", "require_dist": ["MarkupSafe (>=2.0)"],
            "package_vulnerabilities": [{"id": "GHSA-h5c8-rqwp-cp95", "aliases": null}],
            "last_serial": 42}]"#,
    )
    .unwrap();

    let packages = parsers::load_package_records(&file_path, &CollectingReporter::new()).unwrap();
    let jinja = packages.get("jinja2").unwrap();
    assert_eq!(jinja.require_dist, vec!["MarkupSafe (>=2.0)"]);
    assert_eq!(jinja.package_vulnerabilities[0].id, "GHSA-h5c8-rqwp-cp95");
    assert!(jinja.package_vulnerabilities[0].aliases.is_empty());
    assert_eq!(jinja.last_serial, Some(42));
}

#[test]
fn test_load_package_records_yaml() {
    let dir = tempdir().unwrap();
    let file_path = dir.path().join("packages.yml");

    let yaml_content = r#"- name: flask
  version: "2.3.2"
  require_python: ">=3.8"
  require_dist:
    - werkzeug
    - click (>=8.1.3)
- name: werkzeug
  version: "2.3.6"
"#;
    let mut file = File::create(&file_path).unwrap();
    file.write_all(yaml_content.as_bytes()).unwrap();

    let packages = parsers::load_package_records(&file_path, &CollectingReporter::new()).unwrap();
    assert_eq!(packages.len(), 2);
    assert_eq!(packages.get("flask").unwrap().require_dist.len(), 2);
}

#[test]
fn test_load_package_records_errors() {
    let dir = tempdir().unwrap();
    let reporter = CollectingReporter::new();

    let missing = parsers::load_package_records(dir.path().join("missing.json"), &reporter);
    assert!(missing.is_err());

    let not_a_list = dir.path().join("object.json");
    fs::write(&not_a_list, r#"{"name": "a"}"#).unwrap();
    assert!(parsers::load_package_records(&not_a_list, &reporter).is_err());
}

#[test]
fn test_load_advisories_directory() {
    let dir = tempdir().unwrap();
    let nested = dir.path().join("pypi").join("requests");
    fs::create_dir_all(&nested).unwrap();

    fs::write(
        dir.path().join("PYSEC-2023-74.json"),
        r#"{"id": "PYSEC-2023-74", "aliases": ["GHSA-j8r2-6x86-q33q"],
            "affected": [{"package": {"name": "requests", "ecosystem": "PyPI"}}]}"#,
    )
    .unwrap();
    fs::write(
        nested.join("GHSA-j8r2-6x86-q33q.json"),
        r#"{"id": "GHSA-j8r2-6x86-q33q", "affected": [{"package": {"name": "requests"}}],
            "database_specific": {"severity": "MODERATE"}}"#,
    )
    .unwrap();
    fs::write(nested.join("README.md"), "not an advisory").unwrap();
    fs::write(nested.join("broken.json"), "{ not json").unwrap();

    let reporter = CollectingReporter::new();
    let advisories = parsers::load_advisories(dir.path(), &reporter).unwrap();

    assert_eq!(advisories.len(), 2);
    let ids: Vec<_> = advisories.iter().map(|a| a.id.as_str()).collect();
    assert!(ids.contains(&"PYSEC-2023-74"));
    assert!(ids.contains(&"GHSA-j8r2-6x86-q33q"));
    assert_eq!(reporter.events().len(), 1);

    assert!(parsers::load_advisories(dir.path().join("nope"), &reporter).is_err());
}

#[test]
fn test_load_single_advisory_file() {
    let dir = tempdir().unwrap();
    let file_path = dir.path().join("advisory.json");
    fs::write(
        &file_path,
        r#"{"id": "PYSEC-1", "affected": [{"package": {"name": "a"}}, {"ranges": []}]}"#,
    )
    .unwrap();

    let advisory = parsers::load_advisory_file(&file_path).unwrap();
    assert_eq!(advisory.affected_packages().collect::<Vec<_>>(), vec!["a"]);
}
