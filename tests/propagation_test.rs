use std::collections::{BTreeMap, BTreeSet};

use pypi_vuln_graph::error::AnalysisError;
use pypi_vuln_graph::graph::DependencyGraph;
use pypi_vuln_graph::models::{PackageRecord, PackageSet};
use pypi_vuln_graph::propagation;
use pypi_vuln_graph::vulnerability_index::{advisories_from_packages, VulnerabilityIndex};
use pypi_vuln_graph::build_dependency_graph;

/// Builds a graph from `(package, dependencies)` pairs; names in `vulnerable` get one advisory each
fn graph_from(edges: &[(&str, &[&str])], vulnerable: &[&str]) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    let ids = |name: &str| -> BTreeSet<String> {
        if vulnerable.contains(&name) {
            BTreeSet::from([format!("PYSEC-{}", name)])
        } else {
            BTreeSet::new()
        }
    };
    for (package, _) in edges {
        graph.add_package(package, ids(package));
    }
    for (package, dependencies) in edges {
        let from = graph.index_of(package).unwrap();
        for dependency in dependencies.iter() {
            let to = graph.add_package(dependency, ids(dependency));
            graph.add_dependency(from, to, None);
        }
    }
    graph
}

#[test]
fn test_single_vulnerable_dependency() {
    let graph = graph_from(&[("a", &["b"]), ("b", &[])], &["b"]);

    let counts = propagation::reachable_counts(&graph);
    assert_eq!(counts, BTreeMap::from([("a".to_string(), 1), ("b".to_string(), 0)]));

    let successors = propagation::vulnerability_successors(&graph);
    assert_eq!(successors.len(), 1);
    assert!(successors["b"].is_empty());

    let exposure = propagation::vulnerability_exposure(&graph);
    assert_eq!(exposure.reaching_vulnerable, vec!["a", "b"]);
    assert!(exposure.not_reaching_vulnerable.is_empty());
}

#[test]
fn test_cycle_terminates() {
    let graph = graph_from(&[("a", &["b"]), ("b", &["a"])], &[]);

    let counts = propagation::reachable_counts(&graph);
    assert_eq!(counts["a"], 1);
    assert_eq!(counts["b"], 1);
    assert_eq!(propagation::reachable_count(&graph, "a").unwrap(), 1);

    let longest = propagation::longest_path(&graph, "a").unwrap();
    assert_eq!(longest.length, 1);
    assert_eq!(longest.path, vec!["a", "b"]);

    let exposure = propagation::vulnerability_exposure(&graph);
    assert_eq!(exposure.not_reaching_vulnerable, vec!["a", "b"]);
}

#[test]
fn test_memoized_counts_match_fresh_traversals() {
    let graph = graph_from(
        &[
            ("a", &["b", "c"]),
            ("b", &["c", "d"]),
            ("c", &["b", "e"]),
            ("d", &[]),
            ("e", &["f"]),
            ("f", &["e"]),
            ("g", &["a"]),
        ],
        &[],
    );

    let counts = propagation::reachable_counts(&graph);
    assert_eq!(counts.len(), graph.node_count());
    for (package, count) in &counts {
        assert_eq!(
            propagation::reachable_count(&graph, package).unwrap(),
            *count,
            "count mismatch for {}",
            package
        );
    }
    assert_eq!(counts["g"], 6);
    assert_eq!(counts["b"], 4);
    assert_eq!(counts["d"], 0);
}

#[test]
fn test_counts_independent_of_input_order() {
    let forward: PackageSet = vec![
        PackageRecord::new("a").with_version("1").with_dependencies(["b"]),
        PackageRecord::new("b").with_version("1").with_dependencies(["c"]),
        PackageRecord::new("c").with_version("1").with_vulnerability("PYSEC-1"),
    ]
    .into_iter()
    .collect();
    let mut records: Vec<PackageRecord> = forward.iter().cloned().collect();
    records.reverse();
    let reversed: PackageSet = records.into_iter().collect();

    let build = |packages: &PackageSet| {
        let index = VulnerabilityIndex::build(advisories_from_packages(packages));
        build_dependency_graph(packages, &index)
    };
    let (first, second) = (build(&forward), build(&reversed));

    assert_eq!(
        propagation::reachable_counts(&first),
        propagation::reachable_counts(&second)
    );
    assert_eq!(
        propagation::vulnerability_successors(&first),
        propagation::vulnerability_successors(&second)
    );
}

#[test]
fn test_successors_only_for_vulnerable_packages() {
    let graph = graph_from(
        &[("a", &["b"]), ("b", &["c"]), ("c", &[]), ("d", &["a"])],
        &["b", "d"],
    );

    let successors = propagation::vulnerability_successors(&graph);
    let keys: Vec<_> = successors.keys().cloned().collect();
    assert_eq!(keys, vec!["b", "d"]);
    assert_eq!(successors["b"], BTreeSet::from(["c".to_string()]));
    assert_eq!(
        successors["d"],
        BTreeSet::from(["a".to_string(), "b".to_string(), "c".to_string()])
    );

    let exposure = propagation::vulnerability_exposure(&graph);
    assert_eq!(exposure.reaching_vulnerable, vec!["a", "b", "d"]);
    assert_eq!(exposure.not_reaching_vulnerable, vec!["c"]);
}

#[test]
fn test_network_reach_percentage() {
    let graph = graph_from(&[("a", &["b"]), ("b", &[]), ("c", &["d"]), ("d", &[])], &[]);

    let all: Vec<String> = graph.packages().map(|p| p.name.clone()).collect();
    assert_eq!(propagation::network_reach_percentage(&graph, &all).unwrap(), 1.0);
    assert_eq!(propagation::network_reach_percentage(&graph, &["a"]).unwrap(), 0.5);
    // Overlapping closures count once.
    assert_eq!(propagation::network_reach_percentage(&graph, &["a", "b"]).unwrap(), 0.5);

    assert_eq!(
        propagation::network_reach_percentage(&graph, &["a", "missing"]),
        Err(AnalysisError::UnknownSeed("missing".to_string()))
    );
}

#[test]
fn test_network_reach_on_empty_graph() {
    let graph = DependencyGraph::new();
    let result = propagation::network_reach_percentage::<&str>(&graph, &[]);
    assert_eq!(result, Err(AnalysisError::EmptyGraph));
}

#[test]
fn test_longest_path_prefers_first_maximal_branch() {
    let graph = graph_from(
        &[("a", &["b", "c"]), ("b", &["d"]), ("c", &["d"]), ("d", &[])],
        &[],
    );

    let longest = propagation::longest_path(&graph, "a").unwrap();
    assert_eq!(longest.start_node, "a");
    assert_eq!(longest.length, 2);
    assert_eq!(longest.path, vec!["a", "b", "d"]);
}

#[test]
fn test_longest_path_follows_longer_branch() {
    let graph = graph_from(&[("a", &["c", "b"]), ("b", &["c"]), ("c", &[])], &[]);

    let longest = propagation::longest_path(&graph, "a").unwrap();
    assert_eq!(longest.path, vec!["a", "b", "c"]);

    let leaf = propagation::longest_path(&graph, "c").unwrap();
    assert_eq!(leaf.length, 0);
    assert_eq!(leaf.path, vec!["c"]);
}

#[test]
fn test_unknown_start_node() {
    let graph = graph_from(&[("a", &[])], &[]);
    assert_eq!(
        propagation::longest_path(&graph, "zzz"),
        Err(AnalysisError::UnknownStartNode("zzz".to_string()))
    );
    assert!(propagation::reachable_count(&graph, "zzz")
        .unwrap_err()
        .is_input_validation());
}

/// `pkg0 -> pkg1 -> ... -> pkg{size-1}`, closed back to `pkg0` when `cyclic`
fn deep_graph(size: usize, cyclic: bool, vulnerable: usize) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    let nodes: Vec<_> = (0..size)
        .map(|i| {
            let ids = if i == vulnerable {
                BTreeSet::from(["PYSEC-deep".to_string()])
            } else {
                BTreeSet::new()
            };
            graph.add_package(&format!("pkg{}", i), ids)
        })
        .collect();
    for pair in nodes.windows(2) {
        graph.add_dependency(pair[0], pair[1], None);
    }
    if cyclic {
        graph.add_dependency(nodes[size - 1], nodes[0], None);
    }
    graph
}

#[test]
fn test_deep_cycle_does_not_exhaust_stack() {
    let size = 300_000;
    let graph = deep_graph(size, true, size / 2);

    let counts = propagation::reachable_counts(&graph);
    assert_eq!(counts.len(), size);
    assert!(counts.values().all(|&count| count == size - 1));

    let longest = propagation::longest_path(&graph, "pkg0").unwrap();
    assert_eq!(longest.length, size - 1);
    assert_eq!(longest.path.last().map(String::as_str), Some("pkg299999"));

    let exposure = propagation::vulnerability_exposure(&graph);
    assert_eq!(exposure.reaching_vulnerable.len(), size);

    assert_eq!(propagation::network_reach_percentage(&graph, &["pkg0"]).unwrap(), 1.0);
}

#[test]
fn test_deep_chain_does_not_exhaust_stack() {
    let size = 300_000;
    let graph = deep_graph(size, false, size - 1);

    assert_eq!(propagation::reachable_count(&graph, "pkg0").unwrap(), size - 1);

    let longest = propagation::longest_path(&graph, "pkg0").unwrap();
    assert_eq!(longest.length, size - 1);

    let exposure = propagation::vulnerability_exposure(&graph);
    assert_eq!(exposure.reaching_vulnerable.len(), size);
    assert!(exposure.not_reaching_vulnerable.is_empty());

    assert_eq!(propagation::network_reach_percentage(&graph, &["pkg0"]).unwrap(), 1.0);
    assert_eq!(
        propagation::network_reach_percentage(&graph, &["pkg299999"]).unwrap(),
        1.0 / size as f64
    );
}

#[test]
fn test_exposure_matches_per_node_check() {
    let graph = graph_from(
        &[
            ("a", &["b", "c"]),
            ("b", &["c", "d"]),
            ("c", &["b", "e"]),
            ("d", &[]),
            ("e", &["f"]),
            ("f", &["e"]),
            ("g", &["a"]),
            ("h", &["d"]),
        ],
        &["f"],
    );

    let exposure = propagation::vulnerability_exposure(&graph);
    for node in graph.node_indices() {
        let name = graph.name(node).to_string();
        assert_eq!(
            exposure.reaching_vulnerable.contains(&name),
            propagation::reaches_vulnerable(&graph, node),
            "exposure mismatch for {}",
            name
        );
    }
    assert_eq!(exposure.not_reaching_vulnerable, vec!["d", "h"]);
}
