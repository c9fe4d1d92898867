use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{debug, info};
use std::time::Instant;

use pypi_vuln_graph::cli::Cli;
use pypi_vuln_graph::exporters;
use pypi_vuln_graph::graph::GraphBuilder;
use pypi_vuln_graph::metrics::{self, MetricContext};
use pypi_vuln_graph::parsers;
use pypi_vuln_graph::reporting::{create_progress_bar, LogReporter};
use pypi_vuln_graph::vulnerability_index::{self, VulnerabilityIndex};

fn main() -> Result<()> {
    let start_time = Instant::now();

    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    info!("Starting pypi-vuln-graph v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    debug!("Parsed command-line arguments: {:?}", cli);

    rayon::ThreadPoolBuilder::new()
        .num_threads(cli.thread_count())
        .build_global()
        .context("Failed to configure the worker thread pool")?;

    let reporter = LogReporter;
    let pb = create_progress_bar(100, "Loading package snapshot...");
    pb.set_position(0);

    let packages = parsers::load_package_records(&cli.input_file, &reporter)
        .with_context(|| format!("Failed to load package snapshot: {:?}", cli.input_file))?;
    pb.set_position(20);

    pb.set_message("Indexing vulnerabilities...");
    let mut advisories = vulnerability_index::advisories_from_packages(&packages);
    if let Some(path) = &cli.advisories {
        let loaded = parsers::load_advisories(path, &reporter)
            .with_context(|| format!("Failed to load advisories from: {:?}", path))?;
        advisories.extend(loaded);
    }
    vulnerability_index::merge_alias_details(&mut advisories);
    let index = VulnerabilityIndex::build(advisories);
    pb.set_position(40);

    pb.set_message("Building dependency graph...");
    let (graph, stats) = GraphBuilder::new(&packages, &index)
        .with_reporter(&reporter)
        .build();
    debug!("Graph build stats: {:?}", stats);
    pb.set_position(60);

    if let Some(dot_path) = &cli.dot_output {
        graph
            .export_dot(dot_path)
            .with_context(|| format!("Failed to export dependency graph to: {:?}", dot_path))?;
        info!("Dependency graph saved to: {:?}", dot_path);
    }

    let subset: Vec<String> = if !cli.subset.is_empty() {
        cli.subset.iter().map(|seed| seed.trim().to_lowercase()).collect()
    } else if let Some(size) = cli.subset_size {
        graph
            .packages()
            .take(size)
            .map(|package| package.name.clone())
            .collect()
    } else {
        Vec::new()
    };
    let start_node = cli
        .start_node
        .as_ref()
        .map(|node| node.trim().to_lowercase())
        .or_else(|| subset.first().cloned());
    let ctx = MetricContext { subset, start_node };

    pb.set_message("Computing metrics...");
    let results = metrics::compute_metrics(&cli.metrics, &graph, &ctx)?;
    pb.set_position(90);

    pb.set_message("Exporting results...");
    let format = cli.export_format();
    debug!("Exporting results as {:?}", format);
    exporters::export_results(&results, format, Some(&cli.output_file))
        .with_context(|| "Failed to export results")?;
    pb.finish_with_message("Analysis complete!");

    info!("Results written to {:?}", cli.output_file);
    info!("Completed in {:.2?}", start_time.elapsed());
    Ok(())
}
