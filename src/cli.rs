use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::exporters::ExportFormat;
use crate::metrics::MetricKind;

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[clap(name = "json")]
    Json,
    #[clap(name = "yaml")]
    Yaml,
    #[clap(name = "csv")]
    Csv,
    #[clap(name = "text")]
    Text,
}

impl From<OutputFormat> for ExportFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Json => ExportFormat::Json,
            OutputFormat::Yaml => ExportFormat::Yaml,
            OutputFormat::Csv => ExportFormat::Csv,
            OutputFormat::Text => ExportFormat::Text,
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "pypi-vuln-graph",
    version,
    about = "Measure how vulnerabilities propagate through a package dependency graph",
    long_about = "Builds a directed dependency graph from a package metadata snapshot, marks packages with known vulnerabilities, and computes structural and propagation metrics over it."
)]
pub struct Cli {
    /// Metrics to compute
    #[clap(value_enum, required = true)]
    pub metrics: Vec<MetricKind>,

    /// Path to the package metadata snapshot (JSON or YAML array of package records)
    #[clap(short, long)]
    pub input_file: PathBuf,

    /// Directory of OSV advisory JSON files merged into the vulnerability index
    #[clap(short, long)]
    pub advisories: Option<PathBuf>,

    /// Seed packages for percentage_of_network_reached
    #[clap(short, long, value_delimiter = ',')]
    pub subset: Vec<String>,

    /// Use the first N packages as seeds when --subset is not given
    #[clap(long)]
    pub subset_size: Option<usize>,

    /// Start package for longest_path (defaults to the first seed)
    #[clap(long)]
    pub start_node: Option<String>,

    /// Output file path
    #[clap(short, long, default_value = "metrics_results.json")]
    pub output_file: PathBuf,

    /// Format for the results (json, yaml, csv, text); guessed from the output file extension when omitted
    #[clap(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Also write the dependency graph in DOT format to this path
    #[clap(short, long)]
    pub dot_output: Option<PathBuf>,

    /// Number of worker threads (defaults to the number of CPUs)
    #[clap(short, long)]
    pub jobs: Option<usize>,
}

impl Cli {
    /// Worker thread count, at least one
    pub fn thread_count(&self) -> usize {
        self.jobs.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Explicit `--format`, else the output file extension, else JSON
    pub fn export_format(&self) -> ExportFormat {
        self.format
            .map(ExportFormat::from)
            .or_else(|| ExportFormat::from_path(&self.output_file))
            .unwrap_or(ExportFormat::Json)
    }
}
