use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, warn};
use std::fmt;
use std::sync::Mutex;

/// Something that was left out of the graph or the loaded snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipEvent {
    /// A package or advisory record could not be used
    MalformedRecord { source: String, reason: String },
    /// A `Requires-Dist` entry has no leading package name
    UnparsableDependency { package: String, raw: String },
    /// A dependency carries a version/extras/marker suffix and gets no edge
    ConstrainedDependency { package: String, raw: String },
    /// A `Requires-Python` specifier could not be parsed
    UnparsableVersion { specifier: String, reason: String },
    /// The two packages' Python requirements do not overlap
    IncompatiblePython {
        package: String,
        dependency: String,
        package_requirement: String,
        dependency_requirement: String,
    },
}

impl fmt::Display for SkipEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipEvent::MalformedRecord { source, reason } => {
                write!(f, "skipping malformed record {}: {}", source, reason)
            }
            SkipEvent::UnparsableDependency { package, raw } => {
                write!(f, "failed to parse dependency {:?} of {}", raw, package)
            }
            SkipEvent::ConstrainedDependency { package, raw } => {
                write!(f, "constrained dependency {:?} of {} produces no edge", raw, package)
            }
            SkipEvent::UnparsableVersion { specifier, reason } => {
                write!(f, "cannot parse version specifier {:?}: {}", specifier, reason)
            }
            SkipEvent::IncompatiblePython {
                package,
                dependency,
                package_requirement,
                dependency_requirement,
            } => write!(
                f,
                "{} ({}) and {} ({}) share no Python version",
                package, package_requirement, dependency, dependency_requirement
            ),
        }
    }
}

/// Receives records and dependencies that were skipped during loading or graph construction
pub trait SkipReporter: Send + Sync {
    fn report(&self, event: SkipEvent);
}

/// Forwards skip events to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl SkipReporter for LogReporter {
    fn report(&self, event: SkipEvent) {
        match event {
            SkipEvent::ConstrainedDependency { .. } | SkipEvent::IncompatiblePython { .. } => {
                debug!("{}", event)
            }
            _ => warn!("{}", event),
        }
    }
}

/// Keeps every skip event in memory
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<SkipEvent>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SkipEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl SkipReporter for CollectingReporter {
    fn report(&self, event: SkipEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Create a progress bar for the analysis pipeline
pub fn create_progress_bar(len: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] {msg} [{wide_bar:.cyan/blue}] {pos}/{len}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(message.to_string());
    pb
}
