//! Static parameters of a generator run.

use std::time::Duration;

pub static DEFAULT_ENDPOINT: &str = "https://ozoostrava.cz/svoz2.php";
pub static DEFAULT_OUTPUT_DIR: &str = "kalendare";
pub static DEFAULT_INDEX_PATH: &str = "index.json";
pub const DEFAULT_WORKERS: usize = 8;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Everything a run needs to know before it starts.
///
/// Nothing in here changes while the run is in progress.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorConfig {
    /// The upstream query endpoint.
    pub endpoint: String,
    /// Only these municipalities are crawled; empty means all of them.
    pub municipalities: Vec<String>,
    /// Width of the worker pool and of the connection pool.
    pub workers: usize,
    /// Wall-clock limit for a single upstream query.
    pub timeout: Duration,
    /// Root directory of the calendar artifacts.
    pub output_dir: String,
    /// Location of the catalog document.
    pub index_path: String,
}

impl GeneratorConfig {
    /// The worker count, never below one.
    pub fn worker_count(&self) -> usize {
        self.workers.max(1)
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            endpoint: String::from(DEFAULT_ENDPOINT),
            municipalities: vec![],
            workers: DEFAULT_WORKERS,
            timeout: DEFAULT_TIMEOUT,
            output_dir: String::from(DEFAULT_OUTPUT_DIR),
            index_path: String::from(DEFAULT_INDEX_PATH),
        }
    }
}
