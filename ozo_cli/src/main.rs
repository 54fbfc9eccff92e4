use std::{sync::Arc, time::Duration};

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;
use ozo_core::{
    config::{
        GeneratorConfig, DEFAULT_ENDPOINT, DEFAULT_INDEX_PATH, DEFAULT_OUTPUT_DIR,
        DEFAULT_TIMEOUT, DEFAULT_WORKERS,
    },
    crawler::Crawler,
    upstream_client::HttpUpstream,
};

/// Generate an iCalendar file for every address served by OZO Ostrava.
#[derive(Debug, Parser)]
pub struct Arguments {
    /// only crawl these municipalities (repeatable, all if omitted)
    #[arg(long = "municipality", env = "OZO_MUNICIPALITIES", value_delimiter = ',')]
    pub municipalities: Vec<String>,
    /// the number of concurrent requests
    #[arg(long, env = "OZO_WORKERS", default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,
    /// the timeout of a single request in seconds
    #[arg(long, env = "OZO_TIMEOUT", default_value_t = DEFAULT_TIMEOUT.as_secs())]
    pub timeout: u64,
    /// the directory receiving the calendar files
    #[arg(long, env = "OZO_OUTPUT_DIR", default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: String,
    /// the file receiving the index of all calendar files
    #[arg(long, env = "OZO_INDEX", default_value = DEFAULT_INDEX_PATH)]
    pub index: String,
    /// the upstream endpoint
    #[arg(long, env = "OZO_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,
}

impl From<&Arguments> for GeneratorConfig {
    fn from(value: &Arguments) -> Self {
        GeneratorConfig {
            endpoint: value.endpoint.clone(),
            municipalities: value.municipalities.clone(),
            workers: value.workers,
            timeout: Duration::from_secs(value.timeout),
            output_dir: value.output_dir.clone(),
            index_path: value.index.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();
    let args = Arguments::parse();
    let config = GeneratorConfig::from(&args);
    let upstream = HttpUpstream::new(&config)?;
    let crawler = Crawler::new(Arc::new(upstream), config.clone());
    let summary = crawler.run().await?;
    log::info!(
        "generated {} calendars for {} houses in {:.1?}",
        summary.catalog.len(),
        summary.houses,
        summary.elapsed
    );
    log::info!("calendars written to {}/", config.output_dir);
    log::info!("index written to {}", config.index_path);
    Ok(())
}
