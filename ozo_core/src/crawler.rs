//! Crawl the upstream hierarchy and turn every house into a calendar artifact.
//!
//! The crawl runs in two phases, each a bounded pool of workers: first the houses of every
//! street are listed, then the schedule of every house is fetched and written. The second
//! phase only starts once the first one has drained. A failing worker costs its own result
//! and nothing else.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::Result;
use futures::stream::{self, StreamExt};

use crate::{
    calendar::{artifact_path, build_calendar, title, write_artifact, CHANGED_FORMAT},
    catalog::{Catalog, CatalogRecord},
    config::GeneratorConfig,
    error::GeneratorError,
    hierarchy::{
        dedup_houses, list_districts, list_houses, list_municipalities, list_streets,
        select_municipalities, House, StreetPath,
    },
    upstream_client::{QueryParams, Upstream},
};

const PROGRESS_EVERY: usize = 50;

/// What a finished run produced.
#[derive(Debug)]
pub struct RunSummary {
    pub catalog: Catalog,
    /// Number of distinct houses discovered.
    pub houses: usize,
    pub elapsed: Duration,
}

pub struct Crawler {
    upstream: Arc<dyn Upstream>,
    config: GeneratorConfig,
    changed: Arc<str>,
}

impl Crawler {
    /// Create a crawler stamping its events with the current UTC time.
    pub fn new(upstream: Arc<dyn Upstream>, config: GeneratorConfig) -> Self {
        let changed = chrono::Utc::now().format(CHANGED_FORMAT).to_string();
        Self {
            upstream,
            config,
            changed: Arc::from(changed),
        }
    }

    /// Use a fixed `DTSTAMP` instead of the current time.
    pub fn with_changed(mut self, changed: &str) -> Self {
        self.changed = Arc::from(changed);
        self
    }

    /// Run the whole crawl and write the catalog.
    pub async fn run(&self) -> Result<RunSummary> {
        let started = Instant::now();
        let streets = self.discover_streets().await?;
        log::info!("discovered {} streets", streets.len());
        let houses = self.resolve_houses(streets).await;
        log::info!("discovered {} houses", houses.len());
        let house_count = houses.len();
        let records = self.fetch_calendars(houses).await;
        let catalog = Catalog::assemble(records);
        catalog.write(&self.config.index_path).await?;
        Ok(RunSummary {
            catalog,
            houses: house_count,
            elapsed: started.elapsed(),
        })
    }

    /// Walk municipalities, districts and streets.
    async fn discover_streets(&self) -> Result<Vec<StreetPath>, GeneratorError> {
        let upstream = self.upstream.as_ref();
        let municipalities = match list_municipalities(upstream).await {
            Ok(municipalities) => municipalities,
            Err(err) => {
                log::error!("{err}");
                return Err(err);
            }
        };
        let municipalities = select_municipalities(municipalities, &self.config.municipalities);
        let mut streets = vec![];
        for municipality in municipalities {
            log::info!("processing municipality {municipality}");
            for district in list_districts(upstream, &municipality).await {
                for street in list_streets(upstream, &municipality, &district).await {
                    streets.push(StreetPath {
                        municipality: municipality.clone(),
                        district: district.clone(),
                        street,
                    });
                }
            }
        }
        streets.sort();
        streets.dedup();
        Ok(streets)
    }

    /// List the houses of all streets concurrently.
    async fn resolve_houses(&self, streets: Vec<StreetPath>) -> Vec<House> {
        let total = streets.len();
        let mut workers = stream::iter(streets)
            .map(|street| {
                let upstream = Arc::clone(&self.upstream);
                tokio::spawn(async move { list_houses(upstream.as_ref(), &street).await })
            })
            .buffer_unordered(self.config.worker_count());
        let mut houses = vec![];
        let mut done = 0;
        while let Some(result) = workers.next().await {
            done += 1;
            match result {
                Ok(found) => houses.extend(found),
                Err(err) => log::debug!("house listing worker failed: {err}"),
            }
            report_progress("streets", done, total);
        }
        dedup_houses(houses)
    }

    /// Fetch and write the calendars of all houses concurrently.
    async fn fetch_calendars(&self, houses: Vec<House>) -> Vec<CatalogRecord> {
        let total = houses.len();
        let mut workers = stream::iter(houses)
            .map(|house| {
                let upstream = Arc::clone(&self.upstream);
                let output_dir = self.config.output_dir.clone();
                let changed = Arc::clone(&self.changed);
                tokio::spawn(async move {
                    fetch_calendar(upstream.as_ref(), &output_dir, &changed, house).await
                })
            })
            .buffer_unordered(self.config.worker_count());
        let mut records = vec![];
        let mut done = 0;
        while let Some(result) = workers.next().await {
            done += 1;
            match result {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(err) => log::debug!("calendar worker failed: {err}"),
            }
            report_progress("houses", done, total);
        }
        records
    }
}

/// Fetch the schedule of one house and write its calendar.
///
/// Returns `None` if the house has no schedule or its artifact could not be written.
pub async fn fetch_calendar(
    upstream: &dyn Upstream,
    output_dir: &str,
    changed: &str,
    house: House,
) -> Option<CatalogRecord> {
    let params = QueryParams::schedule(&house.district, &house.street, &house.reference);
    let schedule = upstream
        .query(&params)
        .await
        .ok()?
        .into_map()
        .filter(|schedule| !schedule.is_empty())?;
    let path = artifact_path(output_dir, &house);
    let calendar = build_calendar(&title(&house), &path, &schedule, changed);
    if let Err(err) = write_artifact(&path, &calendar).await {
        log::debug!("could not write {path}: {err}");
        return None;
    }
    Some(CatalogRecord::new(&house, path))
}

fn report_progress(phase: &str, done: usize, total: usize) {
    if done % PROGRESS_EVERY == 0 || done == total {
        log::info!("{phase}: {done}/{total}");
    }
}

#[cfg(test)]
mod tests {
    use std::{
        path::Path,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    use async_trait::async_trait;

    use crate::{
        config::GeneratorConfig,
        crawler::{fetch_calendar, Crawler},
        error::{Absent, GeneratorError},
        hierarchy::House,
        upstream_client::{fake::FakeUpstream, Payload, QueryParams, Upstream},
    };

    static CHANGED: &str = "20240301T120000Z";

    /// Answers like the wrapped upstream, a bit slower, and records how many queries overlap.
    struct CountingUpstream {
        inner: FakeUpstream,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl CountingUpstream {
        fn new(inner: FakeUpstream) -> Self {
            Self {
                inner,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Upstream for CountingUpstream {
        async fn query(&self, params: &QueryParams) -> Result<Payload, Absent> {
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(running, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            let result = self.inner.query(params).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    /// Two municipalities; only Ostrava is crawled in most tests.
    ///
    /// District B has no streets, house 14 has no schedule and house 16 answers with
    /// diagnostics. Houses h1 and h1b share the reference code 12.
    fn upstream() -> FakeUpstream {
        FakeUpstream::default()
            .with(
                QueryParams::init(),
                r#"{"obce": {"Ostrava": {}, "Brno": {}}}"#,
            )
            .with(QueryParams::districts("Ostrava"), r#"{"B": {}, "A": {}}"#)
            .with(QueryParams::districts("Brno"), r#"["Z"]"#)
            .with(
                QueryParams::streets("Ostrava", "A"),
                r#"{"1": "Hlavní", "2": "Nová"}"#,
            )
            .with(QueryParams::streets("Ostrava", "B"), "{}")
            .with(QueryParams::streets("Brno", "Z"), r#"["Dlouhá"]"#)
            .with(
                QueryParams::houses("Ostrava", "A", "Hlavní"),
                r#"{"h1": {"ov": "12"}, "h1b": {"ov": "12"}, "h2": {"ov": "14"}}"#,
            )
            .with(
                QueryParams::houses("Ostrava", "A", "Nová"),
                r#"{"h3": {"ov": "16"}}"#,
            )
            .with(QueryParams::houses("Ostrava", "B", "B"), r#"{"h4": {}}"#)
            .with(QueryParams::houses("Brno", "Z", "Dlouhá"), r#"{"h5": {"ov": "1"}}"#)
            .with(
                QueryParams::schedule("A", "Hlavní", "12"),
                r#"{"2024-03-15": {"bio": {}, "plasty": {}}, "2024-12-25": ["Vánoce"]}"#,
            )
            .with(QueryParams::schedule("A", "Hlavní", "14"), "[]")
            .with(QueryParams::schedule("A", "Nová", "16"), "Warning: undefined index")
            .with(QueryParams::schedule("B", "B", "h4"), r#"{"2024-03-16": ["sklo"]}"#)
            .with(QueryParams::schedule("Z", "Dlouhá", "1"), r#"{"2024-03-17": ["bio"]}"#)
    }

    fn config(root: &Path, municipalities: &[&str]) -> GeneratorConfig {
        GeneratorConfig {
            municipalities: municipalities.iter().map(|name| name.to_string()).collect(),
            workers: 3,
            output_dir: format!("{}/kalendare", root.display()),
            index_path: format!("{}/index.json", root.display()),
            ..GeneratorConfig::default()
        }
    }

    #[tokio::test]
    async fn test_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), &["Ostrava"]);
        let crawler = Crawler::new(Arc::new(upstream()), config.clone()).with_changed(CHANGED);
        let summary = crawler.run().await.unwrap();
        assert_eq!(summary.houses, 4);
        let produced: Vec<(&str, &str, &str, &str)> = summary
            .catalog
            .records()
            .iter()
            .map(|record| {
                (
                    record.municipality.as_str(),
                    record.district.as_str(),
                    record.street.as_str(),
                    record.reference.as_str(),
                )
            })
            .collect();
        assert_eq!(
            produced,
            vec![("Ostrava", "A", "Hlavní", "12"), ("Ostrava", "B", "B", "h4")]
        );
        let path = &summary.catalog.records()[0].path;
        assert_eq!(
            path,
            &format!("{}/ostrava/a/hlavni/12.ics", config.output_dir)
        );
        let ics = std::fs::read_to_string(path).unwrap();
        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 2);
        assert!(ics.contains("X-WR-CALNAME:Svoz Ostrava"));
        assert!(Path::new(&format!("{}/ostrava/b/b/h4.ics", config.output_dir)).exists());
        assert!(!Path::new(&format!("{}/ostrava/a/hlavni/14.ics", config.output_dir)).exists());
        assert!(!Path::new(&format!("{}/brno", config.output_dir)).exists());
        let index = std::fs::read_to_string(&config.index_path).unwrap();
        assert_eq!(index, summary.catalog.to_json().unwrap());
    }

    #[tokio::test]
    async fn test_run_is_reproducible() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), &[]);
        let crawler = Crawler::new(Arc::new(upstream()), config.clone()).with_changed(CHANGED);
        let first = crawler.run().await.unwrap();
        let first_ics = std::fs::read_to_string(&first.catalog.records()[0].path).unwrap();
        let first_index = std::fs::read_to_string(&config.index_path).unwrap();
        let second = crawler.run().await.unwrap();
        let second_ics = std::fs::read_to_string(&second.catalog.records()[0].path).unwrap();
        let second_index = std::fs::read_to_string(&config.index_path).unwrap();
        assert_eq!(first.catalog, second.catalog);
        assert_eq!(first.catalog.len(), 3);
        assert_eq!(first_ics, second_ics);
        assert_eq!(first_index, second_index);
    }

    #[tokio::test]
    async fn test_run_without_municipalities() {
        let dir = tempfile::tempdir().unwrap();
        let upstream = FakeUpstream::default().with(QueryParams::init(), "Notice: x");
        let crawler = Crawler::new(Arc::new(upstream), config(dir.path(), &[]));
        let err = crawler.run().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GeneratorError>(),
            Some(GeneratorError::NoMunicipalities)
        ));
        assert!(!dir.path().join("index.json").exists());
    }

    #[tokio::test]
    async fn test_run_with_unknown_municipality() {
        let dir = tempfile::tempdir().unwrap();
        let crawler = Crawler::new(Arc::new(upstream()), config(dir.path(), &["Praha"]));
        let summary = crawler.run().await.unwrap();
        assert!(summary.catalog.is_empty());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("index.json")).unwrap(),
            "[]"
        );
    }

    #[tokio::test]
    async fn test_run_respects_worker_count() {
        let dir = tempfile::tempdir().unwrap();
        let houses: Vec<String> = (0..20)
            .map(|number| format!(r#""h{number}": {{"ov": "{number}"}}"#))
            .collect();
        let mut fake = FakeUpstream::default()
            .with(QueryParams::init(), r#"{"obce": {"Ostrava": {}}}"#)
            .with(QueryParams::districts("Ostrava"), r#"["A"]"#)
            .with(QueryParams::streets("Ostrava", "A"), r#"["Hlavní"]"#)
            .with(
                QueryParams::houses("Ostrava", "A", "Hlavní"),
                &format!("{{{}}}", houses.join(", ")),
            );
        for number in 0..20 {
            fake = fake.with(
                QueryParams::schedule("A", "Hlavní", &number.to_string()),
                r#"{"2024-03-15": ["bio"]}"#,
            );
        }
        let upstream = Arc::new(CountingUpstream::new(fake));
        let config = config(dir.path(), &[]);
        let crawler = Crawler::new(upstream.clone(), config).with_changed(CHANGED);
        let summary = crawler.run().await.unwrap();
        assert_eq!(summary.catalog.len(), 20);
        let peak = upstream.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "{peak} queries overlapped");
        assert!(peak > 1, "queries never overlapped");
    }

    #[tokio::test]
    async fn test_run_survives_unwritable_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), &["Ostrava"]);
        // A plain file where the directory of Hlavní 12 belongs.
        let blocker = format!("{}/ostrava/a/hlavni", config.output_dir);
        std::fs::create_dir_all(Path::new(&blocker).parent().unwrap()).unwrap();
        std::fs::write(&blocker, "").unwrap();
        let crawler = Crawler::new(Arc::new(upstream()), config.clone()).with_changed(CHANGED);
        let summary = crawler.run().await.unwrap();
        let produced: Vec<(&str, &str)> = summary
            .catalog
            .records()
            .iter()
            .map(|record| (record.street.as_str(), record.reference.as_str()))
            .collect();
        assert_eq!(produced, vec![("B", "h4")]);
        assert!(Path::new(&format!("{}/ostrava/b/b/h4.ics", config.output_dir)).exists());
        let index = std::fs::read_to_string(&config.index_path).unwrap();
        assert_eq!(index, summary.catalog.to_json().unwrap());
    }

    #[tokio::test]
    async fn test_fetch_calendar_without_schedule() {
        let dir = tempfile::tempdir().unwrap();
        let output_dir = dir.path().display().to_string();
        let house = House {
            municipality: String::from("Ostrava"),
            district: String::from("A"),
            street: String::from("Nová"),
            reference: String::from("16"),
            id: String::from("h3"),
        };
        let record = fetch_calendar(&upstream(), &output_dir, CHANGED, house).await;
        assert!(record.is_none());
    }
}
