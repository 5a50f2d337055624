//! Batch ingestion: list, drop already-stored files, then parse and persist
//! the rest on a bounded set of workers.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::db::{PersistOutcome, ReportStore};
use crate::models::ReportType;
use crate::parser::parse_report;
use crate::source::FileSource;

/// What happened to a single candidate file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Stored { records: u64 },
    /// Stored by someone else between the dedup read and the insert.
    AlreadyStored,
    /// Name matches no known interval report.
    Skipped,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub candidates: usize,
    pub already_processed: usize,
    pub stored: usize,
    pub records: u64,
    pub skipped: usize,
}

impl BatchSummary {
    fn record(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Stored { records } => {
                self.stored += 1;
                self.records += records;
            }
            FileOutcome::AlreadyStored => self.already_processed += 1,
            FileOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Routes files to the matching parser and hands reports to the store.
pub struct Ingestor<S, D> {
    source: S,
    store: D,
}

impl<S, D> Ingestor<S, D>
where
    S: FileSource + 'static,
    D: ReportStore + 'static,
{
    pub fn new(source: S, store: D) -> Self {
        Self { source, store }
    }

    /// Parses and persists one file. Files of unknown type are skipped
    /// without being retrieved.
    pub async fn ingest_file(&self, file_name: &str) -> anyhow::Result<FileOutcome> {
        let Some(kind) = ReportType::for_file(file_name) else {
            debug!(file = %file_name, "no report type matches, skipping");
            return Ok(FileOutcome::Skipped);
        };

        let contents = self
            .source
            .retrieve(file_name)
            .await
            .with_context(|| format!("failed to retrieve {file_name}"))?;
        let report = parse_report(kind, file_name, &contents)
            .with_context(|| format!("failed to parse {kind} report {file_name}"))?;

        match self.store.persist(&report).await? {
            PersistOutcome::Stored { records } => {
                info!(file = %file_name, report_type = %kind, records, "report ingested");
                Ok(FileOutcome::Stored { records })
            }
            PersistOutcome::AlreadyStored => {
                debug!(file = %file_name, "report stored by another run, nothing written");
                Ok(FileOutcome::AlreadyStored)
            }
        }
    }

    /// Runs a full batch. The first failing file aborts the batch; files
    /// committed before that stay stored and are skipped on the next run.
    pub async fn run(self: Arc<Self>, concurrency: usize) -> anyhow::Result<BatchSummary> {
        let candidates = self
            .source
            .list()
            .await
            .context("failed to list report files")?;
        let processed = self.store.processed_files().await?;
        let pending = pending_files(&candidates, &processed);

        info!(
            candidates = candidates.len(),
            pending = pending.len(),
            concurrency,
            "starting ingestion batch"
        );

        let mut summary = BatchSummary {
            candidates: candidates.len(),
            already_processed: candidates.len() - pending.len(),
            ..BatchSummary::default()
        };

        let outcomes = run_bounded(pending, concurrency, move |file_name| {
            let ingestor = Arc::clone(&self);
            async move { ingestor.ingest_file(&file_name).await }
        })
        .await?;

        for outcome in outcomes {
            summary.record(outcome);
        }
        Ok(summary)
    }
}

/// Candidates whose names are not already stored, in listing order.
pub fn pending_files(candidates: &[String], processed: &HashSet<String>) -> Vec<String> {
    candidates
        .iter()
        .filter(|name| !processed.contains(name.as_str()))
        .cloned()
        .collect()
}

/// Runs `work` for every item with at most `limit` in flight, submitting in
/// input order. Returns once every item has finished, or on the first error,
/// in which case workers still running are aborted and nothing further is
/// started.
pub async fn run_bounded<T, F, Fut, R>(
    items: Vec<T>,
    limit: usize,
    work: F,
) -> anyhow::Result<Vec<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
{
    let limit = limit.max(1);
    let mut workers = JoinSet::new();
    let mut results = Vec::with_capacity(items.len());

    for item in items {
        // A slot is free only once its worker's result has been checked.
        while workers.len() >= limit {
            if let Some(finished) = workers.join_next().await {
                results.push(finished.context("worker panicked")??);
            }
        }
        while let Some(finished) = workers.try_join_next() {
            results.push(finished.context("worker panicked")??);
        }
        workers.spawn(work(item));
    }

    while let Some(finished) = workers.join_next().await {
        results.push(finished.context("worker panicked")??);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Report;
    use crate::parser::fixtures::report_text;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct MemorySource {
        files: HashMap<String, String>,
        order: Vec<String>,
        retrieved: Mutex<Vec<String>>,
    }

    impl MemorySource {
        fn with(files: &[(&str, String)]) -> Self {
            Self {
                files: files
                    .iter()
                    .map(|(name, text)| (name.to_string(), text.clone()))
                    .collect(),
                order: files.iter().map(|(name, _)| name.to_string()).collect(),
                retrieved: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl FileSource for MemorySource {
        async fn list(&self) -> anyhow::Result<Vec<String>> {
            Ok(self.order.clone())
        }

        async fn retrieve(&self, file_name: &str) -> anyhow::Result<Vec<u8>> {
            self.retrieved.lock().unwrap().push(file_name.to_string());
            self.files
                .get(file_name)
                .map(|text| text.clone().into_bytes())
                .with_context(|| format!("no such file {file_name}"))
        }
    }

    /// Mirrors the relational store: a header either fails or commits with
    /// all of its rows.
    #[derive(Default)]
    struct MemoryStore {
        reports: Mutex<HashMap<String, usize>>,
        fail_header_for: Option<String>,
    }

    #[async_trait]
    impl ReportStore for MemoryStore {
        async fn processed_files(&self) -> anyhow::Result<HashSet<String>> {
            Ok(self.reports.lock().unwrap().keys().cloned().collect())
        }

        async fn persist(&self, report: &Report) -> anyhow::Result<PersistOutcome> {
            if self.fail_header_for.as_deref() == Some(report.file_name.as_str()) {
                anyhow::bail!("header insert rejected");
            }
            let mut reports = self.reports.lock().unwrap();
            if reports.contains_key(&report.file_name) {
                return Ok(PersistOutcome::AlreadyStored);
            }
            reports.insert(report.file_name.clone(), report.records.len());
            Ok(PersistOutcome::Stored {
                records: report.records.len() as u64,
            })
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn pending_files_subtracts_processed_names() {
        let candidates = names(&["bcms_sp1.txt", "bcms_tru1.txt", "bcms_ag_1.txt"]);
        let processed: HashSet<String> =
            names(&["bcms_tru1.txt", "BCMS_AG_1.txt"]).into_iter().collect();
        assert_eq!(
            pending_files(&candidates, &processed),
            names(&["bcms_sp1.txt", "bcms_ag_1.txt"])
        );
    }

    #[tokio::test]
    async fn ingests_matching_files_and_skips_the_rest() {
        let source = MemorySource::with(&[
            ("bcms_sp001.txt", report_text(ReportType::Split)),
            ("bcms_tru12.txt", report_text(ReportType::Trunk)),
            ("bcms_vdn_day01.txt", report_text(ReportType::Vdn)),
            ("notes.txt", String::new()),
        ]);
        let ingestor = Arc::new(Ingestor::new(source, MemoryStore::default()));

        let summary = Arc::clone(&ingestor).run(2).await.unwrap();
        assert_eq!(summary.candidates, 4);
        assert_eq!(summary.stored, 2);
        assert_eq!(summary.records, 24 + 21);
        assert_eq!(summary.skipped, 2);

        let stored = ingestor.store.reports.lock().unwrap().clone();
        assert_eq!(stored.len(), 2);
        assert!(!stored.contains_key("bcms_vdn_day01.txt"));

        let mut retrieved = ingestor.source.retrieved.lock().unwrap().clone();
        retrieved.sort();
        assert_eq!(retrieved, names(&["bcms_sp001.txt", "bcms_tru12.txt"]));
    }

    #[tokio::test]
    async fn rerun_skips_already_stored_files() {
        let source = MemorySource::with(&[
            ("bcms_sp001.txt", report_text(ReportType::Split)),
            ("bcms_ag_7.txt", report_text(ReportType::Agent)),
        ]);
        let store = MemoryStore::default();
        store
            .reports
            .lock()
            .unwrap()
            .insert("bcms_sp001.txt".to_string(), 24);
        let ingestor = Arc::new(Ingestor::new(source, store));

        let summary = Arc::clone(&ingestor).run(4).await.unwrap();
        assert_eq!(summary.already_processed, 1);
        assert_eq!(summary.stored, 1);
        assert_eq!(
            *ingestor.source.retrieved.lock().unwrap(),
            names(&["bcms_ag_7.txt"])
        );
        assert_eq!(ingestor.store.reports.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn report_stored_after_dedup_read_is_not_counted_as_ingested() {
        let source = MemorySource::with(&[("bcms_ag_7.txt", report_text(ReportType::Agent))]);
        let ingestor = Ingestor::new(source, MemoryStore::default());

        let first = ingestor.ingest_file("bcms_ag_7.txt").await.unwrap();
        assert_eq!(first, FileOutcome::Stored { records: 21 });
        let second = ingestor.ingest_file("bcms_ag_7.txt").await.unwrap();
        assert_eq!(second, FileOutcome::AlreadyStored);
        assert_eq!(ingestor.store.reports.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_header_writes_no_records_and_aborts() {
        let source = MemorySource::with(&[("bcms_vdn_5000.txt", report_text(ReportType::Vdn))]);
        let store = MemoryStore {
            fail_header_for: Some("bcms_vdn_5000.txt".to_string()),
            ..MemoryStore::default()
        };
        let ingestor = Arc::new(Ingestor::new(source, store));

        assert!(Arc::clone(&ingestor).run(1).await.is_err());
        assert!(ingestor.store.reports.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_file_is_fatal() {
        let source = MemorySource::with(&[("bcms_sp001.txt", "too short".to_string())]);
        let ingestor = Ingestor::new(source, MemoryStore::default());

        let err = ingestor.ingest_file("bcms_sp001.txt").await.unwrap_err();
        assert!(err.to_string().contains("bcms_sp001.txt"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn run_bounded_never_exceeds_limit() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let items: Vec<usize> = (0..25).collect();

        let results = run_bounded(items, 3, |item| {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(item)
            }
        })
        .await
        .unwrap();

        let mut results = results;
        results.sort();
        assert_eq!(results, (0..25).collect::<Vec<_>>());
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn nothing_starts_after_a_failed_item() {
        for _ in 0..50 {
            let later_started = Arc::new(AtomicUsize::new(0));
            let result = run_bounded((0..5).collect::<Vec<usize>>(), 1, |item| {
                let later_started = Arc::clone(&later_started);
                async move {
                    if item == 0 {
                        anyhow::bail!("item {item} failed");
                    }
                    later_started.fetch_add(1, Ordering::SeqCst);
                    Ok(item)
                }
            })
            .await;

            assert!(result.is_err());
            assert_eq!(later_started.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn failure_with_full_slots_admits_no_new_item() {
        let started = Arc::new(Mutex::new(Vec::new()));
        let result = run_bounded((0..10).collect::<Vec<usize>>(), 3, |item| {
            let started = Arc::clone(&started);
            async move {
                started.lock().unwrap().push(item);
                if item == 0 {
                    anyhow::bail!("item {item} failed");
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(item)
            }
        })
        .await;

        assert!(result.is_err());
        assert!(started.lock().unwrap().iter().all(|item| *item < 3));
    }
}
