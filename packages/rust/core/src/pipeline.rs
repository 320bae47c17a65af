//! End-to-end `update` pipeline: data file -> narratives -> LLM -> validated
//! records -> changeset -> patched (or regenerated) data file.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use serde_json::Value;
use tokio::sync::{Mutex, Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use taxrates_content::{ContentClient, TxtFileListing, is_usable, wikipedia_url};
use taxrates_dataset::{ChangeKind, ChangeSet, DatasetPatcher, diff, parse_dataset, regenerate};
use taxrates_llm::LlmProvider;
use taxrates_shared::schema;
use taxrates_shared::{CountryRecord, Dataset, PipelineConfig, Result, TaxRatesError};

use crate::extractor::{ChunkedExtractor, Extraction};
use crate::retry::RetryingInvoker;
use crate::trace::{TraceContext, TraceLogger};

/// What to do with the computed dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteMode {
    /// Targeted in-place edits of the data file.
    Patch,
    /// Write a freshly serialized module to the given path.
    Regenerate(PathBuf),
    /// Compute and report only.
    DryRun,
}

/// How one key ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    /// A validated record came out of the LLM.
    Extracted,
    /// The previous record was kept.
    FellBack { reason: String },
    /// No record could be produced and none existed before.
    Failed { reason: String },
    /// Not processed; passed through unchanged.
    Skipped { reason: String },
}

impl KeyOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Extracted => "extracted",
            Self::FellBack { .. } => "fell_back",
            Self::Failed { .. } => "failed",
            Self::Skipped { .. } => "skipped",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Extracted => None,
            Self::FellBack { reason } | Self::Failed { reason } | Self::Skipped { reason } => {
                Some(reason)
            }
        }
    }
}

/// Result of a pipeline run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Keys processed.
    pub total: usize,
    pub extracted: usize,
    pub fell_back: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Classification of the updated dataset against the original.
    pub changes: ChangeSet,
    /// File written, if any.
    pub written: Option<PathBuf>,
    /// Patch steps skipped for a missing anchor, as `key.field`.
    pub patch_skipped: Vec<String>,
    /// Total elapsed time.
    pub elapsed: Duration,
}

impl RunSummary {
    /// Whether every key produced a record (exit status 0).
    pub fn exit_ok(&self) -> bool {
        self.failed == 0
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when a worker picks up a key.
    fn key_started(&self, key: &str);
    /// Called when a key finishes, in completion order.
    fn key_finished(&self, key: &str, outcome: &KeyOutcome, current: usize, total: usize);
    /// Called when the pipeline completes.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn key_started(&self, _key: &str) {}
    fn key_finished(&self, _key: &str, _outcome: &KeyOutcome, _current: usize, _total: usize) {}
    fn done(&self, _summary: &RunSummary) {}
}

enum Event {
    Started(String),
    Finished(String, KeyOutcome),
}

/// Everything a worker task needs, shared across tasks.
struct Worker {
    extractor: ChunkedExtractor,
    content: ContentClient,
    listing: TxtFileListing,
    invoker: RetryingInvoker,
    trace: TraceLogger,
    only_with_files: bool,
}

// ---------------------------------------------------------------------------
// update
// ---------------------------------------------------------------------------

/// Run the update pipeline for `keys` (every key in the data file when empty).
///
/// Configuration problems (missing data file, unlocatable container,
/// unhealthy content service) abort before any key is processed. Per-key
/// problems degrade to [`KeyOutcome`]s.
#[instrument(skip_all, fields(data_file = %config.data_file.display(), provider = provider.name()))]
pub async fn run_update(
    config: &PipelineConfig,
    mode: WriteMode,
    keys: &[String],
    provider: Arc<dyn LlmProvider>,
    content: ContentClient,
    progress: &dyn ProgressReporter,
) -> Result<RunSummary> {
    let start = Instant::now();

    progress.phase("Loading dataset");
    let source = read_data_file(&config.data_file).await?;
    let original = parse_dataset(&source, &config.container)?;
    info!(records = original.len(), "dataset loaded");

    progress.phase("Checking content service");
    if !content.health().await {
        return Err(TaxRatesError::config("content service is not healthy"));
    }
    let listing = match content.list_txt_files().await {
        Ok(listing) => listing,
        Err(e) => {
            warn!(error = %e, "could not list narrative files; using page extraction only");
            TxtFileListing::default()
        }
    };
    debug!(files = listing.txt_files.len(), "narrative files listed");

    let keys = select_keys(&original, keys);
    let total = keys.len();
    let trace = config
        .logs_dir
        .as_ref()
        .map_or_else(TraceLogger::disabled, TraceLogger::new);

    let worker = Arc::new(Worker {
        extractor: ChunkedExtractor::new(Arc::clone(&provider), config, trace.clone()),
        content,
        listing,
        invoker: RetryingInvoker::new(config.retry),
        trace,
        only_with_files: config.only_with_files,
    });

    // ------------------------------------------------------------------
    // Worker pool
    // ------------------------------------------------------------------
    progress.phase("Extracting");
    info!(keys = total, workers = config.workers, "processing keys");

    let original = Arc::new(original);
    let records = Arc::new(Mutex::new(HashMap::<String, CountryRecord>::new()));
    let semaphore = Arc::new(Semaphore::new(config.workers.max(1)));
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let mut tasks = JoinSet::new();
    let mut task_keys = HashMap::new();

    for (index, name) in keys.iter().enumerate() {
        let worker = Arc::clone(&worker);
        let original = Arc::clone(&original);
        let records = Arc::clone(&records);
        let semaphore = Arc::clone(&semaphore);
        let tx = tx.clone();
        let key = name.clone();

        let handle = tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };
            let _ = tx.send(Event::Started(key.clone()));

            let ctx = TraceContext::new(index, key.as_str());
            let prior = original.get(&key);
            let (outcome, record) = worker.process(&ctx, prior).await;
            if let Some(record) = record {
                records.lock().await.insert(key.clone(), record);
            }
            let _ = tx.send(Event::Finished(key, outcome));
        });
        task_keys.insert(handle.id(), name.clone());
    }
    drop(tx);

    let mut counts = Counts::default();
    let mut finished = 0usize;
    while let Some(event) = rx.recv().await {
        match event {
            Event::Started(key) => progress.key_started(&key),
            Event::Finished(key, outcome) => {
                finished += 1;
                counts.record(&outcome);
                progress.key_finished(&key, &outcome, finished, total);
            }
        }
    }
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            let key = task_keys.get(&e.id()).cloned().unwrap_or_default();
            error!(key = %key, error = %e, "worker task failed");
            let outcome = KeyOutcome::Failed {
                reason: format!("worker task failed: {e}"),
            };
            finished += 1;
            counts.record(&outcome);
            progress.key_finished(&key, &outcome, finished, total);
        }
    }

    // ------------------------------------------------------------------
    // Assemble and write
    // ------------------------------------------------------------------
    progress.phase("Computing changes");
    let mut records = std::mem::take(&mut *records.lock().await);
    let updated = assemble(&original, &keys, &mut records);
    let changes = diff(&original, &updated);
    info!(
        added = changes.added.len(),
        modified = changes.modified.len(),
        unchanged = changes.unchanged.len(),
        "changes computed"
    );

    progress.phase("Writing");
    let (written, patch_skipped) = match mode {
        WriteMode::Patch => {
            let patcher = DatasetPatcher::new(config.container.as_str());
            let mut text = source.clone();
            let mut skipped = Vec::new();
            for (key, record) in updated.iter() {
                if !matches!(changes.kind_of(key), Some(ChangeKind::Added | ChangeKind::Modified)) {
                    continue;
                }
                let outcome = patcher.patch_record(&text, key, original.get(key), record);
                text = outcome.text;
                skipped.extend(outcome.skipped);
            }
            if text == source {
                debug!("data file unchanged; nothing written");
                (None, skipped)
            } else {
                write_file(&config.data_file, &text).await?;
                (Some(config.data_file.clone()), skipped)
            }
        }
        WriteMode::Regenerate(out) => {
            let text = regenerate(&source, &config.container, &updated, &changes, &Local::now())?;
            write_file(&out, &text).await?;
            (Some(out), Vec::new())
        }
        WriteMode::DryRun => (None, Vec::new()),
    };

    let summary = RunSummary {
        total,
        extracted: counts.extracted,
        fell_back: counts.fell_back,
        failed: counts.failed,
        skipped: counts.skipped,
        changes,
        written,
        patch_skipped,
        elapsed: start.elapsed(),
    };

    info!(
        total = summary.total,
        extracted = summary.extracted,
        fell_back = summary.fell_back,
        failed = summary.failed,
        skipped = summary.skipped,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "update complete"
    );
    progress.done(&summary);
    Ok(summary)
}

#[derive(Default)]
struct Counts {
    extracted: usize,
    fell_back: usize,
    failed: usize,
    skipped: usize,
}

impl Counts {
    fn record(&mut self, outcome: &KeyOutcome) {
        match outcome {
            KeyOutcome::Extracted => self.extracted += 1,
            KeyOutcome::FellBack { .. } => self.fell_back += 1,
            KeyOutcome::Failed { .. } => self.failed += 1,
            KeyOutcome::Skipped { .. } => self.skipped += 1,
        }
    }
}

/// Requested keys without duplicates, or every dataset key.
fn select_keys(original: &Dataset, requested: &[String]) -> Vec<String> {
    if requested.is_empty() {
        return original.keys().map(str::to_string).collect();
    }
    let mut seen = HashSet::new();
    requested
        .iter()
        .filter(|k| seen.insert(k.as_str()))
        .cloned()
        .collect()
}

/// Original keys in original order, then new keys in processing order.
fn assemble(original: &Dataset, keys: &[String], records: &mut HashMap<String, CountryRecord>) -> Dataset {
    let mut updated = Dataset::new();
    for (key, record) in original.iter() {
        let record = records.remove(key).unwrap_or_else(|| record.clone());
        updated.insert(key, record);
    }
    for key in keys {
        if let Some(record) = records.remove(key) {
            updated.insert(key.as_str(), record);
        }
    }
    updated
}

async fn read_data_file(path: &Path) -> Result<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(TaxRatesError::config(format!(
            "data file not found: {}",
            path.display()
        ))),
        Err(e) => Err(TaxRatesError::io(path, e)),
    }
}

async fn write_file(path: &Path, text: &str) -> Result<()> {
    tokio::fs::write(path, text)
        .await
        .map_err(|e| TaxRatesError::io(path, e))?;
    info!(path = %path.display(), bytes = text.len(), "data file written");
    Ok(())
}

// ---------------------------------------------------------------------------
// Per-key processing
// ---------------------------------------------------------------------------

impl Worker {
    /// Produce the outcome for one key and the record to store, if any.
    async fn process(&self, ctx: &TraceContext, prior: Option<&CountryRecord>) -> (KeyOutcome, Option<CountryRecord>) {
        let key = ctx.key.as_str();
        let file = self.listing.file_for(key);

        if file.is_none() && self.only_with_files {
            debug!(key, "no narrative file; skipping");
            return (
                KeyOutcome::Skipped {
                    reason: "no narrative file".into(),
                },
                prior.cloned(),
            );
        }

        let Some(narrative) = self.narrative(key, file).await else {
            return self.fall_back(ctx, prior, "narrative unavailable".into()).await;
        };

        let candidate = match self.extractor.extract(ctx, prior, &narrative).await {
            Extraction::Record(value) => value,
            Extraction::Failed(reason) => return self.fall_back(ctx, prior, reason).await,
        };

        match schema::into_record(candidate) {
            Ok(record) => {
                info!(key, trace_id = %ctx.trace_id, "record extracted");
                self.trace.log_summary(ctx, true, false, "extracted").await;
                (KeyOutcome::Extracted, Some(record))
            }
            Err(e) => self.fall_back(ctx, prior, e.to_string()).await,
        }
    }

    /// Keep the prior record, or fail the key when there is none.
    async fn fall_back(
        &self,
        ctx: &TraceContext,
        prior: Option<&CountryRecord>,
        reason: String,
    ) -> (KeyOutcome, Option<CountryRecord>) {
        match prior {
            Some(record) => {
                warn!(key = %ctx.key, trace_id = %ctx.trace_id, %reason, "keeping previous record");
                self.trace.log_summary(ctx, false, true, &reason).await;
                (KeyOutcome::FellBack { reason }, Some(record.clone()))
            }
            None => {
                error!(key = %ctx.key, trace_id = %ctx.trace_id, %reason, "no record produced");
                self.trace.log_summary(ctx, false, false, &reason).await;
                (KeyOutcome::Failed { reason }, None)
            }
        }
    }

    /// The hosted narrative file if usable, else the extracted article
    /// (unless only hosted files are allowed).
    async fn narrative(&self, key: &str, file: Option<&str>) -> Option<String> {
        if let Some(name) = file {
            let label = format!("{key} fetch {name}");
            match self.invoker.invoke(&label, move |_| self.content.fetch_file(name)).await {
                Ok(text) if is_usable(&text) => return Some(text),
                Ok(_) => debug!(key, file = name, "narrative file too short"),
                Err(e) => warn!(key, file = name, error = %e, "narrative file fetch failed"),
            }
        }
        if self.only_with_files {
            return None;
        }

        let url = wikipedia_url(key);
        let page = url.as_str();
        let label = format!("{key} extract");
        match self.invoker.invoke(&label, move |_| self.content.extract(page)).await {
            Ok(Some(text)) if is_usable(&text) => Some(text),
            Ok(_) => {
                debug!(key, %url, "no usable article content");
                None
            }
            Err(e) => {
                warn!(key, %url, error = %e, "article extraction failed");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// apply
// ---------------------------------------------------------------------------

/// Result of applying hand-prepared records.
#[derive(Debug, Clone, Default)]
pub struct ApplySummary {
    /// Keys with at least one edit patched in.
    pub applied: Vec<String>,
    /// Keys where every edit was skipped for a missing anchor.
    pub skipped: Vec<String>,
    /// Keys already matching the data file.
    pub unchanged: Vec<String>,
    /// Keys rejected by the schema, with the reason.
    pub rejected: Vec<(String, String)>,
    /// Patch steps skipped for a missing anchor.
    pub patch_skipped: Vec<String>,
    /// File written, if any.
    pub written: Option<PathBuf>,
}

/// Validate `{key: record}` entries and patch them into the data file.
#[instrument(skip_all, fields(data_file = %data_file.display()))]
pub async fn apply_updates(
    data_file: &Path,
    container: &str,
    updates: &Value,
    dry_run: bool,
) -> Result<ApplySummary> {
    let entries = updates
        .as_object()
        .ok_or_else(|| TaxRatesError::validation("updates must be a JSON object of key -> record"))?;

    let source = read_data_file(data_file).await?;
    let original = parse_dataset(&source, container)?;
    let patcher = DatasetPatcher::new(container);

    let mut summary = ApplySummary::default();
    let mut text = source.clone();
    for (key, candidate) in entries {
        let record = match schema::into_record(candidate.clone()) {
            Ok(record) => record,
            Err(e) => {
                warn!(key, error = %e, "update rejected");
                summary.rejected.push((key.clone(), e.to_string()));
                continue;
            }
        };
        let outcome = patcher.patch_record(&text, key, original.get(key), &record);
        text = outcome.text;
        if !outcome.applied.is_empty() {
            summary.applied.push(key.clone());
        } else if !outcome.skipped.is_empty() {
            summary.skipped.push(key.clone());
        } else {
            summary.unchanged.push(key.clone());
        }
        summary.patch_skipped.extend(outcome.skipped);
    }

    if text != source && !dry_run {
        write_file(data_file, &text).await?;
        summary.written = Some(data_file.to_path_buf());
    }
    info!(
        applied = summary.applied.len(),
        skipped = summary.skipped.len(),
        unchanged = summary.unchanged.len(),
        rejected = summary.rejected.len(),
        "updates applied"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;
    use taxrates_llm::{LlmRequest, LlmResponse, OllamaProvider};
    use taxrates_shared::{AppConfig, ContentConfig, RetryPolicy};
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const SOURCE: &str = r#"// Tax data for major countries
export const taxData = {
    "canada": {
        name: "Canada",
        currency: "CAD",
        system: "progressive",
        countryCode: "CA",
        coordinates: [56.1304, -106.3468],
        brackets: [
            {min: 0, max: 53359, rate: 14.5},
            {min: 53360, max: null, rate: 33}
        ]
    },
    "ukraine": {
        name: "Ukraine",
        currency: "UAH",
        system: "flat",
        countryCode: "UA",
        coordinates: [50.4501, 30.5234],
        brackets: [
            {min: 0, max: null, rate: 18}
        ]
    }
};

export function getTaxRateColor(taxRate) {
    return taxRate === 0 ? '#45b7d1' : '#ff6b6b';
}
"#;

    fn narrative() -> String {
        "Ukraine levies a flat personal income tax of 18 percent. ".repeat(4)
            + "The standard VAT rate is 20 percent."
    }

    fn ukraine_reply() -> Value {
        json!({
            "name": "Ukraine",
            "currency": "UAH",
            "system": "flat",
            "countryCode": "UA",
            "coordinates": [50.4501, 30.5234],
            "brackets": [{"min": 0, "max": null, "rate": 18}],
            "vat": {"hasVAT": true, "standard": 20.0}
        })
    }

    struct Fixture {
        dir: PathBuf,
        content: MockServer,
        llm: MockServer,
    }

    impl Fixture {
        async fn new(source: &str) -> Self {
            let dir = std::env::temp_dir().join(format!("taxrates-pipeline-{}", Uuid::now_v7()));
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("taxData.js"), source).unwrap();

            let content = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/health"))
                .respond_with(ResponseTemplate::new(200))
                .mount(&content)
                .await;
            Mock::given(method("GET"))
                .and(path("/txt-files"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "success": true,
                    "txt_files": ["taxation_ukraine.txt"],
                    "count": 1,
                    "files_info": {}
                })))
                .mount(&content)
                .await;
            Mock::given(method("GET"))
                .and(path("/files/taxation_ukraine.txt"))
                .respond_with(ResponseTemplate::new(200).set_body_string(narrative()))
                .mount(&content)
                .await;

            Self {
                dir,
                content,
                llm: MockServer::start().await,
            }
        }

        async fn llm_replies(&self, content: &str) {
            self.llm.reset().await;
            Mock::given(method("POST"))
                .and(path("/chat"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "message": {"role": "assistant", "content": content}
                })))
                .mount(&self.llm)
                .await;
        }

        fn data_file(&self) -> PathBuf {
            self.dir.join("taxData.js")
        }

        fn config(&self) -> PipelineConfig {
            let mut config = PipelineConfig::from(&AppConfig::default());
            config.data_file = self.data_file();
            config.logs_dir = Some(self.dir.join("logs"));
            config.workers = 2;
            config.retry = RetryPolicy {
                max_retries: 2,
                base_delay: Duration::from_millis(5),
            };
            config
        }

        fn content_client(&self) -> ContentClient {
            ContentClient::new(&ContentConfig {
                service_url: self.content.uri(),
                ..ContentConfig::default()
            })
            .unwrap()
        }

        fn provider(&self) -> Arc<dyn LlmProvider> {
            Arc::new(OllamaProvider::new(&self.llm.uri(), Duration::from_secs(5)).unwrap())
        }

        async fn run(&self, config: &PipelineConfig, mode: WriteMode, keys: &[&str]) -> Result<RunSummary> {
            let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
            run_update(config, mode, &keys, self.provider(), self.content_client(), &SilentProgress).await
        }

        fn read(&self) -> String {
            std::fs::read_to_string(self.data_file()).unwrap()
        }

        async fn serve_articles(&self) {
            Mock::given(method("POST"))
                .and(path("/extract"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "success": true,
                    "content": "The country has a flat income tax of 20 percent on all income. ".repeat(3)
                })))
                .mount(&self.content)
                .await;
        }
    }

    /// Provider that records how many generate calls overlap.
    #[derive(Default)]
    struct Gauge {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmProvider for Gauge {
        fn name(&self) -> &str {
            "gauge"
        }

        async fn is_available(&self) -> bool {
            true
        }

        async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(25)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(LlmResponse::from_content("gauge", &request.model, ukraine_reply().to_string(), None))
        }

        async fn list_models(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }
    }

    const MANY_KEYS: [&str; 6] = ["canada", "ukraine", "estonia", "latvia", "lithuania", "poland"];

    async fn run_with_gauge(fx: &Fixture, workers: usize) -> (RunSummary, Arc<Gauge>) {
        let gauge = Arc::new(Gauge::default());
        let mut config = fx.config();
        config.workers = workers;
        let keys: Vec<String> = MANY_KEYS.iter().map(|k| k.to_string()).collect();
        let summary = run_update(
            &config,
            WriteMode::DryRun,
            &keys,
            gauge.clone(),
            fx.content_client(),
            &SilentProgress,
        )
        .await
        .unwrap();
        (summary, gauge)
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }

    #[tokio::test]
    async fn modified_vat_is_patched_in_place() {
        let fx = Fixture::new(SOURCE).await;
        fx.llm_replies(&ukraine_reply().to_string()).await;

        let summary = fx.run(&fx.config(), WriteMode::Patch, &["ukraine"]).await.unwrap();

        assert_eq!(summary.extracted, 1);
        assert!(summary.exit_ok());
        assert_eq!(summary.changes.modified, vec!["ukraine".to_string()]);
        assert_eq!(
            summary.changes.notes_for("ukraine"),
            ["VAT rate updated: N/A% -> 20.0%".to_string()]
        );
        assert_eq!(summary.written.as_deref(), Some(fx.data_file().as_path()));

        let patched = fx.read();
        assert!(patched.contains(
            "            {min: 0, max: null, rate: 18}\n        ],\n        vat: {hasVAT: true, standard: 20}\n    }\n};"
        ));
        // Canada untouched.
        assert!(patched.starts_with(&SOURCE[..SOURCE.find("\"ukraine\"").unwrap()]));
        assert!(patched.ends_with(&SOURCE[SOURCE.find("\n};").unwrap()..]));

        let traces = std::fs::read_dir(fx.dir.join("logs")).unwrap().count();
        assert_eq!(traces, 3);
    }

    #[tokio::test]
    async fn second_run_is_idempotent() {
        let fx = Fixture::new(SOURCE).await;
        fx.llm_replies(&ukraine_reply().to_string()).await;
        let config = fx.config();

        fx.run(&config, WriteMode::Patch, &["ukraine"]).await.unwrap();
        let first = fx.read();

        let summary = fx.run(&config, WriteMode::Patch, &["ukraine"]).await.unwrap();
        assert!(!summary.changes.has_changes());
        assert_eq!(summary.written, None);
        assert_eq!(fx.read(), first);
    }

    #[tokio::test]
    async fn invalid_candidate_keeps_previous_record() {
        let fx = Fixture::new(SOURCE).await;
        let mut reply = ukraine_reply();
        reply["system"] = json!("mixed");
        fx.llm_replies(&reply.to_string()).await;

        let summary = fx.run(&fx.config(), WriteMode::Patch, &["ukraine"]).await.unwrap();

        assert_eq!(summary.fell_back, 1);
        assert!(summary.exit_ok());
        assert_eq!(summary.changes.unchanged, vec!["canada".to_string(), "ukraine".to_string()]);
        assert_eq!(summary.written, None);
        assert_eq!(fx.read(), SOURCE);
    }

    #[tokio::test]
    async fn new_key_without_record_fails() {
        let fx = Fixture::new(SOURCE).await;
        Mock::given(method("POST"))
            .and(path("/extract"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "content": "Estonia has a flat income tax of 22 percent on all income. ".repeat(3)
            })))
            .mount(&fx.content)
            .await;
        fx.llm_replies("I am not sure about Estonia.").await;

        let summary = fx.run(&fx.config(), WriteMode::Patch, &["estonia"]).await.unwrap();

        assert_eq!(summary.failed, 1);
        assert!(!summary.exit_ok());
        assert!(summary.changes.added.is_empty());
        assert_eq!(fx.read(), SOURCE);
    }

    #[tokio::test]
    async fn new_key_is_appended() {
        let fx = Fixture::new(SOURCE).await;
        Mock::given(method("POST"))
            .and(path("/extract"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "content": "Estonia has a flat income tax of 22 percent on all income. ".repeat(3)
            })))
            .mount(&fx.content)
            .await;
        let reply = json!({
            "name": "Estonia",
            "currency": "EUR",
            "system": "flat",
            "countryCode": "EE",
            "coordinates": [58.5953, 25.0136],
            "brackets": [{"min": 0, "max": null, "rate": 22}]
        });
        fx.llm_replies(&format!("Here is the record:\n{reply}")).await;

        let summary = fx.run(&fx.config(), WriteMode::Patch, &["estonia"]).await.unwrap();

        assert_eq!(summary.changes.added, vec!["estonia".to_string()]);
        let patched = fx.read();
        let dataset = parse_dataset(&patched, "taxData").unwrap();
        assert_eq!(dataset.keys().collect::<Vec<_>>(), ["canada", "ukraine", "estonia"]);
        assert!(patched.contains("export function getTaxRateColor"));
    }

    #[tokio::test]
    async fn only_with_files_skips_keys_without_narrative() {
        let fx = Fixture::new(SOURCE).await;
        fx.llm_replies(&ukraine_reply().to_string()).await;
        let mut config = fx.config();
        config.only_with_files = true;

        let summary = fx.run(&config, WriteMode::DryRun, &[]).await.unwrap();

        assert_eq!(summary.total, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.extracted, 1);
        assert_eq!(summary.changes.unchanged, vec!["canada".to_string()]);
        assert_eq!(summary.written, None);
        assert_eq!(fx.read(), SOURCE);
    }

    #[tokio::test]
    async fn regenerate_writes_full_module() {
        let fx = Fixture::new(SOURCE).await;
        fx.llm_replies(&ukraine_reply().to_string()).await;
        let out = fx.dir.join("taxData.updated.js");

        let summary = fx
            .run(&fx.config(), WriteMode::Regenerate(out.clone()), &["ukraine"])
            .await
            .unwrap();

        assert_eq!(summary.written.as_deref(), Some(out.as_path()));
        let text = std::fs::read_to_string(&out).unwrap();
        assert!(text.starts_with("// Tax data for major countries - UPDATED VERSION\n"));
        assert!(text.contains("// - VAT rate updated: N/A% -> 20.0%"));
        assert!(text.contains("export function getTaxRateColor"));
        assert_eq!(fx.read(), SOURCE);
    }

    #[tokio::test]
    async fn unhealthy_service_is_fatal() {
        let fx = Fixture::new(SOURCE).await;
        fx.content.reset().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&fx.content)
            .await;

        let err = fx.run(&fx.config(), WriteMode::Patch, &[]).await.unwrap_err();
        assert!(matches!(err, TaxRatesError::Config { .. }));
    }

    #[tokio::test]
    async fn missing_data_file_is_fatal() {
        let fx = Fixture::new(SOURCE).await;
        let mut config = fx.config();
        config.data_file = fx.dir.join("missing.js");

        let err = fx.run(&config, WriteMode::Patch, &[]).await.unwrap_err();
        assert!(err.to_string().contains("data file not found"));
    }

    #[tokio::test]
    async fn apply_validates_and_patches() {
        let fx = Fixture::new(SOURCE).await;
        let updates = json!({
            "ukraine": ukraine_reply(),
            "canada": {"name": "Canada"}
        });

        let summary = apply_updates(&fx.data_file(), "taxData", &updates, false).await.unwrap();

        assert_eq!(summary.applied, vec!["ukraine".to_string()]);
        assert_eq!(summary.rejected.len(), 1);
        assert_eq!(summary.rejected[0].0, "canada");
        assert!(summary.written.is_some());
        assert!(fx.read().contains("vat: {hasVAT: true, standard: 20}"));
    }

    #[tokio::test]
    async fn apply_dry_run_leaves_file() {
        let fx = Fixture::new(SOURCE).await;
        let updates = json!({"ukraine": ukraine_reply()});

        let summary = apply_updates(&fx.data_file(), "taxData", &updates, true).await.unwrap();

        assert_eq!(summary.applied.len(), 1);
        assert_eq!(summary.written, None);
        assert_eq!(fx.read(), SOURCE);

        let err = apply_updates(&fx.data_file(), "taxData", &json!([1]), true).await.unwrap_err();
        assert!(matches!(err, TaxRatesError::Validation { .. }));
    }

    #[tokio::test]
    async fn pool_never_exceeds_worker_count() {
        let fx = Fixture::new(SOURCE).await;
        fx.serve_articles().await;

        let (summary, gauge) = run_with_gauge(&fx, 2).await;

        assert_eq!(summary.total, MANY_KEYS.len());
        assert_eq!(summary.extracted, MANY_KEYS.len());
        assert_eq!(gauge.calls.load(Ordering::SeqCst), MANY_KEYS.len());
        let peak = gauge.peak.load(Ordering::SeqCst);
        assert!((1..=2).contains(&peak), "peak in-flight calls: {peak}");
        assert_eq!(gauge.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn single_worker_runs_keys_one_at_a_time() {
        let fx = Fixture::new(SOURCE).await;
        fx.serve_articles().await;

        let (summary, gauge) = run_with_gauge(&fx, 1).await;

        assert_eq!(summary.extracted, MANY_KEYS.len());
        assert_eq!(gauge.calls.load(Ordering::SeqCst), MANY_KEYS.len());
        assert_eq!(gauge.peak.load(Ordering::SeqCst), 1);
        assert_eq!(fx.read(), SOURCE);
    }

    #[tokio::test]
    async fn apply_reports_skipped_and_unchanged_keys() {
        let empty = "export const taxData = {\n};\n";
        let fx = Fixture::new(empty).await;
        let updates = json!({"ukraine": ukraine_reply()});

        let summary = apply_updates(&fx.data_file(), "taxData", &updates, false).await.unwrap();

        assert!(summary.applied.is_empty());
        assert_eq!(summary.skipped, vec!["ukraine".to_string()]);
        assert_eq!(summary.patch_skipped, vec!["ukraine".to_string()]);
        assert_eq!(summary.written, None);
        assert_eq!(fx.read(), empty);

        let fx = Fixture::new(SOURCE).await;
        let canada = json!({
            "name": "Canada",
            "currency": "CAD",
            "system": "progressive",
            "countryCode": "CA",
            "coordinates": [56.1304, -106.3468],
            "brackets": [
                {"min": 0, "max": 53359, "rate": 14.5},
                {"min": 53360, "max": null, "rate": 33}
            ]
        });
        let summary = apply_updates(&fx.data_file(), "taxData", &json!({"canada": canada}), false)
            .await
            .unwrap();

        assert!(summary.applied.is_empty());
        assert_eq!(summary.unchanged, vec!["canada".to_string()]);
        assert_eq!(summary.written, None);
    }

    #[test]
    fn keys_are_deduplicated() {
        let dataset = parse_dataset(SOURCE, "taxData").unwrap();
        assert_eq!(select_keys(&dataset, &[]), ["canada", "ukraine"]);
        let requested = ["ukraine".to_string(), "estonia".to_string(), "ukraine".to_string()];
        assert_eq!(select_keys(&dataset, &requested), ["ukraine", "estonia"]);
    }
}
