//! Scheduler: weighted producer fan-out under a rate cap and record budget.
//!
//! The scheduler turns parsed producer specs into worker threads, wires
//! them to the writer pool through a bounded queue, and owns the shared
//! coordination state: the record [`budget`], the [`governor`]'s token
//! bucket, the weighted dispatch [`dispatch::WeightedGate`], and shutdown.
//!
//! ```text
//! producer threads ── batches ──▶ bounded queue ──▶ writer threads ──▶ medium
//!        │                                              │
//!   gate + budget + governor                    commit / refund
//! ```

pub mod budget;
pub mod dispatch;
pub mod governor;
mod producer;
mod writer;

pub use producer::{MAX_CONSECUTIVE_FORMAT_ERRORS, MAX_CONSECUTIVE_MODEL_ERRORS};
pub use writer::MAX_MEDIUM_FAILURES;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::extension::{ExtensionArgs, Family, Registry};
use crate::format::Format;
use crate::mapping::MappingChain;
use crate::medium::Medium;
use crate::model::Model;
use crate::spec::ProducerSpec;
use budget::Budget;
use dispatch::WeightedGate;
use governor::RateGovernor;
use producer::{ProducerContext, ProducerOutcome};
use writer::WriterPool;

/// How long a drain may take before the pipeline gives up.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

const JOIN_POLL: Duration = Duration::from_millis(10);

/// Shared shutdown switch: stops reservations and closes the gate once.
///
/// Producers and the rate governor poll [`ShutdownState::triggered`];
/// everything else goes through [`CancelHandle`].
pub struct ShutdownState {
    flag: AtomicBool,
    triggered_at: Mutex<Option<Instant>>,
    fatal: Mutex<Option<Error>>,
    budget: Arc<Budget>,
    gate: Arc<WeightedGate>,
}

impl ShutdownState {
    fn new(budget: Arc<Budget>, gate: Arc<WeightedGate>) -> Self {
        Self {
            flag: AtomicBool::new(false),
            triggered_at: Mutex::new(None),
            fatal: Mutex::new(None),
            budget,
            gate,
        }
    }

    /// Stop the pipeline: no further reservations or gate grants.
    pub fn trigger(&self) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            *self.triggered_at.lock().expect("shutdown lock poisoned") = Some(Instant::now());
            self.budget.close();
            self.gate.close();
        }
    }

    /// Whether shutdown was triggered.
    pub fn triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn triggered_at(&self) -> Option<Instant> {
        *self.triggered_at.lock().expect("shutdown lock poisoned")
    }

    /// Record the first fatal error and trigger shutdown.
    pub(crate) fn set_fatal(&self, error: Error) {
        {
            let mut fatal = self.fatal.lock().expect("shutdown lock poisoned");
            if fatal.is_none() {
                *fatal = Some(error);
            }
        }
        self.trigger();
    }

    pub(crate) fn take_fatal(&self) -> Option<Error> {
        self.fatal.lock().expect("shutdown lock poisoned").take()
    }
}

/// Handle for cancelling a running pipeline (signal handlers).
#[derive(Clone)]
pub struct CancelHandle {
    shutdown: Arc<ShutdownState>,
}

impl CancelHandle {
    /// Begin graceful shutdown: stop issuing batches and drain.
    pub fn cancel(&self) {
        self.shutdown.trigger();
    }
}

/// Everything the scheduler needs to run a pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Parsed producer specs, one per positional token.
    pub specs: Vec<ProducerSpec>,
    /// Total records to emit; `None` = unlimited.
    pub number: Option<u64>,
    /// Global records-per-second cap; `None` = unlimited.
    pub rate: Option<f64>,
    /// Records per batch.
    pub batch_size: u64,
    /// Writer-pool size (and queue capacity).
    pub writers: usize,
    /// Format title.
    pub format: String,
    /// Global mapping URIs applied after per-producer mappings.
    pub global_maps: Vec<String>,
    /// Wall-clock cap; drain when it elapses.
    pub duration: Option<Duration>,
    /// Progress report interval; `None` disables reports.
    pub progress: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            specs: Vec::new(),
            number: None,
            rate: None,
            batch_size: 1,
            writers: 4,
            format: "json-lines".to_string(),
            global_maps: Vec::new(),
            duration: None,
            progress: None,
        }
    }
}

/// Outcome of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    /// Records confirmed delivered to the medium.
    pub emitted: u64,
}

struct WorkerBlueprint {
    label: String,
    model: Box<dyn Model>,
    chain: MappingChain,
    format: Box<dyn Format>,
}

/// A fully assembled pipeline, ready to run.
pub struct Pipeline {
    workers: Vec<WorkerBlueprint>,
    medium: Arc<dyn Medium>,
    budget: Arc<Budget>,
    gate: Arc<WeightedGate>,
    shutdown: Arc<ShutdownState>,
    governor: Option<Arc<RateGovernor>>,
    batch_size: u64,
    writers: usize,
    number: Option<u64>,
    duration: Option<Duration>,
    progress: Option<Duration>,
}

impl Pipeline {
    /// Assemble a pipeline: validate titles, instantiate every producer's
    /// model, mapping chain and format, and set up the shared state.
    ///
    /// `ext_args` supplies each extension's hydrated arguments; `medium`
    /// is constructed by the caller (auto-selection happens at the CLI
    /// layer, and tests inject capturing media here).
    pub fn build(
        registry: &Registry,
        config: PipelineConfig,
        ext_args: &dyn Fn(Family, &str) -> ExtensionArgs,
        medium: Arc<dyn Medium>,
    ) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(Error::Config("batch size must be at least 1".to_string()));
        }
        if let Some(rate) = config.rate {
            if rate <= 0.0 {
                return Err(Error::Config(
                    "rate must be a positive number of records per second".to_string(),
                ));
            }
        }
        if config.specs.is_empty() {
            return Err(Error::Config("no producer specs given".to_string()));
        }

        let format_descriptor = registry
            .format(&config.format)
            .ok_or_else(|| Error::Config(format!("unknown format {:?}", config.format)))?;

        let mapping_args = |title: &str| ext_args(Family::Mapping, title);

        let mut workers = Vec::new();
        let mut weights = Vec::new();
        for spec in &config.specs {
            let model_descriptor = registry
                .model(&spec.title)
                .ok_or_else(|| Error::Config(format!("unknown model {:?}", spec.title)))?;
            let model_args = ext_args(Family::Model, spec.title.as_str());

            for instance in 0..spec.count {
                let mut chain = MappingChain::new();
                for uri in spec.mappings.iter().chain(&config.global_maps) {
                    chain.push(crate::mapping::resolve(registry, uri, &mapping_args)?);
                }

                workers.push(WorkerBlueprint {
                    label: format!("{}#{instance}", spec.title),
                    model: (model_descriptor.ctor)(&model_args)?,
                    chain,
                    format: (format_descriptor.ctor)(&ext_args(Family::Format, &config.format))?,
                });
                weights.push(spec.instance_weight());
            }
        }

        let budget = Arc::new(Budget::new(config.number));
        let gate = Arc::new(WeightedGate::new(&weights));
        let shutdown = Arc::new(ShutdownState::new(Arc::clone(&budget), Arc::clone(&gate)));

        Ok(Self {
            workers,
            medium,
            budget,
            gate,
            shutdown,
            governor: config.rate.map(|rate| Arc::new(RateGovernor::new(rate))),
            batch_size: config.batch_size,
            writers: config.writers.max(1),
            number: config.number,
            duration: config.duration,
            progress: config.progress,
        })
    }

    /// Handle for cancelling this pipeline from another thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            shutdown: Arc::clone(&self.shutdown),
        }
    }

    /// Run to completion: until the budget is spent, the duration cap
    /// elapses, cancellation, or a fatal error.
    pub fn run(self) -> Result<RunReport> {
        if self.number == Some(0) {
            return Ok(RunReport { emitted: 0 });
        }

        let started = Instant::now();
        let done = Arc::new(AtomicBool::new(false));

        let pool = WriterPool::spawn(
            self.writers,
            Arc::clone(&self.medium),
            Arc::clone(&self.budget),
            Arc::clone(&self.shutdown),
        );

        let mut producers = Vec::with_capacity(self.workers.len());
        for (id, blueprint) in self.workers.into_iter().enumerate() {
            let ctx = ProducerContext {
                id,
                label: blueprint.label.clone(),
                model: blueprint.model,
                chain: blueprint.chain,
                format: blueprint.format,
                batch_size: self.batch_size,
                budget: Arc::clone(&self.budget),
                gate: Arc::clone(&self.gate),
                governor: self.governor.clone(),
                shutdown: Arc::clone(&self.shutdown),
                sender: pool.sender(),
            };
            let handle = std::thread::Builder::new()
                .name(format!("producer-{}", blueprint.label))
                .spawn(move || producer::run(ctx))
                .expect("failed to spawn producer thread");
            producers.push(handle);
        }

        if let Some(duration) = self.duration {
            spawn_ticker(Arc::clone(&done), Duration::from_millis(50), {
                let shutdown = Arc::clone(&self.shutdown);
                move || {
                    if started.elapsed() >= duration {
                        info!("duration cap reached; draining");
                        shutdown.trigger();
                    }
                }
            });
        }

        if let Some(interval) = self.progress {
            let mut last_report = Instant::now();
            spawn_ticker(Arc::clone(&done), Duration::from_millis(100), {
                let budget = Arc::clone(&self.budget);
                move || {
                    if last_report.elapsed() >= interval {
                        last_report = Instant::now();
                        let emitted = budget.emitted();
                        let rate = emitted as f64 / started.elapsed().as_secs_f64();
                        info!(emitted, per_sec = rate as u64, "progress");
                    }
                }
            });
        }

        let outcomes = join_with_drain_deadline(producers, &self.shutdown);
        let writer_result = join_with_drain_deadline(pool.into_handles(), &self.shutdown);
        done.store(true, Ordering::Relaxed);

        let outcomes = outcomes?;
        writer_result?;

        if let Some(fatal) = self.shutdown.take_fatal() {
            return Err(fatal);
        }
        if !outcomes.is_empty() && outcomes.iter().all(|o| *o == ProducerOutcome::Retired) {
            return Err(Error::ModelProduction(
                "all producers retired after repeated errors".to_string(),
            ));
        }

        Ok(RunReport {
            emitted: self.budget.emitted(),
        })
    }
}

fn spawn_ticker(
    done: Arc<AtomicBool>,
    period: Duration,
    mut tick: impl FnMut() + Send + 'static,
) {
    std::thread::spawn(move || {
        while !done.load(Ordering::Relaxed) {
            std::thread::sleep(period);
            tick();
        }
    });
}

/// Join worker threads; once shutdown has been triggered, the drain may
/// take at most [`DRAIN_TIMEOUT`] before the pipeline gives up.
fn join_with_drain_deadline<T>(
    handles: Vec<JoinHandle<T>>,
    shutdown: &ShutdownState,
) -> Result<Vec<T>> {
    loop {
        if handles.iter().all(|h| h.is_finished()) {
            break;
        }
        if let Some(triggered_at) = shutdown.triggered_at() {
            if triggered_at.elapsed() > DRAIN_TIMEOUT {
                warn!("drain did not finish within {DRAIN_TIMEOUT:?}; abandoning workers");
                return Err(Error::ShutdownTimeout(DRAIN_TIMEOUT));
            }
        }
        std::thread::sleep(JOIN_POLL);
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(
            handle
                .join()
                .map_err(|_| Error::ModelProduction("worker thread panicked".to_string()))?,
        );
    }
    Ok(results)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub(crate) fn shutdown_state() -> ShutdownState {
        ShutdownState::new(
            Arc::new(Budget::new(None)),
            Arc::new(WeightedGate::new(&[1.0])),
        )
    }

    pub(crate) fn shutdown_arc() -> Arc<ShutdownState> {
        Arc::new(shutdown_state())
    }

    pub(crate) fn shutdown_for(
        budget: Arc<Budget>,
        gate: Arc<WeightedGate>,
    ) -> Arc<ShutdownState> {
        Arc::new(ShutdownState::new(budget, gate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Payload;
    use std::io::Write;
    use std::sync::Mutex;

    struct CaptureMedium {
        batches: Mutex<Vec<String>>,
        always_fail: bool,
    }

    impl CaptureMedium {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                batches: Mutex::new(Vec::new()),
                always_fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                batches: Mutex::new(Vec::new()),
                always_fail: true,
            })
        }

        fn lines(&self) -> Vec<String> {
            self.batches
                .lock()
                .unwrap()
                .iter()
                .flat_map(|batch| batch.lines().map(str::to_string).collect::<Vec<_>>())
                .collect()
        }
    }

    impl Medium for CaptureMedium {
        fn write(&self, payload: &Payload) -> Result<()> {
            if self.always_fail {
                return Err(Error::MediumWrite {
                    cause: "injected failure".to_string(),
                    retriable: false,
                });
            }
            self.batches
                .lock()
                .unwrap()
                .push(payload.as_text().unwrap_or_default().to_string());
            Ok(())
        }

        fn name(&self) -> &str {
            "capture"
        }
    }

    fn no_args(_family: Family, _title: &str) -> ExtensionArgs {
        ExtensionArgs::new()
    }

    fn config(models: &str) -> PipelineConfig {
        PipelineConfig {
            specs: models
                .split_whitespace()
                .map(|token| crate::spec::parse_producer_spec(token).unwrap())
                .collect(),
            ..PipelineConfig::default()
        }
    }

    fn run_pipeline(
        config: PipelineConfig,
        medium: Arc<CaptureMedium>,
    ) -> Result<RunReport> {
        let registry = Registry::with_builtins();
        Pipeline::build(&registry, config, &no_args, medium)?.run()
    }

    #[test]
    fn test_emits_exactly_number_as_json_lines() {
        let medium = CaptureMedium::new();
        let report = run_pipeline(
            PipelineConfig {
                number: Some(3),
                ..config("test")
            },
            Arc::clone(&medium),
        )
        .unwrap();

        assert_eq!(report.emitted, 3);
        let lines = medium.lines();
        assert_eq!(lines.len(), 3);
        for line in lines {
            let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
            assert!(parsed.get("_id").is_some());
        }
    }

    #[test]
    fn test_number_zero_writes_nothing() {
        let medium = CaptureMedium::new();
        let report = run_pipeline(
            PipelineConfig {
                number: Some(0),
                ..config("test")
            },
            Arc::clone(&medium),
        )
        .unwrap();
        assert_eq!(report.emitted, 0);
        assert!(medium.lines().is_empty());
    }

    #[test]
    fn test_single_record_clips_large_batch() {
        let medium = CaptureMedium::new();
        let report = run_pipeline(
            PipelineConfig {
                number: Some(1),
                batch_size: 100,
                ..config("test")
            },
            Arc::clone(&medium),
        )
        .unwrap();
        assert_eq!(report.emitted, 1);
        assert_eq!(medium.lines().len(), 1);
    }

    #[test]
    fn test_two_instances_both_emit() {
        let medium = CaptureMedium::new();
        let report = run_pipeline(
            PipelineConfig {
                number: Some(10),
                batch_size: 5,
                ..config("2test")
            },
            Arc::clone(&medium),
        )
        .unwrap();

        assert_eq!(report.emitted, 10);
        let lines = medium.lines();
        assert_eq!(lines.len(), 10);

        let ids: std::collections::BTreeSet<String> = lines
            .iter()
            .map(|line| {
                let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
                parsed["_id"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(ids.len(), 2, "both instances must contribute: {ids:?}");
    }

    #[test]
    fn test_weighted_emission_ratio() {
        let medium = CaptureMedium::new();
        let report = run_pipeline(
            PipelineConfig {
                number: Some(400),
                batch_size: 10,
                ..config("snort3 asa1")
            },
            Arc::clone(&medium),
        )
        .unwrap();

        assert_eq!(report.emitted, 400);
        let lines = medium.lines();
        let snort = lines.iter().filter(|l| l.contains("\"snort\"")).count();
        let asa = lines.iter().filter(|l| l.contains("\"asa\"")).count();
        assert_eq!(snort + asa, 400);
        let diff = (snort as i64 - 300).abs();
        assert!(diff <= 15, "snort {snort}, asa {asa}");
    }

    #[test]
    fn test_dropping_mapping_counts_emitted_records() {
        let mut program = tempfile::NamedTempFile::new().unwrap();
        writeln!(program, "drop-every 2").unwrap();
        let url = format!("file://{}", program.path().display());

        let medium = CaptureMedium::new();
        let report = run_pipeline(
            PipelineConfig {
                number: Some(100),
                batch_size: 10,
                global_maps: vec![url],
                ..config("test")
            },
            Arc::clone(&medium),
        )
        .unwrap();

        // The budget counts records that survive mapping, so the sink
        // still sees the full number.
        assert_eq!(report.emitted, 100);
        assert_eq!(medium.lines().len(), 100);
    }

    #[test]
    fn test_rate_cap_slows_emission() {
        let medium = CaptureMedium::new();
        let started = Instant::now();
        let report = run_pipeline(
            PipelineConfig {
                number: Some(200),
                batch_size: 20,
                rate: Some(1000.0),
                ..config("test")
            },
            Arc::clone(&medium),
        )
        .unwrap();
        let elapsed = started.elapsed();

        assert_eq!(report.emitted, 200);
        // 200 records at 1000/s from an empty bucket: about 200ms.
        assert!(elapsed >= Duration::from_millis(150), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(5), "{elapsed:?}");
    }

    #[test]
    fn test_unknown_model_is_config_error() {
        let medium = CaptureMedium::new();
        let err = run_pipeline(config("unknown_model"), medium).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("unknown_model"));
    }

    #[test]
    fn test_rate_zero_rejected() {
        let medium = CaptureMedium::new();
        let err = run_pipeline(
            PipelineConfig {
                rate: Some(0.0),
                ..config("test")
            },
            medium,
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_failing_medium_aborts_nonzero() {
        let medium = CaptureMedium::failing();
        let err = run_pipeline(
            PipelineConfig {
                number: Some(5),
                ..config("test")
            },
            medium,
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_cancellation_drains_cleanly() {
        let registry = Registry::with_builtins();
        let medium = CaptureMedium::new();
        let pipeline = Pipeline::build(
            &registry,
            PipelineConfig {
                rate: Some(500.0),
                ..config("test")
            },
            &no_args,
            Arc::clone(&medium) as _,
        )
        .unwrap();

        let cancel = pipeline.cancel_handle();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            cancel.cancel();
        });

        let report = pipeline.run().unwrap();
        assert!(report.emitted < 1000, "rate cap bounds cancelled output");
    }

    #[test]
    fn test_duration_cap_drains() {
        let medium = CaptureMedium::new();
        let started = Instant::now();
        let report = run_pipeline(
            PipelineConfig {
                rate: Some(1000.0),
                duration: Some(Duration::from_millis(200)),
                ..config("test")
            },
            Arc::clone(&medium),
        )
        .unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(report.emitted <= 1000);
    }
}
