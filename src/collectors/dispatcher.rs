//! Batch dispatch of modules.
//!
//! One task per requested module. A semaphore bounds how many `run` calls
//! execute at once, and a single deadline is shared by the whole batch.
//!
//! The deadline only changes what is *reported*: a module past the deadline is
//! marked `timeout` but keeps running, keeps its semaphore slot, and may keep
//! writing records. [`Dispatcher::dispatch`] returns only after every `run`
//! call has really returned.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::future;
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::time::Instant;

use crate::collectors::module::{ModuleParams, RunSummary};
use crate::collectors::registry::ModuleRegistry;
use crate::collectors::status::{ModuleState, StatusBoard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Maximum number of concurrently executing modules, clamped to
    /// `1..=Semaphore::MAX_PERMITS`.
    pub parallelism: usize,
    /// Batch deadline; `None` is unbounded.
    pub timeout: Option<Duration>,
}

impl DispatchOptions {
    pub fn new(parallelism: usize, timeout: Option<Duration>) -> Self {
        Self {
            parallelism: parallelism.clamp(1, Semaphore::MAX_PERMITS),
            timeout: timeout.filter(|t| !t.is_zero()),
        }
    }

    /// `timeout_secs == 0` means unbounded.
    pub fn from_secs(parallelism: usize, timeout_secs: u64) -> Self {
        Self::new(parallelism, Some(Duration::from_secs(timeout_secs)))
    }
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self::new(num_cpus::get(), None)
    }
}

/// Final outcome of one module in a batch.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleOutcome {
    pub name: String,
    pub state: ModuleState,
    pub elapsed_secs: f64,
    /// Present when `run` returned `Ok`, even after a timeout.
    pub summary: Option<RunSummary>,
    pub error: Option<String>,
}

impl ModuleOutcome {
    pub fn records_written(&self) -> usize {
        self.summary.as_ref().map_or(0, |s| s.records_written)
    }

    pub fn output_files(&self) -> &[PathBuf] {
        self.summary
            .as_ref()
            .map_or(&[][..], |s| s.output_files.as_slice())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    pub outcomes: Vec<ModuleOutcome>,
}

impl DispatchReport {
    pub fn count(&self, state: ModuleState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }

    pub fn get(&self, name: &str) -> Option<&ModuleOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    pub fn total_records(&self) -> usize {
        self.outcomes.iter().map(ModuleOutcome::records_written).sum()
    }
}

pub struct Dispatcher {
    registry: Arc<ModuleRegistry>,
    board: StatusBoard,
}

impl Dispatcher {
    pub fn new(registry: Arc<ModuleRegistry>) -> Self {
        Self::with_board(registry, StatusBoard::new())
    }

    /// Dispatcher publishing into an existing board, e.g. one a reporter
    /// already watches.
    pub fn with_board(registry: Arc<ModuleRegistry>, board: StatusBoard) -> Self {
        Self { registry, board }
    }

    pub fn board(&self) -> &StatusBoard {
        &self.board
    }

    /// Run `names` as one batch and wait for all of them to really finish.
    ///
    /// Individual module failures never surface as an error; they end up as
    /// `failed` outcomes. Names missing from the registry fail without running
    /// anything. Repeated names run once, at their first position.
    pub async fn dispatch(
        &self,
        names: &[String],
        params: Arc<ModuleParams>,
        options: DispatchOptions,
    ) -> DispatchReport {
        let names = unique_names(names);
        let options = DispatchOptions::new(options.parallelism, options.timeout);
        let deadline = options.timeout.and_then(|t| {
            let deadline = Instant::now().checked_add(t);
            if deadline.is_none() {
                warn!("Timeout of {}s is out of range, running unbounded", t.as_secs());
            }
            deadline
        });
        let semaphore = Arc::new(Semaphore::new(options.parallelism));

        info!(
            "Dispatching {} modules (parallelism {}, timeout {})",
            names.len(),
            options.parallelism,
            options
                .timeout
                .map(|t| format!("{}s", t.as_secs()))
                .unwrap_or_else(|| "none".to_string())
        );

        for name in &names {
            self.board.mark_waiting(name).await;
        }

        let tasks = names.iter().map(|name| {
            let task = run_module(
                name.clone(),
                Arc::clone(&self.registry),
                Arc::clone(&params),
                Arc::clone(&semaphore),
                self.board.clone(),
                deadline,
            );
            tokio::spawn(task)
        });

        let mut outcomes = Vec::with_capacity(names.len());
        for (name, joined) in names.iter().zip(future::join_all(tasks).await) {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    error!("Dispatch task for '{}' aborted: {}", name, e);
                    self.board.mark_exited(name, false).await;
                    outcomes.push(ModuleOutcome {
                        name: name.clone(),
                        state: ModuleState::Failed,
                        elapsed_secs: 0.0,
                        summary: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let report = DispatchReport { outcomes };
        info!(
            "Batch finished: {} completed, {} failed, {} timed out, {} records",
            report.count(ModuleState::Completed),
            report.count(ModuleState::Failed),
            report.count(ModuleState::Timeout),
            report.total_records()
        );
        report
    }
}

fn unique_names(names: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(names.len());
    let mut unique = Vec::with_capacity(names.len());
    for name in names {
        if seen.insert(name.as_str()) {
            unique.push(name.clone());
        } else {
            warn!("Module '{}' requested more than once, running it once", name);
        }
    }
    unique
}

async fn run_module(
    name: String,
    registry: Arc<ModuleRegistry>,
    params: Arc<ModuleParams>,
    semaphore: Arc<Semaphore>,
    board: StatusBoard,
    deadline: Option<Instant>,
) -> ModuleOutcome {
    // The semaphore is never closed, so acquisition only fails on a bug.
    let _permit = match semaphore.acquire_owned().await {
        Ok(permit) => permit,
        Err(e) => {
            board.mark_exited(&name, false).await;
            return ModuleOutcome {
                name,
                state: ModuleState::Failed,
                elapsed_secs: 0.0,
                summary: None,
                error: Some(e.to_string()),
            };
        }
    };

    board.mark_running(&name).await;
    debug!("Module '{}' started", name);

    let run_name = name.clone();
    let mut run = tokio::task::spawn_blocking(move || registry.run_by_name(&run_name, &params));

    let expired = async {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => future::pending::<()>().await,
        }
    };

    let joined = tokio::select! {
        joined = &mut run => joined,
        _ = expired => {
            board.mark_timeout(&name).await;
            warn!("Module '{}' exceeded the batch timeout and is still running", name);
            run.await
        }
    };

    let result = match joined {
        Ok(result) => result,
        Err(e) => Err(anyhow::anyhow!("module panicked: {}", e)),
    };

    let status = board.mark_exited(&name, result.is_ok()).await;
    let state = status.as_ref().map_or(ModuleState::Failed, |s| s.state);
    let elapsed_secs = status
        .as_ref()
        .and_then(|s| s.elapsed)
        .map_or(0.0, |d| d.as_secs_f64());

    match result {
        Ok(summary) => {
            if state == ModuleState::Timeout {
                warn!(
                    "Module '{}' finished after the timeout ({:.1}s, {} records)",
                    name, elapsed_secs, summary.records_written
                );
            } else {
                info!(
                    "Module '{}' completed in {:.1}s ({} records, {} warnings)",
                    name,
                    elapsed_secs,
                    summary.records_written,
                    summary.warnings.len()
                );
            }
            ModuleOutcome {
                name,
                state,
                elapsed_secs,
                summary: Some(summary),
                error: None,
            }
        }
        Err(e) => {
            error!("Module '{}' failed: {:#}", name, e);
            ModuleOutcome {
                name,
                state,
                elapsed_secs,
                summary: None,
                error: Some(format!("{:#}", e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::module::Module;
    use crate::models::ExportFormat;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;

    /// Sleeps, tracking how many instances run at once.
    struct GaugedModule {
        name: String,
        sleep: Duration,
        current: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl Module for GaugedModule {
        fn name(&self) -> &str {
            &self.name
        }

        fn description(&self) -> &str {
            "sleeps while holding a slot"
        }

        fn run(&self, _params: &ModuleParams) -> anyhow::Result<RunSummary> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(self.sleep);
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(RunSummary::new())
        }
    }

    struct FailingModule;

    impl Module for FailingModule {
        fn name(&self) -> &str {
            "failing"
        }

        fn description(&self) -> &str {
            "always fails"
        }

        fn run(&self, _params: &ModuleParams) -> anyhow::Result<RunSummary> {
            anyhow::bail!("source database is locked")
        }
    }

    struct PanickingModule;

    impl Module for PanickingModule {
        fn name(&self) -> &str {
            "panicking"
        }

        fn description(&self) -> &str {
            "panics"
        }

        fn run(&self, _params: &ModuleParams) -> anyhow::Result<RunSummary> {
            panic!("corrupt input")
        }
    }

    struct SlowModule {
        sleep: Duration,
        finished: Arc<AtomicBool>,
    }

    impl Module for SlowModule {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "outlives the batch deadline"
        }

        fn run(&self, _params: &ModuleParams) -> anyhow::Result<RunSummary> {
            thread::sleep(self.sleep);
            self.finished.store(true, Ordering::SeqCst);
            Ok(RunSummary {
                records_written: 3,
                ..RunSummary::default()
            })
        }
    }

    fn params() -> Arc<ModuleParams> {
        Arc::new(ModuleParams::new(ExportFormat::Json, std::env::temp_dir()))
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_options_normalization() {
        let options = DispatchOptions::new(0, Some(Duration::ZERO));
        assert_eq!(options.parallelism, 1);
        assert_eq!(options.timeout, None);

        let options = DispatchOptions::from_secs(4, 30);
        assert_eq!(options.timeout, Some(Duration::from_secs(30)));

        let options = DispatchOptions::new(usize::MAX, None);
        assert_eq!(options.parallelism, Semaphore::MAX_PERMITS);
    }

    fn gauged_registry(name: &str, sleep: Duration) -> (ModuleRegistry, Arc<AtomicUsize>) {
        let peak = Arc::new(AtomicUsize::new(0));
        let mut registry = ModuleRegistry::new();
        registry.register(GaugedModule {
            name: name.to_string(),
            sleep,
            current: Arc::new(AtomicUsize::new(0)),
            peak: Arc::clone(&peak),
        });
        (registry, peak)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_out_of_range_limits_run_unbounded() {
        let (registry, _) = gauged_registry("gauged", Duration::from_millis(5));
        let dispatcher = Dispatcher::new(Arc::new(registry));

        let report = dispatcher
            .dispatch(&names(&["gauged"]), params(), DispatchOptions::from_secs(1, u64::MAX))
            .await;
        assert_eq!(report.get("gauged").unwrap().state, ModuleState::Completed);

        let report = dispatcher
            .dispatch(&names(&["gauged"]), params(), DispatchOptions::new(usize::MAX, None))
            .await;
        assert_eq!(report.get("gauged").unwrap().state, ModuleState::Completed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_repeated_names_run_once() {
        let (registry, peak) = gauged_registry("dup", Duration::from_millis(50));
        let dispatcher = Dispatcher::new(Arc::new(registry));

        let report = dispatcher
            .dispatch(&names(&["dup", "dup"]), params(), DispatchOptions::new(2, None))
            .await;

        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.get("dup").unwrap().state, ModuleState::Completed);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallelism_is_bounded() {
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut registry = ModuleRegistry::new();
        let mut requested = Vec::new();
        for i in 0..12 {
            let name = format!("gauged_{}", i);
            registry.register(GaugedModule {
                name: name.clone(),
                sleep: Duration::from_millis(30),
                current: Arc::clone(&current),
                peak: Arc::clone(&peak),
            });
            requested.push(name);
        }

        let dispatcher = Dispatcher::new(Arc::new(registry));
        let report = dispatcher
            .dispatch(&requested, params(), DispatchOptions::new(3, None))
            .await;

        assert_eq!(report.count(ModuleState::Completed), 12);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failure_is_isolated() {
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut registry = ModuleRegistry::new();
        registry.register(FailingModule);
        registry.register(PanickingModule);
        registry.register(GaugedModule {
            name: "healthy".to_string(),
            sleep: Duration::from_millis(5),
            current,
            peak,
        });

        let dispatcher = Dispatcher::new(Arc::new(registry));
        let report = dispatcher
            .dispatch(
                &names(&["failing", "panicking", "healthy", "unknown"]),
                params(),
                DispatchOptions::new(2, None),
            )
            .await;

        assert_eq!(report.outcomes.len(), 4);
        assert_eq!(report.get("healthy").unwrap().state, ModuleState::Completed);

        let failing = report.get("failing").unwrap();
        assert_eq!(failing.state, ModuleState::Failed);
        assert!(failing.error.as_ref().unwrap().contains("locked"));

        assert_eq!(report.get("panicking").unwrap().state, ModuleState::Failed);

        let unknown = report.get("unknown").unwrap();
        assert_eq!(unknown.state, ModuleState::Failed);
        assert!(unknown.error.as_ref().unwrap().contains("module not found"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_timeout_does_not_stop_module() {
        let finished = Arc::new(AtomicBool::new(false));
        let mut registry = ModuleRegistry::new();
        registry.register(SlowModule {
            sleep: Duration::from_millis(400),
            finished: Arc::clone(&finished),
        });

        let dispatcher = Dispatcher::new(Arc::new(registry));
        let board = dispatcher.board().clone();
        let started = std::time::Instant::now();

        let watcher = tokio::spawn(async move {
            // well after the deadline, well before the module returns
            tokio::time::sleep(Duration::from_millis(200)).await;
            board.get("slow").await
        });

        let report = dispatcher
            .dispatch(
                &names(&["slow"]),
                params(),
                DispatchOptions::new(1, Some(Duration::from_millis(50))),
            )
            .await;

        let mid_run = watcher.await.unwrap().unwrap();
        assert_eq!(mid_run.state, ModuleState::Timeout);
        assert!(!mid_run.exited);

        // dispatch returned only after the module really finished
        assert!(finished.load(Ordering::SeqCst));
        assert!(started.elapsed() >= Duration::from_millis(400));

        let outcome = report.get("slow").unwrap();
        assert_eq!(outcome.state, ModuleState::Timeout);
        assert_eq!(outcome.records_written(), 3);
        assert!(outcome.elapsed_secs >= 0.4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_empty_batch() {
        let dispatcher = Dispatcher::new(Arc::new(ModuleRegistry::new()));
        let report = dispatcher
            .dispatch(&[], params(), DispatchOptions::default())
            .await;
        assert!(report.outcomes.is_empty());
        assert_eq!(report.total_records(), 0);
    }
}
