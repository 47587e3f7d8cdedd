//! Per-module run state and the live status table.
//!
//! The [`StatusBoard`] is the only mutable structure shared between dispatch
//! tasks. The [`StatusReporter`] only ever reads it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleState {
    Waiting,
    Running,
    Completed,
    Failed,
    Timeout,
}

impl ModuleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleState::Waiting => "waiting",
            ModuleState::Running => "running",
            ModuleState::Completed => "completed",
            ModuleState::Failed => "failed",
            ModuleState::Timeout => "timeout",
        }
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ModuleStatus {
    /// Set when the task is created, reset when it acquires its slot.
    pub start: Instant,
    pub state: ModuleState,
    /// Frozen once `run` has really returned.
    pub elapsed: Option<Duration>,
    /// `run` has returned. A module in `Timeout` may still be executing.
    pub exited: bool,
}

impl ModuleStatus {
    fn waiting() -> Self {
        Self {
            start: Instant::now(),
            state: ModuleState::Waiting,
            elapsed: None,
            exited: false,
        }
    }

    /// Elapsed run time, live until the module exits.
    pub fn elapsed(&self) -> Duration {
        self.elapsed.unwrap_or_else(|| self.start.elapsed())
    }
}

/// Shared `module name → status` map.
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    inner: Arc<Mutex<HashMap<String, ModuleStatus>>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn mark_waiting(&self, name: &str) {
        let mut map = self.inner.lock().await;
        map.insert(name.to_string(), ModuleStatus::waiting());
    }

    pub async fn mark_running(&self, name: &str) {
        let mut map = self.inner.lock().await;
        let status = map
            .entry(name.to_string())
            .or_insert_with(ModuleStatus::waiting);
        status.start = Instant::now();
        status.state = ModuleState::Running;
    }

    /// Annotate a still-executing module as past the deadline.
    pub async fn mark_timeout(&self, name: &str) {
        let mut map = self.inner.lock().await;
        if let Some(status) = map.get_mut(name) {
            if !status.exited {
                status.state = ModuleState::Timeout;
            }
        }
    }

    /// Record the real exit of `run`.
    ///
    /// A module already marked `Timeout` keeps that state; only its elapsed
    /// time is frozen.
    pub async fn mark_exited(&self, name: &str, success: bool) -> Option<ModuleStatus> {
        let mut map = self.inner.lock().await;
        let status = map.get_mut(name)?;
        status.elapsed = Some(status.start.elapsed());
        status.exited = true;
        if status.state != ModuleState::Timeout {
            status.state = if success {
                ModuleState::Completed
            } else {
                ModuleState::Failed
            };
        }
        Some(status.clone())
    }

    pub async fn get(&self, name: &str) -> Option<ModuleStatus> {
        self.inner.lock().await.get(name).cloned()
    }

    /// Copy of every status, sorted by module name.
    pub async fn snapshot(&self) -> Vec<(String, ModuleStatus)> {
        let map = self.inner.lock().await;
        let mut entries: Vec<_> = map
            .iter()
            .map(|(name, status)| (name.clone(), status.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub async fn count_in(&self, state: ModuleState) -> usize {
        let map = self.inner.lock().await;
        map.values().filter(|s| s.state == state).count()
    }
}

/// Render the status table: one `module  state  elapsed/limit` line per module.
pub fn render_table(entries: &[(String, ModuleStatus)], limit: Option<Duration>) -> String {
    let width = entries
        .iter()
        .map(|(name, _)| name.len())
        .max()
        .unwrap_or(0)
        .max("MODULE".len());
    let limit = match limit {
        Some(limit) => format!("{}s", limit.as_secs()),
        None => "-".to_string(),
    };

    let mut out = format!("{:<width$}  {:<9}  {}\n", "MODULE", "STATUS", "ELAPSED", width = width);
    for (name, status) in entries {
        out.push_str(&format!(
            "{:<width$}  {:<9}  {:.1}s/{}\n",
            name,
            status.state.as_str(),
            status.elapsed().as_secs_f64(),
            limit,
            width = width
        ));
    }
    out
}

/// Destination of rendered status tables.
pub type StatusSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Periodically renders the board until stopped.
pub struct StatusReporter {
    board: StatusBoard,
    interval: Duration,
    limit: Option<Duration>,
    sink: StatusSink,
}

impl StatusReporter {
    pub fn new(
        board: StatusBoard,
        interval: Duration,
        limit: Option<Duration>,
        sink: StatusSink,
    ) -> Self {
        Self {
            board,
            interval,
            limit,
            sink,
        }
    }

    /// Reporter printing to stderr.
    pub fn to_stderr(board: StatusBoard, interval: Duration, limit: Option<Duration>) -> Self {
        Self::new(board, interval, limit, Arc::new(|table: &str| eprint!("{}", table)))
    }

    /// Start ticking on the current runtime. A final table is rendered on stop.
    pub fn spawn(self) -> ReporterHandle {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => self.render().await,
                }
            }
            self.render().await;
            debug!("Status reporter stopped");
        });

        ReporterHandle { shutdown, task }
    }

    async fn render(&self) {
        let entries = self.board.snapshot().await;
        if entries.is_empty() {
            return;
        }
        (self.sink)(&render_table(&entries, self.limit));
    }
}

pub struct ReporterHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl ReporterHandle {
    /// Stop ticking and wait for the final render.
    pub async fn stop(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            debug!("Status reporter task ended abnormally: {}", e);
        }
    }
}
