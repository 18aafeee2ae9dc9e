//! Step runner: executes selected review steps against content, files, or a
//! list of files, isolating every step's failure from the rest of the run.
//!
//! Steps run on the blocking pool, bounded by `max_workers`. Each step sees
//! the same immutable snapshot of the content. A step that returns an error,
//! panics, or exceeds the per-step timeout is recorded as `failed` and the
//! run carries on. Cancellation is checked before every dispatch; steps not
//! yet dispatched are marked `skipped`.

pub mod cancel;
pub mod report;

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

use crate::config::ReviewConfig;
use crate::domain::{Issue, StepContext, StepDescriptor};
use crate::error::{RunError, RunResult, StepError};
use crate::files::{FileAccess, OsFileAccess};
use crate::metrics::METRICS;
use crate::obs::{emit_run_finished, emit_run_started, emit_step_failed, emit_step_finished};
use crate::progress::ProgressTracker;

pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use report::{DirectoryReport, FileReport, RunReport, StepFailure};

/// Executes review steps. Cheap to share; holds no per-run state.
#[derive(Clone)]
pub struct StepRunner {
    config: ReviewConfig,
    files: Arc<dyn FileAccess>,
    cancel: Option<CancelSignal>,
    step_timeout: Option<Duration>,
}

impl std::fmt::Debug for StepRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepRunner")
            .field("config", &self.config)
            .field("cancel", &self.cancel)
            .field("step_timeout", &self.step_timeout)
            .finish_non_exhaustive()
    }
}

impl StepRunner {
    pub fn new(config: ReviewConfig) -> Self {
        Self::with_file_access(config, Arc::new(OsFileAccess))
    }

    pub fn with_file_access(config: ReviewConfig, files: Arc<dyn FileAccess>) -> Self {
        Self {
            step_timeout: config.step_timeout(),
            config,
            files,
            cancel: None,
        }
    }

    /// Override the configured per-step timeout. `None` disables it.
    pub fn with_step_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Observe `signal` between step dispatches in every run.
    pub fn with_cancel_signal(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }

    pub fn config(&self) -> &ReviewConfig {
        &self.config
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelSignal::is_cancelled)
    }

    /// Run `steps` over `content`. Never fails: step errors land in the
    /// report's `failures` and `progress`.
    pub async fn run_on_content(
        &self,
        content: &str,
        context: &StepContext,
        steps: &[Arc<StepDescriptor>],
    ) -> RunReport {
        let run_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("vaahai.run", run_id = %run_id);
        self.run_inner(run_id, content, context, steps)
            .instrument(span)
            .await
    }

    async fn run_inner(
        &self,
        run_id: String,
        content: &str,
        context: &StepContext,
        steps: &[Arc<StepDescriptor>],
    ) -> RunReport {
        let start = Instant::now();

        let mut seen = HashSet::new();
        let steps: Vec<Arc<StepDescriptor>> = steps
            .iter()
            .filter(|s| seen.insert(s.id.clone()))
            .cloned()
            .collect();

        emit_run_started(&run_id, steps.len());

        let tracker = Arc::new(ProgressTracker::new(steps.iter().map(|s| s.id.as_str())));
        let content: Arc<str> = Arc::from(content);
        let context = Arc::new(context.clone());
        let timeout = self.step_timeout;
        let sem = Arc::new(Semaphore::new(self.config.max_workers.max(1)));

        let mut tasks: Vec<(usize, JoinHandle<Result<Vec<Issue>, StepError>>)> = Vec::new();
        let mut cancelled = false;

        for (i, step) in steps.iter().enumerate() {
            if self.is_cancelled() {
                cancelled = true;
                skip_remaining(&tracker, &steps[i..]);
                break;
            }

            let permit = match Arc::clone(&sem).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    cancelled = true;
                    skip_remaining(&tracker, &steps[i..]);
                    break;
                }
            };

            // Steps may have finished while we waited for a worker; check again.
            if self.is_cancelled() {
                cancelled = true;
                skip_remaining(&tracker, &steps[i..]);
                break;
            }

            let step = Arc::clone(step);
            let tracker = Arc::clone(&tracker);
            let content = Arc::clone(&content);
            let context = Arc::clone(&context);
            let run_id = run_id.clone();

            let task = tokio::spawn(
                async move {
                    if let Err(e) = tracker.start(&step.id) {
                        warn!(step_id = %step.id, error = %e, "progress start rejected");
                    }
                    let step_start = Instant::now();
                    let outcome = execute_step(&step, content, context, timeout, permit).await;

                    match &outcome {
                        Ok(issues) => {
                            let _ = tracker.complete(&step.id);
                            METRICS.inc_steps_executed();
                            emit_step_finished(
                                &run_id,
                                &step.id,
                                issues.len(),
                                step_start.elapsed().as_millis() as u64,
                            );
                        }
                        Err(e) => {
                            let _ = tracker.fail(&step.id, e.to_string());
                            METRICS.inc_steps_executed();
                            METRICS.inc_steps_failed();
                            emit_step_failed(&run_id, &step.id, e);
                        }
                    }
                    outcome
                }
                .in_current_span(),
            );
            tasks.push((i, task));
        }

        let mut per_step: Vec<Vec<Issue>> = vec![Vec::new(); steps.len()];
        let mut failures = Vec::new();

        for (i, task) in tasks {
            match task.await {
                Ok(Ok(issues)) => per_step[i] = issues,
                Ok(Err(e)) => failures.push(StepFailure::from(e)),
                Err(join_err) => {
                    let err = StepError::Panicked {
                        step_id: steps[i].id.clone(),
                        message: join_err.to_string(),
                    };
                    let _ = tracker.fail(&steps[i].id, err.to_string());
                    failures.push(StepFailure::from(err));
                }
            }
        }

        let issues: Vec<Issue> = per_step.into_iter().flatten().collect();
        let duration_ms = start.elapsed().as_millis() as u64;
        emit_run_finished(&run_id, duration_ms, issues.len(), failures.len(), cancelled);

        RunReport {
            run_id,
            issues,
            progress: tracker.snapshot(),
            failures,
            cancelled,
            duration_ms,
        }
    }

    /// Read `path` through the file-access collaborator and run `steps` on it.
    ///
    /// A missing or unreadable file is a run-level error, distinct from any
    /// step failure.
    pub async fn run_on_file(
        &self,
        path: &Path,
        steps: &[Arc<StepDescriptor>],
    ) -> RunResult<FileReport> {
        let content = self.files.read(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => RunError::FileNotFound {
                path: path.to_path_buf(),
            },
            _ => RunError::FileUnreadable {
                path: path.to_path_buf(),
                source: e,
            },
        })?;

        let mut context = StepContext::for_file(path);
        if let Some(language) = language_for_path(path) {
            context = context.with_language(language);
        }

        let report = self.run_on_content(&content, &context, steps).await;
        Ok(FileReport {
            path: path.to_path_buf(),
            line_count: content.lines().count(),
            report,
        })
    }

    /// Run `steps` over every path in `paths`. A file that cannot be read is
    /// recorded under `failures` and the remaining files are still reviewed.
    pub async fn run_on_directory(
        &self,
        paths: &[PathBuf],
        steps: &[Arc<StepDescriptor>],
    ) -> DirectoryReport {
        let mut report = DirectoryReport::default();
        for path in paths {
            match self.run_on_file(path, steps).await {
                Ok(file) => {
                    report.files.insert(path.clone(), file);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "file review failed");
                    report.failures.insert(path.clone(), e.to_string());
                }
            }
        }
        debug!(
            files = report.files.len(),
            failed = report.failures.len(),
            "directory review finished"
        );
        report
    }
}

fn skip_remaining(tracker: &ProgressTracker, steps: &[Arc<StepDescriptor>]) {
    for step in steps {
        if tracker.skip(&step.id).is_ok() {
            METRICS.inc_steps_skipped();
        }
    }
}

async fn execute_step(
    step: &StepDescriptor,
    content: Arc<str>,
    context: Arc<StepContext>,
    timeout: Option<Duration>,
    permit: OwnedSemaphorePermit,
) -> Result<Vec<Issue>, StepError> {
    let executor = step.executor();
    // The worker slot is held until the executor returns, even after a timeout
    // has already been reported.
    let handle = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        executor.execute(&content, &context)
    });

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, handle).await {
            Ok(joined) => joined,
            Err(_) => {
                return Err(StepError::Timeout {
                    step_id: step.id.clone(),
                    timeout_ms: limit.as_millis() as u64,
                })
            }
        },
        None => handle.await,
    };

    match joined {
        Ok(Ok(issues)) => Ok(issues.into_iter().map(|i| i.from_step(&step.id)).collect()),
        Ok(Err(e)) => Err(StepError::Execution {
            step_id: step.id.clone(),
            message: format!("{e:#}"),
        }),
        Err(join_err) => Err(StepError::Panicked {
            step_id: step.id.clone(),
            message: panic_message(join_err),
        }),
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => {
            if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "non-string panic payload".to_string()
            }
        }
        Err(err) => err.to_string(),
    }
}

/// Best-effort language hint from a file extension.
pub fn language_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?;
    let language = match ext.to_ascii_lowercase().as_str() {
        "py" | "pyi" => "python",
        "js" | "mjs" | "cjs" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "rs" => "rust",
        "php" => "php",
        "go" => "go",
        "java" => "java",
        "rb" => "ruby",
        _ => return None,
    };
    Some(language)
}
