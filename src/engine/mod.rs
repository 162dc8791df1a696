use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::command::LaunchOptions;
use crate::engine::error::LaunchError;
use crate::engine::state::{
    InstallProgress, LaunchRequest, ProgressEvent, ProgressTracker, WorkerEvent,
};
use crate::identity::{new_session_id, resolve_player_name};

pub mod backend;
pub mod error;
pub mod models;
pub mod state;

/// Used when the version list cannot be fetched and nothing was saved.
pub const DEFAULT_TARGET: &str = "1.8.9";
pub const DEFAULT_JAVA_ARGS: &str = "-Xmx2G -Xms1G";

/// Receives partial installer updates.
pub type ProgressSink<'a> = &'a mut (dyn FnMut(InstallProgress) + Send);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetEntry {
    pub id: String,
    /// `release`, `snapshot`, `old_beta`, ...
    pub kind: String,
}

pub trait VersionCatalog: Send + Sync {
    fn list_available_targets(
        &self,
    ) -> impl Future<Output = Result<Vec<TargetEntry>, String>> + Send;
}

/// Installs, builds the command line for, and runs a target.
pub trait LaunchBackend: Send + Sync + 'static {
    fn install(
        &self,
        target_id: &str,
        install_dir: &Path,
        progress: ProgressSink<'_>,
        cancel: &Option<Arc<AtomicBool>>,
    ) -> impl Future<Output = Result<(), String>> + Send;

    fn build_launch_command(
        &self,
        target_id: &str,
        install_dir: &Path,
        options: &LaunchOptions,
    ) -> Result<Vec<String>, String>;

    /// Blocks until the process exits.
    fn run(&self, argv: &[String], install_dir: &Path) -> Result<Option<i32>, String>;
}

/// Receives worker notifications. Called from the worker's threads.
///
/// `on_busy_changed` runs while the worker holds its busy lock, so it must not
/// call back into `LaunchWorker::submit`.
pub trait LaunchObserver: Send + Sync + 'static {
    fn on_busy_changed(&self, busy: bool);
    fn on_progress(&self, event: ProgressEvent);
    fn on_error(&self, error: LaunchError);
    fn on_exited(&self, _code: Option<i32>) {}
}

impl LaunchObserver for mpsc::UnboundedSender<WorkerEvent> {
    fn on_busy_changed(&self, busy: bool) {
        let _ = self.send(WorkerEvent::Busy(busy));
    }

    fn on_progress(&self, event: ProgressEvent) {
        let _ = self.send(WorkerEvent::Progress(event));
    }

    fn on_error(&self, error: LaunchError) {
        let _ = self.send(WorkerEvent::Error(error));
    }

    fn on_exited(&self, code: Option<i32>) {
        let _ = self.send(WorkerEvent::Exited(code));
    }
}

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub install_dir: PathBuf,
    pub install_timeout: Option<Duration>,
}

/// Runs one install-then-play cycle at a time off the caller's thread.
pub struct LaunchWorker<B: LaunchBackend> {
    backend: Arc<B>,
    observer: Arc<dyn LaunchObserver>,
    runtime: Handle,
    config: WorkerConfig,
    busy: Arc<Mutex<bool>>,
    cancel_flag: Arc<AtomicBool>,
}

impl<B: LaunchBackend> LaunchWorker<B> {
    pub fn new(
        backend: Arc<B>,
        observer: Arc<dyn LaunchObserver>,
        runtime: Handle,
        config: WorkerConfig,
    ) -> Self {
        Self {
            backend,
            observer,
            runtime,
            config,
            busy: Arc::new(Mutex::new(false)),
            cancel_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_busy(&self) -> bool {
        *lock(&self.busy)
    }

    /// Accept a launch. Busy is raised and reported before this returns.
    pub fn submit(&self, request: LaunchRequest) -> Result<(), LaunchError> {
        {
            let mut busy = lock(&self.busy);
            if *busy {
                warn!(
                    "worker: rejecting launch of {}; another launch is running",
                    request.target_id()
                );
                return Err(LaunchError::Busy);
            }
            *busy = true;
            self.cancel_flag.store(false, Ordering::SeqCst);
            self.observer.on_busy_changed(true);
        }
        let guard = BusyGuard {
            busy: self.busy.clone(),
            observer: self.observer.clone(),
        };

        let job = LaunchJob {
            backend: self.backend.clone(),
            observer: self.observer.clone(),
            config: self.config.clone(),
            cancel_flag: self.cancel_flag.clone(),
        };
        info!("worker: accepted launch of {}", request.target_id());
        self.runtime.spawn(async move {
            let _guard = guard;
            job.run(request).await;
        });
        Ok(())
    }

    /// Ask a running install to stop at its next checkpoint. A running game is left alone.
    pub fn cancel(&self) {
        if self.is_busy() {
            warn!("worker: cancellation requested");
            self.cancel_flag.store(true, Ordering::SeqCst);
        }
    }
}

/// Reports busy=false when dropped, whichever way the launch task ends.
struct BusyGuard {
    busy: Arc<Mutex<bool>>,
    observer: Arc<dyn LaunchObserver>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        // Clear and notify under one lock so busy notifications never reorder.
        let mut busy = lock(&self.busy);
        *busy = false;
        self.observer.on_busy_changed(false);
        debug!("worker: idle");
    }
}

/// A panicking launch task must not wedge the worker, so poisoning is ignored.
fn lock(busy: &Mutex<bool>) -> MutexGuard<'_, bool> {
    busy.lock().unwrap_or_else(PoisonError::into_inner)
}

struct LaunchJob<B: LaunchBackend> {
    backend: Arc<B>,
    observer: Arc<dyn LaunchObserver>,
    config: WorkerConfig,
    cancel_flag: Arc<AtomicBool>,
}

impl<B: LaunchBackend> LaunchJob<B> {
    async fn run(self, request: LaunchRequest) {
        if let Err(err) = self.execute(&request).await {
            error!(
                "worker: launch of {} failed ({}): {err}",
                request.target_id(),
                err.kind()
            );
            self.observer.on_error(err);
        }
    }

    async fn execute(&self, request: &LaunchRequest) -> Result<(), LaunchError> {
        let install_dir = self.config.install_dir.clone();
        self.install(request.target_id(), &install_dir).await?;

        let options = LaunchOptions {
            username: resolve_player_name(request.player_name()),
            session_id: new_session_id(),
            token: String::new(),
            extra_args: request.runtime_args().to_vec(),
        };
        info!(
            "worker: launching {} as {}",
            request.target_id(),
            options.username
        );
        let argv = self
            .backend
            .build_launch_command(request.target_id(), &install_dir, &options)
            .map_err(LaunchError::LaunchFailed)?;

        if self.cancel_flag.load(Ordering::SeqCst) {
            info!("worker: launch of {} cancelled before start", request.target_id());
            return Err(LaunchError::Cancelled);
        }
        let backend = self.backend.clone();
        let code = tokio::task::spawn_blocking(move || backend.run(&argv, &install_dir))
            .await
            .map_err(|e| LaunchError::LaunchFailed(format!("game process task failed: {e}")))?
            .map_err(LaunchError::LaunchFailed)?;
        self.observer.on_exited(code);
        Ok(())
    }

    async fn install(&self, target_id: &str, install_dir: &Path) -> Result<(), LaunchError> {
        let observer = &self.observer;
        let mut tracker = ProgressTracker::default();
        let mut forward = |update: InstallProgress| observer.on_progress(tracker.apply(update));
        let cancel = Some(self.cancel_flag.clone());

        let install = self
            .backend
            .install(target_id, install_dir, &mut forward, &cancel);
        let outcome = match self.config.install_timeout {
            Some(limit) => tokio::time::timeout(limit, install)
                .await
                .map_err(|_| LaunchError::Timeout(limit))?,
            None => install.await,
        };

        outcome.map_err(|err| {
            if self.cancel_flag.load(Ordering::SeqCst) {
                LaunchError::Cancelled
            } else {
                LaunchError::InstallFailed(err)
            }
        })
    }
}

/// Fetch the version list, retrying at most `retries` extra times.
pub async fn load_catalog<C: VersionCatalog>(
    catalog: &C,
    retries: u32,
    delay: Duration,
) -> Result<Vec<TargetEntry>, LaunchError> {
    let mut last_error = String::new();
    for attempt in 0..=retries {
        match catalog.list_available_targets().await {
            Ok(targets) if !targets.is_empty() => {
                debug!("catalog: {} versions available", targets.len());
                return Ok(targets);
            }
            Ok(_) => last_error = "version list is empty".into(),
            Err(err) => last_error = err,
        }
        warn!(
            "catalog: attempt {}/{} failed: {last_error}",
            attempt + 1,
            retries + 1
        );
        if attempt < retries {
            tokio::time::sleep(delay).await;
        }
    }
    Err(LaunchError::CatalogUnavailable(last_error))
}
