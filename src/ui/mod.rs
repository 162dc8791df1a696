use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{error, info, warn};
use tokio::runtime::{Builder, Runtime};
use tokio::sync::mpsc;

use crate::engine::backend::MinecraftBackend;
use crate::engine::error::LaunchError;
use crate::engine::state::{LaunchRequest, ProgressEvent, WorkerEvent};
use crate::engine::{DEFAULT_TARGET, LaunchWorker, TargetEntry, WorkerConfig, load_catalog};
use crate::env;
use crate::networking::NetworkClient;
use crate::storage::{LauncherSettings, SettingsStore};

pub mod logging;

const CATALOG_RETRY_DELAY: Duration = Duration::from_secs(1);
const SPINNER_TEMPLATE: &str = "{spinner:.green} {wide_msg}";
const BAR_TEMPLATE: &str = "{msg:24} [{bar:40.cyan/blue}] {pos}/{len}";
/// Shell convention for "terminated by SIGINT".
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Everything the terminal front end needs, resolved from the command line.
#[derive(Debug, Clone)]
pub struct FrontendOptions {
    pub root: PathBuf,
    /// Explicit java executable; without one the version's Java runtime is provisioned.
    pub java: Option<PathBuf>,
    pub username: Option<String>,
    pub target: Option<String>,
    pub java_args: Option<String>,
    pub install_timeout: Option<Duration>,
    pub catalog_retries: u32,
    pub list_versions: bool,
}

/// What happened to a launch attempt.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct LaunchOutcome {
    pub error: Option<LaunchError>,
    pub exit_code: Option<i32>,
}

impl LaunchOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

fn build_runtime() -> Arc<Runtime> {
    match Runtime::new() {
        Ok(rt) => Arc::new(rt),
        Err(err) => {
            warn!(
                "ui: failed to create multithreaded runtime ({}); trying single-threaded runtime",
                err
            );
            match Builder::new_current_thread().enable_all().build() {
                Ok(rt) => Arc::new(rt),
                Err(fallback_err) => {
                    error!(
                        "ui: failed to create any Tokio runtime ({}); terminating launcher",
                        fallback_err
                    );
                    std::process::exit(1);
                }
            }
        }
    }
}

/// Load settings, pick a version, launch it and follow the worker until idle.
pub fn run(options: FrontendOptions, bars: MultiProgress) -> Result<LaunchOutcome, String> {
    let runtime = build_runtime();
    env::ensure_base_dirs(&options.root)
        .map_err(|e| format!("unable to prepare {}: {e}", options.root.display()))?;

    let store = SettingsStore::new(env::settings_path(&options.root));
    info!("ui: settings file {}", store.path().display());
    let mut settings = store.load();
    apply_overrides(&mut settings, &options);

    let backend = Arc::new(MinecraftBackend::new(NetworkClient::new(), options.java.clone()));
    let catalog = runtime.block_on(load_catalog(
        backend.as_ref(),
        options.catalog_retries,
        CATALOG_RETRY_DELAY,
    ));

    match catalog {
        Ok(targets) => {
            if options.list_versions {
                print_catalog(&targets);
                return Ok(LaunchOutcome::default());
            }
            if let Some(notice) = unknown_target_notice(&targets, &settings.target_id) {
                warn!("ui: {notice}");
                eprintln!("warning: {notice}");
            }
        }
        Err(err) => {
            eprintln!("warning: {err}");
            if options.list_versions {
                return Err(err.to_string());
            }
            if settings.target_id.is_empty() {
                settings.target_id = DEFAULT_TARGET.into();
            }
            eprintln!("warning: continuing with version {}", settings.target_id);
        }
    }

    if let Err(err) = store.save(&settings) {
        warn!("ui: {err}");
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let worker = LaunchWorker::new(
        backend,
        Arc::new(tx),
        runtime.handle().clone(),
        WorkerConfig {
            install_dir: options.root.clone(),
            install_timeout: options.install_timeout,
        },
    );
    let request = LaunchRequest::new(
        settings.target_id.as_str(),
        settings.username.as_str(),
        &settings.java_args,
    );
    info!("ui: launching {}", request.target_id());
    worker.submit(request).map_err(|e| e.to_string())?;

    let view = LaunchView::new(bars.add(ProgressBar::new_spinner()));
    let outcome = runtime.block_on(follow(rx, view, || worker.cancel()));
    Ok(outcome)
}

fn apply_overrides(settings: &mut LauncherSettings, options: &FrontendOptions) {
    if let Some(username) = &options.username {
        settings.username = username.clone();
    }
    if let Some(target) = options.target.as_deref().map(str::trim) {
        if !target.is_empty() {
            settings.target_id = target.to_owned();
        }
    }
    if let Some(java_args) = &options.java_args {
        settings.java_args = java_args.trim().to_owned();
    }
}

fn unknown_target_notice(targets: &[TargetEntry], target_id: &str) -> Option<String> {
    if targets.iter().any(|entry| entry.id == target_id) {
        None
    } else {
        Some(format!(
            "version {target_id} is not in the published list; trying a local install"
        ))
    }
}

fn print_catalog(targets: &[TargetEntry]) {
    for entry in targets {
        println!("{:<24} {}", entry.id, entry.kind);
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Interrupt {
    Cancel,
    Exit,
}

/// The first Ctrl-C asks the worker to cancel, any further one exits.
fn on_interrupt(count: u32) -> Interrupt {
    if count <= 1 {
        Interrupt::Cancel
    } else {
        Interrupt::Exit
    }
}

/// Drain worker events until idle.
async fn follow(
    mut rx: mpsc::UnboundedReceiver<WorkerEvent>,
    mut view: LaunchView,
    cancel: impl Fn(),
) -> LaunchOutcome {
    let mut interrupts = 0u32;
    let mut listening = true;
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => {
                    if view.apply(event) {
                        break;
                    }
                }
                None => break,
            },
            signal = tokio::signal::ctrl_c(), if listening => match signal {
                Ok(()) => {
                    interrupts += 1;
                    match on_interrupt(interrupts) {
                        Interrupt::Cancel => {
                            warn!("ui: interrupt received, cancelling install (press Ctrl-C again to quit)");
                            cancel();
                        }
                        Interrupt::Exit => {
                            warn!("ui: second interrupt, exiting");
                            view.bar.abandon();
                            std::process::exit(INTERRUPTED_EXIT_CODE);
                        }
                    }
                }
                Err(err) => {
                    warn!("ui: unable to listen for Ctrl-C: {err}");
                    listening = false;
                }
            },
        }
    }
    view.finish()
}

/// Turns worker events into terminal output.
struct LaunchView {
    bar: ProgressBar,
    determinate: bool,
    outcome: LaunchOutcome,
}

impl LaunchView {
    fn new(bar: ProgressBar) -> Self {
        bar.set_style(spinner_style());
        Self {
            bar,
            determinate: false,
            outcome: LaunchOutcome::default(),
        }
    }

    /// Returns true once the worker is idle again.
    fn apply(&mut self, event: WorkerEvent) -> bool {
        match event {
            WorkerEvent::Busy(true) => {
                self.bar.set_message("Preparing launch");
                self.bar.enable_steady_tick(Duration::from_millis(100));
            }
            WorkerEvent::Busy(false) => {
                self.bar.finish_and_clear();
                return true;
            }
            WorkerEvent::Progress(progress) => self.show_progress(&progress),
            WorkerEvent::Error(err) => {
                self.bar.suspend(|| eprintln!("error: {err}"));
                self.outcome.error = Some(err);
            }
            WorkerEvent::Exited(code) => {
                let text = match code {
                    Some(code) => format!("Game exited with code {code}"),
                    None => "Game was terminated".to_owned(),
                };
                self.bar.suspend(|| println!("{text}"));
                self.outcome.exit_code = code;
            }
        }
        false
    }

    fn show_progress(&mut self, progress: &ProgressEvent) {
        if progress.is_indeterminate() {
            if self.determinate {
                self.bar.set_style(spinner_style());
                self.determinate = false;
            }
        } else {
            if !self.determinate {
                self.bar.set_style(bar_style());
                self.determinate = true;
            }
            self.bar.set_length(progress.maximum);
            self.bar.set_position(progress.current);
        }
        self.bar.set_message(progress.label.clone());
    }

    fn finish(self) -> LaunchOutcome {
        self.outcome
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template(SPINNER_TEMPLATE).unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(BAR_TEMPLATE).unwrap_or_else(|_| ProgressStyle::default_bar())
}
