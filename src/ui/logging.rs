use env_logger::Env;
use indicatif::MultiProgress;
use log::{Log, Metadata, Record};

/// env_logger output that hides the progress bars while a line is written.
struct BarAwareLogger {
    inner: env_logger::Logger,
    bars: MultiProgress,
}

impl Log for BarAwareLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if self.inner.matches(record) {
            self.bars.suspend(|| self.inner.log(record));
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Install the process logger (`RUST_LOG`, default `info`) and return the
/// bar group every progress bar has to join.
pub fn init() -> MultiProgress {
    let bars = MultiProgress::new();
    let inner = env_logger::Builder::from_env(Env::default().default_filter_or("info")).build();
    let level = inner.filter();
    match log::set_boxed_logger(Box::new(BarAwareLogger {
        inner,
        bars: bars.clone(),
    })) {
        Ok(()) => log::set_max_level(level),
        Err(err) => eprintln!("warning: logger already installed ({err})"),
    }
    bars
}
