use crate::engine::error::LaunchError;
use crate::util::split_args;

/// Everything needed for a single launch attempt. Consumed by the worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchRequest {
    target_id: String,
    player_name: String,
    runtime_args: Vec<String>,
}

impl LaunchRequest {
    pub fn new(
        target_id: impl Into<String>,
        player_name: impl Into<String>,
        runtime_args: &str,
    ) -> Self {
        Self {
            target_id: target_id.into().trim().to_owned(),
            player_name: player_name.into(),
            runtime_args: split_args(runtime_args),
        }
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub fn player_name(&self) -> &str {
        &self.player_name
    }

    pub fn runtime_args(&self) -> &[String] {
        &self.runtime_args
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgressEvent {
    pub current: u64,
    /// Zero means the phase has no known length.
    pub maximum: u64,
    pub label: String,
}

impl ProgressEvent {
    pub fn is_indeterminate(&self) -> bool {
        self.maximum == 0
    }
}

/// Partial update produced by an installer. Each variant touches one field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstallProgress {
    Status(String),
    Progress(u64),
    Max(u64),
}

/// Merges partial installer updates into complete progress triples.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    current: u64,
    maximum: u64,
    label: String,
}

impl ProgressTracker {
    pub fn apply(&mut self, update: InstallProgress) -> ProgressEvent {
        match update {
            InstallProgress::Status(label) => self.label = label,
            InstallProgress::Progress(value) => self.current = value,
            InstallProgress::Max(value) => self.maximum = value,
        }
        if self.maximum > 0 && self.current > self.maximum {
            self.current = self.maximum;
        }
        self.snapshot()
    }

    pub fn snapshot(&self) -> ProgressEvent {
        ProgressEvent {
            current: self.current,
            maximum: self.maximum,
            label: self.label.clone(),
        }
    }
}

/// Events pushed from the worker to the front end.
#[derive(Clone, Debug)]
pub enum WorkerEvent {
    Busy(bool),
    Progress(ProgressEvent),
    Error(LaunchError),
    Exited(Option<i32>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_splits_runtime_args() {
        let request = LaunchRequest::new("1.20.1", "Steve", "-Xmx2G -Xms1G");
        assert_eq!(request.runtime_args(), ["-Xmx2G", "-Xms1G"]);
        assert_eq!(request.target_id(), "1.20.1");
        assert_eq!(request.player_name(), "Steve");
    }

    #[test]
    fn request_allows_empty_fields() {
        let request = LaunchRequest::new(" 1.8.9 ", "", "");
        assert_eq!(request.target_id(), "1.8.9");
        assert!(request.player_name().is_empty());
        assert!(request.runtime_args().is_empty());
    }

    #[test]
    fn request_keeps_player_name_verbatim() {
        let request = LaunchRequest::new("1.8.9", " Steve ", "");
        assert_eq!(request.player_name(), " Steve ");
    }

    #[test]
    fn tracker_merges_partial_updates() {
        let mut tracker = ProgressTracker::default();
        let event = tracker.apply(InstallProgress::Status("Download Libraries".into()));
        assert_eq!(event.label, "Download Libraries");
        assert!(event.is_indeterminate());

        tracker.apply(InstallProgress::Max(40));
        let event = tracker.apply(InstallProgress::Progress(12));
        assert_eq!(
            event,
            ProgressEvent {
                current: 12,
                maximum: 40,
                label: "Download Libraries".into(),
            }
        );
    }

    #[test]
    fn tracker_never_reports_current_above_maximum() {
        let mut tracker = ProgressTracker::default();
        tracker.apply(InstallProgress::Max(10));
        let event = tracker.apply(InstallProgress::Progress(25));
        assert_eq!(event.current, 10);

        tracker.apply(InstallProgress::Progress(8));
        let event = tracker.apply(InstallProgress::Max(3));
        assert_eq!((event.current, event.maximum), (3, 3));

        let event = tracker.apply(InstallProgress::Max(0));
        assert!(event.is_indeterminate());
    }
}
