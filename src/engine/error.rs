use std::time::Duration;

use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LaunchError {
    #[error("unable to load the version list: {0}")]
    CatalogUnavailable(String),
    #[error("installation failed: {0}")]
    InstallFailed(String),
    #[error("unable to start the game: {0}")]
    LaunchFailed(String),
    #[error("installation timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("installation cancelled")]
    Cancelled,
    #[error("a launch is already in progress")]
    Busy,
}

impl LaunchError {
    /// Short category name for logs and notices.
    pub fn kind(&self) -> &'static str {
        match self {
            LaunchError::CatalogUnavailable(_) => "CatalogUnavailable",
            LaunchError::InstallFailed(_) => "InstallFailed",
            LaunchError::LaunchFailed(_) => "LaunchFailed",
            LaunchError::Timeout(_) => "Timeout",
            LaunchError::Cancelled => "Cancelled",
            LaunchError::Busy => "Busy",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_user_facing_messages() {
        assert_eq!(
            LaunchError::InstallFailed("version 9.9 not found".into()).to_string(),
            "installation failed: version 9.9 not found"
        );
        assert_eq!(
            LaunchError::Timeout(Duration::from_secs(90)).to_string(),
            "installation timed out after 90s"
        );
        assert_eq!(LaunchError::Busy.kind(), "Busy");
    }
}
