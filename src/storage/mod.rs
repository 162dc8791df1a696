use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::engine::{DEFAULT_JAVA_ARGS, DEFAULT_TARGET};

const HEADER: &str = "# cat-launcher settings";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LauncherSettings {
    pub username: String,
    pub target_id: String,
    pub java_args: String,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            username: String::new(),
            target_id: DEFAULT_TARGET.into(),
            java_args: DEFAULT_JAVA_ARGS.into(),
        }
    }
}

/// Reads and writes the `key=value` settings file. Created once at startup
/// and handed to whoever needs it.
#[derive(Clone, Debug)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable files yield defaults.
    pub fn load(&self) -> LauncherSettings {
        match fs::read_to_string(&self.path) {
            Ok(text) => parse(&text),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("settings: {} not found, using defaults", self.path.display());
                LauncherSettings::default()
            }
            Err(err) => {
                warn!(
                    "settings: unable to read {} ({err}); using defaults",
                    self.path.display()
                );
                LauncherSettings::default()
            }
        }
    }

    /// Replace the whole file with `settings`.
    pub fn save(&self, settings: &LauncherSettings) -> Result<(), String> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| format!("unable to create settings dir: {e}"))?;
        }
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, render(settings))
            .map_err(|e| format!("unable to write settings: {e}"))?;
        fs::rename(&staging, &self.path).map_err(|e| format!("unable to persist settings: {e}"))?;
        debug!("settings: saved to {}", self.path.display());
        Ok(())
    }
}

fn parse(text: &str) -> LauncherSettings {
    let mut settings = LauncherSettings::default();
    for line in text.lines() {
        let line = line.trim_start();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, raw)) = line.split_once('=') else {
            continue;
        };
        let value = raw.trim().to_owned();
        match key.trim() {
            // Player names are kept exactly as typed.
            "username" => settings.username = raw.to_owned(),
            // Older files used `version`.
            "target_id" | "version" if !value.is_empty() => settings.target_id = value,
            "java_args" => settings.java_args = value,
            _ => {}
        }
    }
    settings
}

fn render(settings: &LauncherSettings) -> String {
    format!(
        "{HEADER}\nusername={}\ntarget_id={}\njava_args={}\n",
        single_line(&settings.username),
        single_line(&settings.target_id),
        single_line(&settings.java_args),
    )
}

fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}
