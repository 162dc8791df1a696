use std::path::Path;
use std::process::{Command, Stdio};

use log::{debug, info, warn};

#[derive(Clone, Default)]
pub struct ProcessLauncher;

impl ProcessLauncher {
    pub fn new() -> Self {
        Self
    }

    /// Spawn `argv` and block until it exits. Output goes to the launcher's own streams.
    pub fn run(&self, argv: &[String], working_dir: &Path) -> Result<Option<i32>, String> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| "launch command is empty".to_owned())?;

        debug!(
            "launch: {} with {} arguments in {}",
            program,
            args.len(),
            working_dir.display()
        );
        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let mut child = cmd
            .spawn()
            .map_err(|e| format!("failed to start game process ({program}): {e}"))?;
        info!("launch: process {} started", child.id());

        let status = child
            .wait()
            .map_err(|e| format!("failed waiting for game process: {e}"))?;
        if status.success() {
            info!("launch: game exited normally");
        } else {
            warn!("launch: game exited with {status}");
        }
        Ok(status.code())
    }
}
