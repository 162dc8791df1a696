use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use log::{error, info};

mod command;
mod engine;
mod env;
mod identity;
mod install;
mod networking;
mod process;
mod runtime;
mod storage;
mod ui;
mod util;

/// Read when `--java` is not given.
const JAVA_OVERRIDE_VAR: &str = "CAT_LAUNCHER_JAVA";

#[derive(Parser, Debug)]
#[command(
    name = "Cat Launcher",
    author,
    version,
    about = "Offline Minecraft launcher: installs the selected version and starts it"
)]
struct Cli {
    /// Player name; a random one is generated when empty.
    #[arg(long)]
    username: Option<String>,

    /// Version to install and launch (e.g. 1.20.1).
    #[arg(long, value_name = "ID")]
    target: Option<String>,

    /// Extra JVM arguments, whitespace separated.
    #[arg(long, value_name = "ARGS", allow_hyphen_values = true)]
    java_args: Option<String>,

    /// Java executable used to run the game; without it the Java runtime
    /// the version asks for is downloaded.
    #[arg(long, value_name = "PATH")]
    java: Option<PathBuf>,

    /// Give up on the install after this many seconds.
    #[arg(long, value_name = "SECS")]
    install_timeout: Option<u64>,

    /// Extra attempts at fetching the version list.
    #[arg(long, value_name = "N", default_value_t = 2)]
    catalog_retries: u32,

    /// Print the available versions and exit.
    #[arg(long)]
    list_versions: bool,

    /// Print launcher version and exit.
    #[arg(long)]
    version_only: bool,
}

fn main() -> ExitCode {
    let bars = ui::logging::init();

    let cli = Cli::parse();
    if cli.version_only {
        println!("Cat Launcher {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    let java = cli.java.or_else(|| {
        std::env::var_os(JAVA_OVERRIDE_VAR)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    });
    let options = ui::FrontendOptions {
        root: env::default_app_dir(),
        java,
        username: cli.username,
        target: cli.target,
        java_args: cli.java_args,
        install_timeout: cli.install_timeout.map(Duration::from_secs),
        catalog_retries: cli.catalog_retries,
        list_versions: cli.list_versions,
    };

    match ui::run(options, bars) {
        Ok(outcome) if outcome.succeeded() => {
            if let Some(code) = outcome.exit_code {
                info!("launcher: game exit code {code}");
            }
            ExitCode::SUCCESS
        }
        Ok(_) => ExitCode::FAILURE,
        Err(err) => {
            error!("launcher: {err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
