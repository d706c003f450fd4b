use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use rootbox::{RootboxOptions, RootboxRuntime};

use crate::commands;

/// rootbox - manage long-lived, root-accessible instances
#[derive(Parser, Debug)]
#[command(name = "rootbox", author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalFlags,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalFlags {
    /// Home directory for instances and logs (default: ~/.rootbox)
    #[arg(long, global = true, env = "ROOTBOX_HOME")]
    pub home: Option<PathBuf>,

    /// JSON options file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log to stderr at debug level
    #[arg(long, global = true)]
    pub debug: bool,
}

impl GlobalFlags {
    /// Resolve options from `--config` and `--home`.
    pub fn options(&self) -> anyhow::Result<RootboxOptions> {
        let mut options = match &self.config {
            Some(path) => RootboxOptions::load(path)?,
            None => RootboxOptions::default(),
        };

        if let Some(home) = &self.home {
            options.home_dir = if home.is_absolute() {
                home.clone()
            } else {
                std::env::current_dir()?.join(home)
            };
        }
        Ok(options)
    }

    pub async fn create_runtime(&self) -> anyhow::Result<RootboxRuntime> {
        let options = self.options()?;
        tracing::debug!(
            home = %options.home_dir.display(),
            engine = options.engine.enabled,
            "Opening runtime"
        );
        let runtime = RootboxRuntime::open(options).await?;
        Ok(runtime)
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create and start a new instance
    Create(commands::create::CreateArgs),

    /// List instances
    #[command(visible_alias = "ls")]
    List(commands::list::ListArgs),

    /// Start one or more stopped instances
    Start(commands::start::StartArgs),

    /// Stop one or more running instances
    Stop(commands::stop::StopArgs),

    /// Restart one or more instances
    Restart(commands::restart::RestartArgs),

    /// Show the live status of an instance
    Status(commands::status::StatusArgs),

    /// Open an SSH session to an instance
    #[command(visible_alias = "shell")]
    Connect(commands::connect::ConnectArgs),

    /// Run a command inside an instance
    Exec(commands::exec::ExecArgs),

    /// Upgrade the packages of an instance
    Update(commands::update::UpdateArgs),

    /// Write a timestamped backup archive
    Backup(commands::backup::BackupArgs),

    /// Show the tail of an instance's output
    Logs(commands::logs::LogsArgs),

    /// Print the full descriptor of an instance as JSON
    Info(commands::info::InfoArgs),

    /// Remove one or more instances
    Rm(commands::rm::RmArgs),
}
