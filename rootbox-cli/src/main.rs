//! rootbox command-line interface.

mod cli;
mod commands;

use std::process::ExitCode;

use clap::Parser;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // With --debug, stderr wins over the library's file sink.
    if cli.global.debug
        && let Err(e) = tracing_subscriber::fmt()
            .with_target(true)
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .try_init()
    {
        eprintln!("Warning: failed to initialize logging: {}", e);
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let global = &cli.global;
    match cli.command {
        Commands::Create(args) => commands::create::execute(args, global).await?,
        Commands::List(args) => commands::list::execute(args, global).await?,
        Commands::Start(args) => commands::start::execute(args, global).await?,
        Commands::Stop(args) => commands::stop::execute(args, global).await?,
        Commands::Restart(args) => commands::restart::execute(args, global).await?,
        Commands::Status(args) => commands::status::execute(args, global).await?,
        Commands::Connect(args) => {
            return commands::connect::execute(args, global).await.map(exit_code);
        }
        Commands::Exec(args) => {
            return commands::exec::execute(args, global).await.map(exit_code);
        }
        Commands::Update(args) => {
            return commands::update::execute(args, global).await.map(exit_code);
        }
        Commands::Backup(args) => commands::backup::execute(args, global).await?,
        Commands::Logs(args) => commands::logs::execute(args, global).await?,
        Commands::Info(args) => commands::info::execute(args, global).await?,
        Commands::Rm(args) => commands::rm::execute(args, global).await?,
    }
    Ok(ExitCode::SUCCESS)
}

/// Map a child exit status onto ours; out-of-range codes become failure.
fn exit_code(code: i32) -> ExitCode {
    match u8::try_from(code) {
        Ok(code) => ExitCode::from(code),
        Err(_) => ExitCode::FAILURE,
    }
}
