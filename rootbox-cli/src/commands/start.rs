use clap::Args;

#[derive(Args, Debug)]
pub struct StartArgs {
    /// ID of the instance(s) to start
    #[arg(required = true, num_args = 1..)]
    pub targets: Vec<String>,
}

pub async fn execute(args: StartArgs, global: &crate::cli::GlobalFlags) -> anyhow::Result<()> {
    let runtime = global.create_runtime().await?;

    let mut errors = Vec::new();
    let mut success_count = 0;

    for target in args.targets {
        match runtime.start(&target).await {
            Ok(info) => {
                if info.mode.is_degraded() {
                    eprintln!("Warning: '{}' is running in degraded mode ({})", target, info.mode);
                }
                println!("{}", target);
                success_count += 1;
            }
            Err(e) => {
                eprintln!("Error starting instance '{}': {}", target, e);
                errors.push(format!("{}: {}", target, e));
            }
        }
    }

    if !errors.is_empty() {
        let error_summary = if success_count > 0 {
            format!(
                "Failed to start {} of {} instance(s)",
                errors.len(),
                errors.len() + success_count
            )
        } else {
            format!("Failed to start all {} instance(s)", errors.len())
        };

        anyhow::bail!("{}\nErrors:\n  {}", error_summary, errors.join("\n  "));
    }
    Ok(())
}
