use clap::Args;

#[derive(Args, Debug)]
pub struct RmArgs {
    /// Force the removal of a running instance
    #[arg(short, long)]
    pub force: bool,

    /// Remove every instance
    #[arg(short, long)]
    pub all: bool,

    /// ID of the instance(s) to remove
    #[arg(required_unless_present = "all", num_args = 1..)]
    pub targets: Vec<String>,
}

pub async fn execute(args: RmArgs, global: &crate::cli::GlobalFlags) -> anyhow::Result<()> {
    let runtime = global.create_runtime().await?;

    let targets = if args.all {
        runtime
            .list()
            .await?
            .into_iter()
            .map(|info| info.id().to_string())
            .collect()
    } else {
        args.targets
    };

    let mut active_error = false;
    for target in targets {
        if let Err(e) = runtime.remove(&target, args.force).await {
            eprintln!("Error removing instance '{}': {}", target, e);
            active_error = true;
        } else {
            println!("{}", target);
        }
    }

    if active_error {
        anyhow::bail!("Some instances could not be removed");
    }
    Ok(())
}
