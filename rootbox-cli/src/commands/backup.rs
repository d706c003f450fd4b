use clap::Args;

#[derive(Args, Debug)]
pub struct BackupArgs {
    /// ID of the instance to back up
    pub target: String,
}

pub async fn execute(args: BackupArgs, global: &crate::cli::GlobalFlags) -> anyhow::Result<()> {
    let runtime = global.create_runtime().await?;
    let path = runtime.backup(&args.target).await?;
    println!("{}", path.display());
    Ok(())
}
