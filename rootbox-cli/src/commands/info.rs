use clap::Args;

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// ID of the instance
    pub target: String,
}

pub async fn execute(args: InfoArgs, global: &crate::cli::GlobalFlags) -> anyhow::Result<()> {
    let runtime = global.create_runtime().await?;
    let descriptor = runtime.info(&args.target).await?;
    println!("{}", serde_json::to_string_pretty(&descriptor)?);
    Ok(())
}
