use std::io::Write;

use clap::Args;

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// ID of the instance to upgrade
    pub target: String,
}

pub async fn execute(args: UpdateArgs, global: &crate::cli::GlobalFlags) -> anyhow::Result<i32> {
    let runtime = global.create_runtime().await?;
    let output = runtime.update(&args.target).await?;

    std::io::stdout().write_all(output.stdout.as_bytes())?;
    std::io::stderr().write_all(output.stderr.as_bytes())?;
    Ok(output.exit_code)
}
