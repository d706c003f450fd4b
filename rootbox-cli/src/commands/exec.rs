use std::io::Write;

use clap::Args;

#[derive(Args, Debug)]
pub struct ExecArgs {
    /// ID of the instance
    pub target: String,

    /// Command and arguments to run inside the instance
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

/// Returns the remote command's exit code.
pub async fn execute(args: ExecArgs, global: &crate::cli::GlobalFlags) -> anyhow::Result<i32> {
    let runtime = global.create_runtime().await?;
    let output = runtime.exec(&args.target, &args.command).await?;

    std::io::stdout().write_all(output.stdout.as_bytes())?;
    std::io::stderr().write_all(output.stderr.as_bytes())?;
    Ok(output.exit_code)
}
