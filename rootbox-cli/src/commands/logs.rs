use clap::Args;

#[derive(Args, Debug)]
pub struct LogsArgs {
    /// ID of the instance
    pub target: String,

    /// Number of lines to show from the end
    #[arg(short = 'n', long, default_value_t = 50)]
    pub lines: usize,
}

pub async fn execute(args: LogsArgs, global: &crate::cli::GlobalFlags) -> anyhow::Result<()> {
    let runtime = global.create_runtime().await?;
    for line in runtime.logs(&args.target, args.lines).await? {
        println!("{}", line);
    }
    Ok(())
}
