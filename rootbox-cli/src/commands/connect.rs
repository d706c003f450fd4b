use clap::Args;
use rootbox::ssh::{OpenSshClient, SshClient};

#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// ID of the instance to connect to
    pub target: String,
}

/// Returns the ssh client's exit code.
///
/// The runtime is dropped before the session starts so other invocations
/// can manage instances while it is open.
pub async fn execute(args: ConnectArgs, global: &crate::cli::GlobalFlags) -> anyhow::Result<i32> {
    let runtime = global.create_runtime().await?;
    let target = runtime.ssh_target(&args.target).await?;
    drop(runtime);

    tracing::debug!(port = target.port, user = %target.username, "Opening SSH session");
    let code = OpenSshClient::default().connect(&target).await?;
    Ok(code)
}
