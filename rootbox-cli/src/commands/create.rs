use clap::Args;
use rootbox::CreateOptions;

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Instance name; also becomes the ID
    #[arg(long)]
    pub name: Option<String>,

    /// Operating system: ubuntu, debian, centos or alpine
    #[arg(long)]
    pub os: Option<String>,

    /// Login user (default: root)
    #[arg(long)]
    pub user: Option<String>,

    /// Login password (default: generated)
    #[arg(long, env = "ROOTBOX_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Memory limit, e.g. 1GB
    #[arg(long)]
    pub ram: Option<String>,

    /// CPU limit, e.g. 2
    #[arg(long)]
    pub cpu: Option<String>,

    /// Disk limit, e.g. 20GB
    #[arg(long)]
    pub disk: Option<String>,
}

pub async fn execute(args: CreateArgs, global: &crate::cli::GlobalFlags) -> anyhow::Result<()> {
    let runtime = global.create_runtime().await?;

    let info = runtime
        .create(CreateOptions {
            name: args.name,
            os: args.os,
            username: args.user,
            password: args.password,
            ram: args.ram,
            cpu: args.cpu,
            disk: args.disk,
        })
        .await?;

    let descriptor = &info.descriptor;
    let creds = &descriptor.credentials;
    println!("{}", descriptor.id);

    eprintln!(
        "SSH:      ssh {}@127.0.0.1 -p {}",
        creds.username, descriptor.endpoints.ssh_port
    );
    eprintln!("Web:      http://127.0.0.1:{}", descriptor.endpoints.web_port);
    eprintln!("Password: {}", creds.password);
    if info.mode.is_degraded() {
        eprintln!("Warning: container runtime unavailable, running in degraded mode");
    }
    Ok(())
}
