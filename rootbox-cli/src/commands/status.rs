use clap::Args;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// ID of the instance; all instances when omitted
    pub target: Option<String>,
}

pub async fn execute(args: StatusArgs, global: &crate::cli::GlobalFlags) -> anyhow::Result<()> {
    let runtime = global.create_runtime().await?;

    let Some(target) = args.target else {
        let infos = runtime.list().await?;
        super::list::print_table(&infos);
        return Ok(());
    };

    let info = runtime.status(&target).await?;
    let d = &info.descriptor;
    println!("ID:      {}", d.id);
    println!("Name:    {}", d.display_name);
    println!("OS:      {}", d.os_choice);
    println!("Status:  {}", d.status());
    println!("Mode:    {}", info.mode);
    println!(
        "SSH:     ssh {}@127.0.0.1 -p {}",
        d.credentials.username, d.endpoints.ssh_port
    );
    println!("Web:     http://127.0.0.1:{}", d.endpoints.web_port);
    println!(
        "Limits:  {} RAM, {} CPU, {} disk",
        d.resources.ram_limit, d.resources.cpu_limit, d.resources.disk_limit
    );
    if let Some(started) = d.last_started_at {
        println!("Started: {}", started.to_rfc3339());
    }
    println!("Dir:     {}", info.storage_dir.display());
    Ok(())
}
