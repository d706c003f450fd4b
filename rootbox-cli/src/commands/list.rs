use clap::Args;
use comfy_table::{Table, presets};
use rootbox::InstanceInfo;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only show running instances
    #[arg(short, long)]
    pub running: bool,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: ListArgs, global: &crate::cli::GlobalFlags) -> anyhow::Result<()> {
    let runtime = global.create_runtime().await?;

    let infos: Vec<InstanceInfo> = runtime
        .list()
        .await?
        .into_iter()
        .filter(|info| !args.running || info.live)
        .collect();

    if args.json {
        let rows: Vec<serde_json::Value> = infos
            .iter()
            .map(|info| {
                let d = &info.descriptor;
                serde_json::json!({
                    "id": d.id,
                    "name": d.display_name,
                    "os": d.os_choice,
                    "status": d.status(),
                    "live": info.live,
                    "mode": info.mode.to_string(),
                    "sshPort": d.endpoints.ssh_port,
                    "webPort": d.endpoints.web_port,
                    "createdAt": d.created_at,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    print_table(&infos);
    Ok(())
}

pub fn print_table(infos: &[InstanceInfo]) {
    let mut table = Table::new();
    table.load_preset(presets::NOTHING);
    table.set_header(vec![
        "ID", "NAME", "OS", "STATUS", "SSH", "WEB", "MODE", "CREATED",
    ]);

    for info in infos {
        let d = &info.descriptor;
        table.add_row(vec![
            d.id.to_string(),
            d.display_name.clone(),
            d.os_choice.to_string(),
            d.status().to_string(),
            d.endpoints.ssh_port.to_string(),
            d.endpoints.web_port.to_string(),
            info.mode.to_string(),
            format_created(d.created_at),
        ]);
    }

    println!("{table}");
}

fn format_created(created_at: chrono::DateTime<chrono::Utc>) -> String {
    created_at
        .with_timezone(&chrono::Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}
