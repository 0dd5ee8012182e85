use crate::backend;
use colored::Colorize;
use fleetstack_config::Config;
use std::path::Path;

pub async fn handle(config: &Config, source: Option<&Path>) -> anyhow::Result<()> {
    match source {
        Some(path) => println!("設定ファイル: {}", path.display().to_string().cyan()),
        None => println!("{}", "設定ファイルなし（デフォルト設定を使用）".yellow()),
    }
    println!("  host:         {}", config.host);
    println!("  environment:  {}", config.environment);
    println!("  provisioner:  {}", config.provisioner.to_string().cyan());
    println!("  exec timeout: {}s", config.exec_timeout_secs);
    println!("  repository:   {}", config.repository.server);
    println!("  queue:        visibility {}s", config.queue.visibility_timeout_secs);
    println!();

    let provisioner = backend::build_provisioner(config).await?;
    let units = provisioner.collect_status().await?;
    println!(
        "{} {} ({} units)",
        "✓".green(),
        format!("プロビジョナー '{}' に接続しました", provisioner.name()).green(),
        units.len()
    );
    Ok(())
}
