use crate::backend;
use colored::Colorize;
use fleetstack_core::App;

pub async fn handle(
    config: &fleetstack_config::Config,
    app: String,
    cmd: String,
    args: Vec<String>,
) -> anyhow::Result<()> {
    let provisioner = backend::build_provisioner(config).await?;

    eprintln!(
        "{}",
        format!("アプリ '{}' でコマンドを実行中...", app).green()
    );
    eprintln!("コマンド: {} {}", cmd.cyan(), args.join(" ").cyan());

    // バックエンドはアプリ名でユニットを特定する
    let app = App::new(app, "");
    let mut stdout = tokio::io::stdout();
    let mut stderr = tokio::io::stderr();
    let result = provisioner
        .execute_command(&mut stdout, &mut stderr, &app, &cmd, &args)
        .await;
    tokio::io::AsyncWriteExt::flush(&mut stdout).await?;

    result.map_err(|e| anyhow::anyhow!("コマンドの実行に失敗しました ({}): {}", e.kind(), e))
}
