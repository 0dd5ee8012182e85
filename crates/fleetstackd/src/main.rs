mod backend;
mod commands;
mod manifest;

use clap::{Parser, Subcommand};
use fleetstack_config::Config;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fleetstackd")]
#[command(about = "FleetStack control plane daemon", long_about = None)]
struct Cli {
    /// 設定ファイルのパス（省略時は自動検出）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 設定を読み込み、プロビジョナーの疎通を確認
    Check,
    /// ユニットの状態を表示
    Status {
        /// アプリ名（指定しない場合は全アプリ）
        app: Option<String>,
    },
    /// アプリのユニットでコマンドを実行
    Exec {
        /// アプリ名
        app: String,
        /// 実行するコマンド
        cmd: String,
        /// コマンド引数
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// 設定再生成ワーカーとステータス同期を起動
    Serve {
        /// 登録するアプリの定義ファイル (YAML)
        #[arg(long)]
        apps: Option<PathBuf>,
        /// キューのポーリング間隔（秒）
        #[arg(long, default_value = "5")]
        poll_secs: u64,
        /// ステータス同期の間隔（秒）
        #[arg(long, default_value = "30")]
        sync_secs: u64,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<(Config, Option<PathBuf>)> {
    match path {
        Some(path) => Ok((fleetstack_config::load(path)?, Some(path.to_path_buf()))),
        None => Ok(fleetstack_config::load_or_default()?),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let (config, source) = load_config(cli.config.as_deref())?;
    tracing::debug!(source = ?source, provisioner = %config.provisioner, "configuration loaded");

    match cli.command {
        Commands::Check => commands::check::handle(&config, source.as_deref()).await,
        Commands::Status { app } => commands::status::handle(&config, app).await,
        Commands::Exec { app, cmd, args } => commands::exec::handle(&config, app, cmd, args).await,
        Commands::Serve {
            apps,
            poll_secs,
            sync_secs,
        } => commands::serve::handle(&config, apps.as_deref(), poll_secs, sync_secs).await,
    }
}
