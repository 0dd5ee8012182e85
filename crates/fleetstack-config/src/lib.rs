pub mod error;
pub mod settings;

pub use error::*;
pub use settings::*;

use std::path::{Path, PathBuf};

const CANDIDATES: [&str; 2] = ["fleetstack.local.yaml", "fleetstack.yaml"];

/// FleetStackの設定ディレクトリを取得
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("fleetstack");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// 設定ファイルを探す
///
/// 以下の優先順位で設定ファイルを検索:
/// 1. 環境変数 FLEETSTACK_CONFIG_PATH (直接パス指定)
/// 2. カレントディレクトリ: fleetstack.local.yaml, fleetstack.yaml
/// 3. ./.fleetstack/ ディレクトリ内: 同様の順序
/// 4. ~/.config/fleetstack/config.yaml (グローバル設定)
pub fn find_config_file() -> Result<PathBuf> {
    // 1. 環境変数で直接指定
    if let Ok(config_path) = std::env::var("FLEETSTACK_CONFIG_PATH") {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;

    // 2. カレントディレクトリで検索
    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    // 3. ./.fleetstack/ ディレクトリで検索
    let stack_dir = current_dir.join(".fleetstack");
    if stack_dir.is_dir() {
        for filename in &CANDIDATES {
            let path = stack_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    // 4. グローバル設定ファイル
    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("fleetstack").join("config.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

/// 指定パスの設定ファイルを読み込む
pub fn load(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(Config::default());
    }
    Ok(serde_yaml::from_str(&content)?)
}

/// 設定ファイルを探して読み込む。見つからなければデフォルト設定を返す
pub fn load_or_default() -> Result<(Config, Option<PathBuf>)> {
    match find_config_file() {
        Ok(path) => Ok((load(&path)?, Some(path))),
        Err(ConfigError::ConfigFileNotFound) => Ok((Config::default(), None)),
        Err(e) => Err(e),
    }
}
