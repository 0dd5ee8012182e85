use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("設定ディレクトリが見つかりません")]
    ConfigDirNotFound,

    #[error(
        "設定ファイルが見つかりません。以下の場所を確認してください:\n\
        - カレントディレクトリ: fleetstack.local.yaml, fleetstack.yaml\n\
        - ./.fleetstack/ ディレクトリ\n\
        - ~/.config/fleetstack/config.yaml\n\
        または FLEETSTACK_CONFIG_PATH 環境変数で直接指定できます"
    )]
    ConfigFileNotFound,

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML パースエラー: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
