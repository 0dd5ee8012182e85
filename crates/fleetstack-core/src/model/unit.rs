//! ユニット定義

use serde::{Deserialize, Serialize};

/// ユニットの状態
///
/// 宣言順が表示上の優先度になる（小さいほど先に表示）。
/// 状態遷移そのものはバックエンドが決めるので、ここでは検証しない。
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum UnitStatus {
    Error,
    Down,
    #[default]
    Pending,
    Creating,
    Installing,
    Started,
}

impl UnitStatus {
    /// 表示ソート用の重み
    pub fn weight(self) -> u8 {
        match self {
            UnitStatus::Error => 0,
            UnitStatus::Down => 1,
            UnitStatus::Pending => 2,
            UnitStatus::Creating => 3,
            UnitStatus::Installing => 4,
            UnitStatus::Started => 5,
        }
    }

    /// 文字列からパース
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "error" => Some(UnitStatus::Error),
            "down" => Some(UnitStatus::Down),
            "pending" => Some(UnitStatus::Pending),
            "creating" => Some(UnitStatus::Creating),
            "installing" => Some(UnitStatus::Installing),
            "started" => Some(UnitStatus::Started),
            _ => None,
        }
    }
}

impl std::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitStatus::Error => write!(f, "error"),
            UnitStatus::Down => write!(f, "down"),
            UnitStatus::Pending => write!(f, "pending"),
            UnitStatus::Creating => write!(f, "creating"),
            UnitStatus::Installing => write!(f, "installing"),
            UnitStatus::Started => write!(f, "started"),
        }
    }
}

/// ユニット定義
///
/// アプリケーションの実行インスタンス1つ分。実体（コンテナ、VM、
/// クラウドサーバー）はプロビジョナー次第。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// `<app>/<index>` 形式。一度割り当てたら変わらない
    pub name: String,
    /// 所属アプリ名
    #[serde(default)]
    pub app_name: String,
    /// ランタイム識別子（framework）
    #[serde(default, rename = "type")]
    pub unit_type: String,
    /// バックエンド固有のマシン番号
    #[serde(default)]
    pub machine: u32,
    #[serde(default)]
    pub instance_id: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub state: UnitStatus,
}

impl Unit {
    /// `<app>/<index>` 形式のユニット名を生成
    pub fn unit_name(app: &str, index: usize) -> String {
        format!("{}/{}", app, index)
    }

    /// ユニット名からインデックスを取り出す
    pub fn index(&self) -> Option<usize> {
        self.name.rsplit_once('/')?.1.parse().ok()
    }

    pub fn has_address(&self) -> bool {
        !self.ip.is_empty()
    }
}

/// 状態の重みでユニットを並べ替える（安定ソート）
///
/// 問題のあるユニットが先頭に来る。表示専用。
pub fn sort_units(units: &mut [Unit]) {
    units.sort_by_key(|u| u.state.weight());
}
