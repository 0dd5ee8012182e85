//! アプリケーション定義

use super::unit::Unit;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 環境変数
///
/// `instance_name` はこの変数を注入したサービスインスタンス名。
/// 空文字列はどのインスタンスにも属さない変数を表す。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub instance_name: String,
}

impl EnvVar {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            public: false,
            instance_name: String::new(),
        }
    }

    /// サービスインスタンス所有の非公開変数
    pub fn owned_by(
        name: impl Into<String>,
        value: impl Into<String>,
        instance: impl Into<String>,
    ) -> Self {
        Self {
            instance_name: instance.into(),
            ..Self::new(name, value)
        }
    }
}

/// アプリケーション定義
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    /// グローバルに一意
    pub name: String,
    /// ランタイム / ビルドパック
    #[serde(default)]
    pub framework: String,
    /// 所有チーム（集合として扱う）
    #[serde(default)]
    pub teams: Vec<String>,
    /// 並び順に意味がある（先頭のアドレス付きユニットがプライマリ）
    #[serde(default)]
    pub units: Vec<Unit>,
    #[serde(default)]
    pub env: BTreeMap<String, EnvVar>,
}

impl App {
    pub fn new(name: impl Into<String>, framework: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            framework: framework.into(),
            ..Default::default()
        }
    }

    pub fn with_teams<I, S>(mut self, teams: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for team in teams {
            self.add_team(team);
        }
        self
    }

    pub fn with_units(mut self, units: Vec<Unit>) -> Self {
        self.units = units;
        self
    }

    /// チームを追加（重複は無視）
    pub fn add_team(&mut self, team: impl Into<String>) {
        let team = team.into();
        if !self.teams.contains(&team) {
            self.teams.push(team);
        }
    }

    pub fn has_team(&self, team: &str) -> bool {
        self.teams.iter().any(|t| t == team)
    }

    /// アドレスが割り当て済みの最初のユニットの IP
    pub fn primary_address(&self) -> Option<&str> {
        self.units
            .iter()
            .find(|u| u.has_address())
            .map(|u| u.ip.as_str())
    }

    pub fn find_unit(&self, name: &str) -> Option<&Unit> {
        self.units.iter().find(|u| u.name == name)
    }

    /// 次に割り当てるユニットインデックス（削除済みの番号は再利用しない）
    pub fn next_unit_index(&self) -> usize {
        self.units
            .iter()
            .filter_map(Unit::index)
            .max()
            .map(|i| i + 1)
            .unwrap_or(0)
    }

    /// 指定インスタンスが所有する変数だけを返す（`""` は所有者なし）
    pub fn instance_env(&self, instance: &str) -> BTreeMap<String, EnvVar> {
        self.env
            .iter()
            .filter(|(_, v)| v.instance_name == instance)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// 変数をまとめて設定（同名は上書き）
    pub fn set_envs(&mut self, vars: impl IntoIterator<Item = EnvVar>) {
        for var in vars {
            self.env.insert(var.name.clone(), var);
        }
    }

    /// 名前指定で変数を削除
    pub fn unset_envs<S: AsRef<str>>(&mut self, names: &[S]) {
        for name in names {
            self.env.remove(name.as_ref());
        }
    }

    /// 指定インスタンスが所有する変数を全て削除し、削除件数を返す
    pub fn unset_instance_env(&mut self, instance: &str) -> usize {
        let before = self.env.len();
        self.env.retain(|_, v| v.instance_name != instance);
        before - self.env.len()
    }
}
