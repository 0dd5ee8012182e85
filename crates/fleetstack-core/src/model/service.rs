//! サービス / サービスインスタンス / チーム定義

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// サービスカタログのエントリ
///
/// `endpoint` は環境タグ（"production" など）からサービス API の
/// ベース URL へのマップ。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    #[serde(default)]
    pub endpoint: HashMap<String, String>,
}

impl Service {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: HashMap::new(),
        }
    }

    pub fn with_endpoint(mut self, environment: impl Into<String>, url: impl Into<String>) -> Self {
        self.endpoint.insert(environment.into(), url.into());
        self
    }

    /// 環境タグに対応するエンドポイント
    pub fn endpoint_for(&self, environment: &str) -> Option<&str> {
        self.endpoint.get(environment).map(String::as_str)
    }
}

/// プロビジョニング済みの外部サービス
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub name: String,
    pub service_name: String,
    #[serde(default)]
    pub teams: Vec<String>,
    /// バインド済みアプリ名（同じ名前は1回まで）
    #[serde(default)]
    pub apps: Vec<String>,
}

impl ServiceInstance {
    pub fn new(name: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    pub fn is_bound(&self, app: &str) -> bool {
        self.apps.iter().any(|a| a == app)
    }

    /// アプリを追加。既にある場合は false
    pub fn add_app(&mut self, app: &str) -> bool {
        if self.is_bound(app) {
            return false;
        }
        self.apps.push(app.to_string());
        true
    }

    /// アプリを削除。なかった場合は false
    pub fn remove_app(&mut self, app: &str) -> bool {
        let before = self.apps.len();
        self.apps.retain(|a| a != app);
        before != self.apps.len()
    }
}

/// チーム定義
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub name: String,
    /// メンバーのメールアドレス
    #[serde(default)]
    pub users: Vec<String>,
}

impl Team {
    pub fn new<I, S>(name: impl Into<String>, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            users: users.into_iter().map(Into::into).collect(),
        }
    }
}
