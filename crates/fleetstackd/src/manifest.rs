//! 管理対象アプリの宣言ファイル
//!
//! `serve` はこのファイルのアプリをストアに登録してから起動する。
//!
//! ```yaml
//! apps:
//!   - name: myapp
//!     framework: python
//!     teams: [backend]
//!     env:
//!       DATABASE_HOST: db.internal
//! ```

use anyhow::Context;
use fleetstack_core::{App, EnvVar, Store};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub apps: Vec<AppEntry>,
}

#[derive(Debug, Deserialize)]
pub struct AppEntry {
    pub name: String,
    #[serde(default)]
    pub framework: String,
    #[serde(default)]
    pub teams: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl AppEntry {
    pub fn to_app(&self) -> App {
        let mut app = App::new(self.name.as_str(), self.framework.as_str())
            .with_teams(self.teams.iter().map(String::as_str));
        app.set_envs(
            self.env
                .iter()
                .map(|(name, value)| EnvVar::new(name.as_str(), value.as_str())),
        );
        app
    }
}

pub fn load(path: &Path) -> anyhow::Result<Manifest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("アプリ定義を読み込めません: {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(Manifest::default());
    }
    serde_yaml::from_str(&content)
        .with_context(|| format!("アプリ定義の形式が不正です: {}", path.display()))
}

/// Insert every declared app. Returns the number registered.
pub async fn register(store: &dyn Store, manifest: &Manifest) -> anyhow::Result<usize> {
    for entry in &manifest.apps {
        store
            .insert_app(&entry.to_app())
            .await
            .with_context(|| format!("アプリを登録できません: {}", entry.name))?;
    }
    Ok(manifest.apps.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetstack_core::MemoryStore;

    const MANIFEST: &str = r#"
apps:
  - name: myapp
    framework: python
    teams: [backend]
    env:
      DATABASE_HOST: db.internal
  - name: worker
"#;

    #[tokio::test]
    async fn test_load_and_register() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("apps.yaml");
        std::fs::write(&path, MANIFEST).unwrap();
        let store = MemoryStore::new();

        let manifest = load(&path).unwrap();
        let registered = register(&store, &manifest).await.unwrap();

        assert_eq!(registered, 2);
        let app = store.get_app("myapp").await.unwrap();
        assert_eq!(app.framework, "python");
        assert_eq!(app.teams, vec!["backend"]);
        assert_eq!(app.env["DATABASE_HOST"].value, "db.internal");
        assert!(store.get_app("worker").await.unwrap().env.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_app_is_rejected() {
        let store = MemoryStore::new();
        let manifest: Manifest =
            serde_yaml::from_str("apps:\n  - name: twice\n  - name: twice\n").unwrap();

        let err = register(&store, &manifest).await.unwrap_err();

        assert!(err.to_string().contains("twice"));
    }

    #[test]
    fn test_empty_file_is_empty_manifest() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("apps.yaml");
        std::fs::write(&path, "\n").unwrap();

        assert!(load(&path).unwrap().apps.is_empty());
    }
}
