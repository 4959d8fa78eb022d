//! InMemoryAppStore / InMemoryLogStore - 開発用・テスト用のストア

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{App, Applog};
use crate::ports::{AppStore, LogStore, PortError};

/// アプリ名をキーにした BTreeMap（list が名前順になる）
#[derive(Default)]
pub struct InMemoryAppStore {
    apps: RwLock<BTreeMap<String, App>>,
}

impl InMemoryAppStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AppStore for InMemoryAppStore {
    async fn insert(&self, app: &App) -> Result<(), PortError> {
        let mut apps = self.apps.write().await;
        if apps.contains_key(&app.name) {
            return Err(PortError::AlreadyExists(format!("app {}", app.name)));
        }
        apps.insert(app.name.clone(), app.clone());
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<App, PortError> {
        self.apps
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("app {name}")))
    }

    async fn update(&self, app: &App) -> Result<(), PortError> {
        let mut apps = self.apps.write().await;
        match apps.get_mut(&app.name) {
            Some(stored) => {
                *stored = app.clone();
                Ok(())
            }
            None => Err(PortError::NotFound(format!("app {}", app.name))),
        }
    }

    async fn delete(&self, name: &str) -> Result<(), PortError> {
        self.apps
            .write()
            .await
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| PortError::NotFound(format!("app {name}")))
    }

    async fn list(&self) -> Result<Vec<App>, PortError> {
        Ok(self.apps.read().await.values().cloned().collect())
    }

    async fn list_by_teams(&self, teams: &[String]) -> Result<Vec<App>, PortError> {
        Ok(self
            .apps
            .read()
            .await
            .values()
            .filter(|app| teams.iter().any(|team| app.has_team(team)))
            .cloned()
            .collect())
    }
}

/// 追記専用のログ（時刻順に並ぶ前提）
#[derive(Default)]
pub struct InMemoryLogStore {
    logs: RwLock<Vec<Applog>>,
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LogStore for InMemoryLogStore {
    async fn append(&self, logs: &[Applog]) -> Result<(), PortError> {
        self.logs.write().await.extend_from_slice(logs);
        Ok(())
    }

    async fn last(
        &self,
        app: &str,
        n: usize,
        source: Option<&str>,
    ) -> Result<Vec<Applog>, PortError> {
        let logs = self.logs.read().await;
        let mut newest: Vec<Applog> = logs
            .iter()
            .rev()
            .filter(|log| log.app == app && source.is_none_or(|s| log.source == s))
            .take(n)
            .cloned()
            .collect();
        newest.reverse();
        Ok(newest)
    }

    async fn delete_app(&self, app: &str) -> Result<(), PortError> {
        self.logs.write().await.retain(|log| log.app != app);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::split_log_lines;
    use chrono::Utc;

    #[tokio::test]
    async fn insert_rejects_duplicate_names() {
        let store = InMemoryAppStore::new();
        let app = App::new("myapp", "python");

        store.insert(&app).await.unwrap();
        let err = store.insert(&app).await.unwrap_err();

        assert!(matches!(err, PortError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn update_of_unknown_app_is_not_found() {
        let store = InMemoryAppStore::new();

        let err = store.update(&App::new("ghost", "python")).await.unwrap_err();

        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn list_by_teams_filters_on_ownership() {
        let store = InMemoryAppStore::new();
        let mut mine = App::new("mine", "python");
        mine.grant("cobrateam").unwrap();
        let mut theirs = App::new("theirs", "python");
        theirs.grant("otherteam").unwrap();
        store.insert(&mine).await.unwrap();
        store.insert(&theirs).await.unwrap();

        let apps = store.list_by_teams(&["cobrateam".into()]).await.unwrap();

        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].name, "mine");
        assert_eq!(store.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn last_returns_newest_records_oldest_first() {
        let store = InMemoryLogStore::new();
        for i in 0..15 {
            let logs = split_log_lines("myapp", &format!("{i}"), "app", Utc::now());
            store.append(&logs).await.unwrap();
        }
        store
            .append(&split_log_lines("otherapp", "noise", "app", Utc::now()))
            .await
            .unwrap();

        let logs = store.last("myapp", 10, None).await.unwrap();

        let messages: Vec<&str> = logs.iter().map(|l| l.message.as_str()).collect();
        assert_eq!(messages, ["5", "6", "7", "8", "9", "10", "11", "12", "13", "14"]);
    }

    #[tokio::test]
    async fn last_filters_by_source() {
        let store = InMemoryLogStore::new();
        store
            .append(&split_log_lines("myapp", "web line", "web", Utc::now()))
            .await
            .unwrap();
        store
            .append(&split_log_lines("myapp", "worker line", "worker", Utc::now()))
            .await
            .unwrap();

        let logs = store.last("myapp", 10, Some("worker")).await.unwrap();

        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].message, "worker line");
    }

    #[tokio::test]
    async fn delete_app_drops_only_that_app() {
        let store = InMemoryLogStore::new();
        store
            .append(&split_log_lines("myapp", "a", "app", Utc::now()))
            .await
            .unwrap();
        store
            .append(&split_log_lines("otherapp", "b", "app", Utc::now()))
            .await
            .unwrap();

        store.delete_app("myapp").await.unwrap();

        assert!(store.last("myapp", 10, None).await.unwrap().is_empty());
        assert_eq!(store.last("otherapp", 10, None).await.unwrap().len(), 1);
    }
}
