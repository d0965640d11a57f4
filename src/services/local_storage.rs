use async_trait::async_trait;
use chrono::Utc;
use sea_orm::entity::prelude::*;
use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, Set};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::entities::local_storage_entity as ls;
use crate::error::{AppError, AppResult};

/// Durable string key-value storage that survives process restarts.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_item(&self, key: &str) -> AppResult<Option<String>>;
    async fn set_item(&self, key: &str, value: &str) -> AppResult<()>;
    /// Removing a missing key is not an error.
    async fn remove_item(&self, key: &str) -> AppResult<()>;
}

#[derive(Clone)]
pub struct SeaOrmKeyValueStore {
    pool: DatabaseConnection,
}

impl SeaOrmKeyValueStore {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KeyValueStore for SeaOrmKeyValueStore {
    async fn get_item(&self, key: &str) -> AppResult<Option<String>> {
        let row = ls::Entity::find_by_id(key.to_string())
            .one(&self.pool)
            .await?;
        Ok(row.map(|m| m.value))
    }

    async fn set_item(&self, key: &str, value: &str) -> AppResult<()> {
        let row = ls::ActiveModel {
            key: Set(key.to_string()),
            value: Set(value.to_string()),
            updated_at: Set(Utc::now()),
        };

        ls::Entity::insert(row)
            .on_conflict(
                OnConflict::column(ls::Column::Key)
                    .update_columns([ls::Column::Value, ls::Column::UpdatedAt])
                    .to_owned(),
            )
            .exec(&self.pool)
            .await?;

        Ok(())
    }

    async fn remove_item(&self, key: &str) -> AppResult<()> {
        ls::Entity::delete_by_id(key.to_string())
            .exec(&self.pool)
            .await?;
        Ok(())
    }
}

/// Process-local store for tests and hosts without a database.
#[derive(Default)]
pub struct InMemoryKeyValueStore {
    items: Mutex<HashMap<String, String>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> AppError {
    AppError::InternalError("local storage lock poisoned".to_string())
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get_item(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.items.lock().map_err(poisoned)?.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> AppResult<()> {
        self.items
            .lock()
            .map_err(poisoned)?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> AppResult<()> {
        self.items.lock().map_err(poisoned)?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::database::{create_pool, run_migrations};

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemoryKeyValueStore::new();
        assert!(store.get_item("k").await.unwrap().is_none());

        store.set_item("k", "v1").await.unwrap();
        store.set_item("k", "v2").await.unwrap();
        assert_eq!(store.get_item("k").await.unwrap().as_deref(), Some("v2"));
        assert_eq!(store.len(), 1);

        store.remove_item("k").await.unwrap();
        store.remove_item("k").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_len_survives_poisoned_lock() {
        let store = std::sync::Arc::new(InMemoryKeyValueStore::new());
        store.set_item("pendingSubscription", "{}").await.unwrap();

        let poisoner = store.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.items.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        assert!(store.items.is_poisoned());
        assert_eq!(store.len(), 1);
        assert!(!store.is_empty());
        assert!(store.get_item("pendingSubscription").await.is_err());
    }

    #[tokio::test]
    async fn test_sqlite_store_upserts_single_row() {
        let pool = create_pool(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        })
        .await
        .unwrap();
        run_migrations(&pool).await.unwrap();

        let store = SeaOrmKeyValueStore::new(pool.clone());
        store.set_item("pendingSubscription", "{\"a\":1}").await.unwrap();
        store.set_item("pendingSubscription", "{\"a\":2}").await.unwrap();

        assert_eq!(
            store.get_item("pendingSubscription").await.unwrap().as_deref(),
            Some("{\"a\":2}")
        );
        assert_eq!(ls::Entity::find().count(&pool).await.unwrap(), 1);

        store.remove_item("pendingSubscription").await.unwrap();
        store.remove_item("pendingSubscription").await.unwrap();
        assert!(store.get_item("pendingSubscription").await.unwrap().is_none());
    }
}
