use crate::error::{EtlError, Result};
use crate::table::Table;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Relational store used to hand tables from one stage to the next
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Cheap round trip proving the backend is reachable
    async fn ping(&self) -> Result<()>;

    /// Drop any existing table called `name` and recreate it from `table`
    async fn replace_table(&self, name: &str, table: &Table) -> Result<()>;

    /// Read every row of `name` in insertion order
    async fn read_table(&self, name: &str) -> Result<Table>;
}

/// In-memory store for development/testing
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<HashMap<String, Table>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table_names(&self) -> Vec<String> {
        match self.tables.lock() {
            Ok(tables) => {
                let mut names: Vec<String> = tables.keys().cloned().collect();
                names.sort();
                names
            }
            Err(_) => Vec::new(),
        }
    }
}

#[async_trait]
impl TableStore for InMemoryStore {
    async fn ping(&self) -> Result<()> {
        self.tables
            .lock()
            .map(|_| ())
            .map_err(|e| EtlError::Connection { message: e.to_string() })
    }

    async fn replace_table(&self, name: &str, table: &Table) -> Result<()> {
        let mut tables = self
            .tables
            .lock()
            .map_err(|e| EtlError::sink_write(name, e))?;
        tables.insert(name.to_string(), table.clone());

        debug!("Replaced in-memory table {} with {} rows", name, table.len());
        Ok(())
    }

    async fn read_table(&self, name: &str) -> Result<Table> {
        let tables = self
            .tables
            .lock()
            .map_err(|e| EtlError::table_read(name, e))?;
        tables
            .get(name)
            .cloned()
            .ok_or_else(|| EtlError::table_read(name, "no such table"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Value;

    #[tokio::test]
    async fn test_replace_then_read_round_trip() {
        let store = InMemoryStore::new();
        let mut table = Table::new(["tconst"]);
        table.push_row(vec![Value::text("tt1")]);

        store.replace_table("merged_data", &table).await.unwrap();
        let mut second = Table::new(["tconst"]);
        second.push_row(vec![Value::text("tt2")]);
        store.replace_table("merged_data", &second).await.unwrap();

        assert_eq!(store.read_table("merged_data").await.unwrap(), second);
        assert_eq!(store.table_names(), vec!["merged_data".to_string()]);
    }

    #[tokio::test]
    async fn test_read_missing_table_is_table_read_error() {
        let store = InMemoryStore::new();
        let err = store.read_table("nope").await.unwrap_err();
        assert!(matches!(err, EtlError::TableRead { .. }));
    }
}
