use crate::error::{EtlError, Result};
use crate::storage::TableStore;
use crate::table::{Table, Value};
use async_trait::async_trait;
use rusqlite::{params_from_iter, Connection};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// SQLite-backed table store. One connection per pipeline run.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open the database at `url`. `:memory:` opens a private in-memory database.
    pub fn connect(url: &str) -> Result<Self> {
        info!("Connecting to SQLite database at {}", url);

        if url != ":memory:" {
            if let Some(parent) = Path::new(url).parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    return Err(EtlError::Connection {
                        message: format!("directory {} does not exist", parent.display()),
                    });
                }
            }
        }

        let opened = match url {
            ":memory:" => Connection::open_in_memory(),
            path => Connection::open(path),
        };
        let conn = opened.map_err(|e| EtlError::Connection {
            message: format!("Failed to open database {url}: {e}"),
        })?;

        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> std::result::Result<std::sync::MutexGuard<'_, Connection>, String> {
        self.conn.lock().map_err(|e| e.to_string())
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[async_trait]
impl TableStore for SqliteStore {
    async fn ping(&self) -> Result<()> {
        let conn = self.lock().map_err(|message| EtlError::Connection { message })?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|e| EtlError::Connection {
                message: format!("Probe query failed: {e}"),
            })?;
        Ok(())
    }

    async fn replace_table(&self, name: &str, table: &Table) -> Result<()> {
        let mut conn = self.lock().map_err(|e| EtlError::sink_write(name, e))?;
        let tx = conn.transaction().map_err(|e| EtlError::sink_write(name, e))?;

        let ident = quote_ident(name);
        let column_defs: Vec<String> = table
            .columns()
            .iter()
            .zip(table.column_types())
            .map(|(col, ty)| format!("{} {}", quote_ident(col), ty))
            .collect();
        let ddl = format!(
            "DROP TABLE IF EXISTS {ident};\nCREATE TABLE {ident} ({});",
            column_defs.join(", ")
        );
        tx.execute_batch(&ddl)
            .map_err(|e| EtlError::sink_write(name, format!("Failed to recreate table: {e}")))?;

        if !table.columns().is_empty() {
            let placeholders = vec!["?"; table.columns().len()].join(", ");
            let insert = format!("INSERT INTO {ident} VALUES ({placeholders})");
            let mut stmt = tx
                .prepare(&insert)
                .map_err(|e| EtlError::sink_write(name, e))?;
            for row in table.rows() {
                let values: Vec<rusqlite::types::Value> = row.iter().map(Into::into).collect();
                stmt.execute(params_from_iter(values))
                    .map_err(|e| EtlError::sink_write(name, format!("Failed to insert row: {e}")))?;
            }
        }

        tx.commit().map_err(|e| EtlError::sink_write(name, e))?;
        debug!("Replaced table {} with {} rows", name, table.len());
        Ok(())
    }

    async fn read_table(&self, name: &str) -> Result<Table> {
        let conn = self.lock().map_err(|e| EtlError::table_read(name, e))?;
        let sql = format!("SELECT * FROM {} ORDER BY rowid", quote_ident(name));
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| EtlError::table_read(name, e))?;

        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let width = columns.len();
        let mut table = Table::new(columns);

        let mut rows = stmt.query([]).map_err(|e| EtlError::table_read(name, e))?;
        while let Some(row) = rows.next().map_err(|e| EtlError::table_read(name, e))? {
            let mut cells = Vec::with_capacity(width);
            for idx in 0..width {
                let cell: rusqlite::types::Value =
                    row.get(idx).map_err(|e| EtlError::table_read(name, e))?;
                cells.push(Value::from(cell));
            }
            table.push_row(cells);
        }

        debug!("Read {} rows from table {}", table.len(), name);
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        let mut table = Table::new(["tconst", "startYear", "averageRating", "genres"]);
        table.push_row(vec![
            Value::text("tt0000001"),
            Value::Integer(1894),
            Value::Real(5.7),
            Value::text("Documentary,Short"),
        ]);
        table.push_row(vec![Value::text("tt0000002"), Value::Null, Value::Real(6.0), Value::Null]);
        table
    }

    #[tokio::test]
    async fn test_ping_in_memory() {
        let store = SqliteStore::connect(":memory:").unwrap();
        store.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_replace_and_read_preserves_types_and_order() {
        let store = SqliteStore::connect(":memory:").unwrap();
        store.replace_table("merged_data", &sample()).await.unwrap();
        let read = store.read_table("merged_data").await.unwrap();
        assert_eq!(read, sample());
    }

    #[tokio::test]
    async fn test_replace_drops_previous_rows() {
        let store = SqliteStore::connect(":memory:").unwrap();
        store.replace_table("t", &sample()).await.unwrap();
        let mut smaller = Table::new(["tconst"]);
        smaller.push_row(vec![Value::text("tt9")]);
        store.replace_table("t", &smaller).await.unwrap();
        assert_eq!(store.read_table("t").await.unwrap(), smaller);
    }

    #[tokio::test]
    async fn test_read_missing_table_fails() {
        let store = SqliteStore::connect(":memory:").unwrap();
        let err = store.read_table("missing").await.unwrap_err();
        assert!(matches!(err, EtlError::TableRead { .. }));
    }

    #[test]
    fn test_connect_to_missing_directory_is_connection_error() {
        let err = SqliteStore::connect("/definitely/not/here/etl.db").err().unwrap();
        assert!(matches!(err, EtlError::Connection { .. }));
    }
}
