use anyhow::{Context, Result};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::task;
use uuid::Uuid;

/// Database connection manager for the job registry (C10).
#[derive(Clone)]
pub struct Database {
    pub connection: Arc<Mutex<Connection>>,
}

impl Database {
    /// Create a new database connection
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();
        
        let connection = task::spawn_blocking(move || -> Result<Connection> {
            let conn = Connection::open_with_flags(
                &path,
                OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_READ_WRITE,
            ).context("Failed to open SQLite database")?;
            
            // Enable foreign key constraints
            conn.execute("PRAGMA foreign_keys = ON;", [])
                .context("Failed to enable foreign keys")?;
                
            // Set WAL mode for better concurrency
            conn.execute("PRAGMA journal_mode = WAL;", [])
                .context("Failed to set WAL mode")?;
                
            // Optimize for performance
            conn.execute("PRAGMA synchronous = NORMAL;", [])
                .context("Failed to set synchronous mode")?;
                
            conn.execute("PRAGMA cache_size = -2000;", [])
                .context("Failed to set cache size")?;
                
            Ok(conn)
        }).await??;
        
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }
    
    /// Run database migrations, tracked in `schema_migrations` (version,
    /// name, checksum) via `MigrationManager` so re-running this is a
    /// no-op once a migration has already been applied.
    pub async fn migrate(&self) -> Result<()> {
        crate::storage::migration::MigrationManager::new(self.clone())
            .migrate_up()
            .await
            .map(|_| ())
    }
    
    /// Execute a query with parameters
    pub async fn execute<P>(&self, sql: &str, params: P) -> Result<usize>
    where
        P: rusqlite::Params + Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        let sql = sql.to_string();
        
        task::spawn_blocking(move || -> Result<usize> {
            let conn = connection.lock().unwrap();
            let rows_affected = conn.execute(&sql, params)
                .context("Failed to execute SQL")?;
            Ok(rows_affected)
        }).await?
    }
    
    /// Begin a transaction
    pub async fn begin_transaction(&self) -> Result<()> {
        self.execute("BEGIN TRANSACTION;", []).await?;
        Ok(())
    }
    
    /// Commit a transaction
    pub async fn commit_transaction(&self) -> Result<()> {
        self.execute("COMMIT;", []).await?;
        Ok(())
    }
    
    /// Rollback a transaction
    pub async fn rollback_transaction(&self) -> Result<()> {
        self.execute("ROLLBACK;", []).await?;
        Ok(())
    }
    
    /// Check if the database is healthy
    pub async fn health_check(&self) -> Result<bool> {
        let connection = Arc::clone(&self.connection);
        
        task::spawn_blocking(move || -> Result<bool> {
            let conn = connection.lock().unwrap();
            let mut stmt = conn.prepare("SELECT 1;")?;
            let result: i32 = stmt.query_row([], |row| row.get(0))?;
            Ok(result == 1)
        }).await?
    }
}

/// Convert UUID to string for SQLite storage
pub fn uuid_to_string(uuid: &Uuid) -> String {
    uuid.to_string()
}

/// Convert string back to UUID
pub fn string_to_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).context("Invalid UUID string")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;
    
    #[tokio::test]
    async fn test_database_creation() {
        let temp_file = NamedTempFile::new().unwrap();
        let db = Database::new(temp_file.path()).await.unwrap();
        
        let is_healthy = db.health_check().await.unwrap();
        assert!(is_healthy);
    }
    
    #[tokio::test]
    async fn test_database_migration() -> Result<()> {
        let temp_file = NamedTempFile::new().unwrap();
        let db = Database::new(temp_file.path()).await.unwrap();
        
        // Run migration
        db.migrate().await.unwrap();
        
        // Verify tables exist by querying them
        let connection = Arc::clone(&db.connection);
        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = connection.lock().unwrap();
            let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='table';")?;
            let table_names: Result<Vec<String>, _> = stmt.query_map([], |row| {
                Ok(row.get::<_, String>(0)?)
            })?.collect();
            
            let tables = table_names?;
            assert!(tables.contains(&"jobs".to_string()));

            Ok(())
        }).await??;

        Ok(())
    }

    #[test]
    fn test_uuid_string_conversion() {
        let original = Uuid::new_v4();
        let string = uuid_to_string(&original);
        let restored = string_to_uuid(&string).unwrap();
        
        assert_eq!(original, restored);
    }
}