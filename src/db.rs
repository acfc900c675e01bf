// src/db.rs - Database pool and migrations for the stock ledger

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::config::DatabaseConfig;

/// Open the SQLite pool. WAL and a busy timeout let concurrent writers
/// queue on the write lock instead of failing straight away.
pub async fn create_pool(db_config: &DatabaseConfig) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&db_config.url)
        .with_context(|| format!("Invalid database url: {}", db_config.url))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_millis(db_config.busy_timeout_ms));

    let pool = SqlitePoolOptions::new()
        .max_connections(db_config.max_connections)
        .min_connections(db_config.min_connections)
        .acquire_timeout(Duration::from_secs(db_config.connect_timeout))
        .idle_timeout(Duration::from_secs(db_config.idle_timeout))
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to connect to database: {}", db_config.url))?;

    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Components: only the ledger writes stock_actual after creation
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS componentes (
            id TEXT PRIMARY KEY,
            numero_parte TEXT NOT NULL UNIQUE CHECK(length(numero_parte) > 0 AND length(numero_parte) <= 100),
            nombre TEXT NOT NULL CHECK(length(nombre) > 0 AND length(nombre) <= 200),
            descripcion TEXT CHECK(descripcion IS NULL OR length(descripcion) <= 1000),
            categoria TEXT CHECK(categoria IS NULL OR length(categoria) <= 100),
            marca TEXT CHECK(marca IS NULL OR length(marca) <= 100),
            modelo TEXT CHECK(modelo IS NULL OR length(modelo) <= 100),
            precio_unitario REAL NOT NULL DEFAULT 0 CHECK(precio_unitario >= 0),
            stock_actual INTEGER NOT NULL DEFAULT 0 CHECK(stock_actual >= 0),
            stock_minimo INTEGER NOT NULL DEFAULT 1 CHECK(stock_minimo >= 0),
            activo INTEGER NOT NULL DEFAULT 1 CHECK(activo IN (0, 1)),
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#,
    )
        .execute(pool)
        .await?;

    // Movements: append-only audit trail, never cascades from components
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS movimientos_stock (
            id TEXT PRIMARY KEY,
            componente_id TEXT NOT NULL,
            tipo TEXT NOT NULL CHECK(tipo IN ('entrada', 'salida', 'ajuste')),
            cantidad INTEGER NOT NULL,
            cantidad_anterior INTEGER NOT NULL CHECK(cantidad_anterior >= 0),
            cantidad_nueva INTEGER NOT NULL CHECK(cantidad_nueva >= 0),
            motivo TEXT CHECK(motivo IS NULL OR length(motivo) <= 200),
            observaciones TEXT CHECK(observaciones IS NULL OR length(observaciones) <= 1000),
            usuario TEXT CHECK(usuario IS NULL OR length(usuario) <= 100),
            fecha DATETIME NOT NULL,
            FOREIGN KEY (componente_id) REFERENCES componentes (id)
        )
        "#,
    )
        .execute(pool)
        .await?;

    // ==================== APPEND-ONLY TRIGGERS ====================

    let trigger_queries = [
        r#"CREATE TRIGGER IF NOT EXISTS movimientos_stock_no_update
           BEFORE UPDATE ON movimientos_stock
           BEGIN
               SELECT RAISE(ABORT, 'movimientos_stock is append-only');
           END"#,
        r#"CREATE TRIGGER IF NOT EXISTS movimientos_stock_no_delete
           BEFORE DELETE ON movimientos_stock
           BEGIN
               SELECT RAISE(ABORT, 'movimientos_stock is append-only');
           END"#,
    ];

    for query in trigger_queries.iter() {
        sqlx::query(query).execute(pool).await?;
    }

    // ==================== CREATE INDEXES ====================

    let index_queries = [
        "CREATE INDEX IF NOT EXISTS idx_componentes_activo ON componentes(activo)",
        "CREATE INDEX IF NOT EXISTS idx_componentes_stock ON componentes(activo, stock_actual, stock_minimo)",
        "CREATE INDEX IF NOT EXISTS idx_movimientos_componente_fecha ON movimientos_stock(componente_id, fecha DESC)",
        "CREATE INDEX IF NOT EXISTS idx_movimientos_tipo ON movimientos_stock(tipo)",
        "CREATE INDEX IF NOT EXISTS idx_movimientos_fecha ON movimientos_stock(fecha)",
    ];

    for query in index_queries.iter() {
        sqlx::query(query).execute(pool).await?;
    }

    log::info!("Database migrations applied");
    Ok(())
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use tempfile::TempDir;

    /// File-backed pool in a temporary directory. The directory must outlive the pool.
    pub async fn test_pool() -> (SqlitePool, TempDir) {
        test_pool_with_busy_timeout(DatabaseConfig::default().busy_timeout_ms).await
    }

    pub async fn test_pool_with_busy_timeout(busy_timeout_ms: u64) -> (SqlitePool, TempDir) {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("ledger_test.db");
        let config = DatabaseConfig {
            url: format!("sqlite://{}", path.display()),
            max_connections: 5,
            min_connections: 1,
            busy_timeout_ms,
            ..DatabaseConfig::default()
        };
        let pool = create_pool(&config).await.expect("pool");
        run_migrations(&pool).await.expect("migrations");
        (pool, dir)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::test_pool;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let (pool, _dir) = test_pool().await;
        super::run_migrations(&pool).await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name IN ('componentes', 'movimientos_stock') ORDER BY name",
        )
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(tables.len(), 2);
    }

    #[tokio::test]
    async fn test_negative_stock_rejected_by_schema() {
        let (pool, _dir) = test_pool().await;
        let result = sqlx::query(
            "INSERT INTO componentes (id, numero_parte, nombre, stock_actual, created_at, updated_at)
             VALUES ('c1', 'NP-1', 'Filtro', -1, datetime('now'), datetime('now'))",
        )
            .execute(&pool)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_movements_are_append_only() {
        let (pool, _dir) = test_pool().await;
        sqlx::query(
            "INSERT INTO componentes (id, numero_parte, nombre, stock_actual, created_at, updated_at)
             VALUES ('c1', 'NP-1', 'Filtro', 5, datetime('now'), datetime('now'))",
        )
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO movimientos_stock (id, componente_id, tipo, cantidad, cantidad_anterior, cantidad_nueva, fecha)
             VALUES ('m1', 'c1', 'entrada', 5, 0, 5, datetime('now'))",
        )
            .execute(&pool)
            .await
            .unwrap();

        assert!(sqlx::query("UPDATE movimientos_stock SET cantidad = 7 WHERE id = 'm1'")
            .execute(&pool)
            .await
            .is_err());
        assert!(sqlx::query("DELETE FROM movimientos_stock WHERE id = 'm1'")
            .execute(&pool)
            .await
            .is_err());
    }
}
