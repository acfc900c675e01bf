// src/repositories/mod.rs
//! Entity store access for components

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::ledger::{LedgerError, LedgerResult};
use crate::models::{Componente, CreateComponenteRequest};

/// Base trait for key-based entity access with soft delete
#[async_trait]
pub trait CrudRepository<T, CreateDto>: Send + Sync
where
    T: Send + Unpin + for<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow>,
    CreateDto: Send,
{
    fn table_name(&self) -> &'static str;

    fn id_field(&self) -> &'static str {
        "id"
    }

    async fn create(&self, pool: &SqlitePool, data: CreateDto) -> LedgerResult<T>;

    /// Fetch by id regardless of the active flag
    async fn get_by_id(&self, pool: &SqlitePool, id: &str) -> LedgerResult<Option<T>> {
        let query = format!(
            "SELECT * FROM {} WHERE {} = ?",
            self.table_name(),
            self.id_field()
        );

        let result = sqlx::query_as::<_, T>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(result)
    }

    async fn get_active(&self, pool: &SqlitePool, id: &str) -> LedgerResult<Option<T>> {
        let query = format!(
            "SELECT * FROM {} WHERE {} = ? AND activo = 1",
            self.table_name(),
            self.id_field()
        );

        let result = sqlx::query_as::<_, T>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(result)
    }

    /// Soft delete. Rows are never removed so their history stays readable.
    async fn deactivate(&self, pool: &SqlitePool, id: &str) -> LedgerResult<()> {
        let query = format!(
            "UPDATE {} SET activo = 0, updated_at = ? WHERE {} = ? AND activo = 1",
            self.table_name(),
            self.id_field()
        );

        let result = sqlx::query(&query)
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound(format!(
                "Active {} '{}' not found",
                self.table_name(),
                id
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ComponenteRepository;

impl ComponenteRepository {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ComponenteRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CrudRepository<Componente, CreateComponenteRequest> for ComponenteRepository {
    fn table_name(&self) -> &'static str {
        "componentes"
    }

    async fn create(&self, pool: &SqlitePool, data: CreateComponenteRequest) -> LedgerResult<Componente> {
        let numero_parte = data.numero_parte.trim().to_string();
        let nombre = data.nombre.trim().to_string();
        if numero_parte.is_empty() || nombre.is_empty() {
            return Err(LedgerError::InvalidArgument(
                "Part number and name must not be blank".to_string(),
            ));
        }

        let now = Utc::now();
        let componente = Componente {
            id: Uuid::new_v4().to_string(),
            numero_parte,
            nombre,
            descripcion: data.descripcion,
            categoria: data.categoria,
            marca: data.marca,
            modelo: data.modelo,
            precio_unitario: data.precio_unitario.unwrap_or(0.0),
            stock_actual: data.stock_inicial.unwrap_or(0),
            stock_minimo: data.stock_minimo.unwrap_or(1),
            activo: true,
            created_at: now,
            updated_at: now,
        };

        if componente.stock_actual < 0 || componente.stock_minimo < 0 || componente.precio_unitario < 0.0 {
            return Err(LedgerError::InvalidArgument(
                "Stock and price values must be non-negative".to_string(),
            ));
        }

        sqlx::query(
            r#"INSERT INTO componentes
               (id, numero_parte, nombre, descripcion, categoria, marca, modelo,
                precio_unitario, stock_actual, stock_minimo, activo, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)"#,
        )
            .bind(&componente.id)
            .bind(&componente.numero_parte)
            .bind(&componente.nombre)
            .bind(&componente.descripcion)
            .bind(&componente.categoria)
            .bind(&componente.marca)
            .bind(&componente.modelo)
            .bind(componente.precio_unitario)
            .bind(componente.stock_actual)
            .bind(componente.stock_minimo)
            .bind(componente.created_at)
            .bind(componente.updated_at)
            .execute(pool)
            .await
            .map_err(|e| match e {
                // The UNIQUE index is the only duplicate check, so concurrent creates cannot both pass
                sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                    LedgerError::InvalidArgument(format!(
                        "Componente with part number '{}' already exists",
                        componente.numero_parte
                    ))
                }
                other => LedgerError::from(other),
            })?;

        Ok(componente)
    }
}
