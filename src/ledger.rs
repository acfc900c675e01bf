// src/ledger.rs
//! Stock ledger: applies quantity changes to components and records each one
//! as an immutable movement in the same transaction.
//!
//! Concurrent movements on one component are serialized with compare-and-swap:
//! the stock read outside the transaction is the expected value of the
//! conditional update, and a mismatch (or a busy database) restarts the
//! attempt from a fresh read.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use strum::IntoEnumIterator;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::LedgerConfig;
use crate::handlers::{PaginatedResponse, PaginationQuery};
use crate::models::{
    Componente, MovimientoFilter, MovimientoResultado, MovimientoStock, NuevoMovimiento,
    ResumenMovimientos, TipoMovimiento, TipoMovimientoInfo,
};
use crate::repositories::{ComponenteRepository, CrudRepository};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("Insufficient stock. Available: {disponible}, requested: {solicitado}")]
    InsufficientStock { disponible: i64, solicitado: i64 },
    #[error("Stock update kept conflicting after {attempts} attempts, try again")]
    StorageConflict { attempts: u32 },
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Outcome of the arithmetic rules for one movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub cantidad_nueva: i64,
    /// Value stored in the movement's `cantidad` column.
    pub cantidad_registrada: i64,
}

/// Quantity rules, independent of storage.
///
/// entrada and salida are deltas and need `cantidad >= 1`. ajuste sets the
/// stock to `cantidad` (>= 0) and records the signed difference.
pub fn compute_transition(
    tipo: TipoMovimiento,
    cantidad_anterior: i64,
    cantidad: i64,
) -> LedgerResult<Transition> {
    match tipo {
        TipoMovimiento::Entrada => {
            ensure_positive(tipo, cantidad)?;
            let cantidad_nueva = cantidad_anterior.checked_add(cantidad).ok_or_else(|| {
                LedgerError::InvalidArgument(format!("Quantity {} overflows current stock", cantidad))
            })?;
            Ok(Transition { cantidad_nueva, cantidad_registrada: cantidad })
        }
        TipoMovimiento::Salida => {
            ensure_positive(tipo, cantidad)?;
            let cantidad_nueva = cantidad_anterior - cantidad;
            if cantidad_nueva < 0 {
                return Err(LedgerError::InsufficientStock {
                    disponible: cantidad_anterior,
                    solicitado: cantidad,
                });
            }
            Ok(Transition { cantidad_nueva, cantidad_registrada: cantidad })
        }
        TipoMovimiento::Ajuste => {
            if cantidad < 0 {
                return Err(LedgerError::InvalidArgument(format!(
                    "Adjustment target must be zero or positive, got {}",
                    cantidad
                )));
            }
            Ok(Transition {
                cantidad_nueva: cantidad,
                cantidad_registrada: cantidad - cantidad_anterior,
            })
        }
    }
}

fn ensure_positive(tipo: TipoMovimiento, cantidad: i64) -> LedgerResult<()> {
    if cantidad < 1 {
        return Err(LedgerError::InvalidArgument(format!(
            "Quantity for {} must be a positive integer, got {}",
            tipo, cantidad
        )));
    }
    Ok(())
}

pub fn parse_tipo(raw: &str) -> LedgerResult<TipoMovimiento> {
    TipoMovimiento::from_str(raw.trim()).map_err(|_| {
        LedgerError::InvalidArgument(format!(
            "Invalid movement type '{}'. Valid types: entrada, salida, ajuste",
            raw
        ))
    })
}

/// SQLITE_BUSY / SQLITE_LOCKED and their extended codes.
fn is_contention(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .map(|code| matches!(code & 0xff, 5 | 6))
            .unwrap_or(false),
        _ => false,
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(date.and_time(NaiveTime::MIN), Utc)
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Clone)]
pub struct StockLedger {
    pool: SqlitePool,
    componentes: ComponenteRepository,
    max_retries: u32,
    default_history_limit: i64,
    max_history_limit: i64,
}

impl StockLedger {
    pub fn new(pool: SqlitePool, config: &LedgerConfig) -> Self {
        Self {
            pool,
            componentes: ComponenteRepository::new(),
            max_retries: config.max_retries.max(1),
            default_history_limit: config.default_history_limit,
            max_history_limit: config.max_history_limit,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Apply one movement and append it to the ledger atomically.
    pub async fn apply_movement(&self, request: NuevoMovimiento) -> LedgerResult<MovimientoResultado> {
        let tipo = parse_tipo(&request.tipo)?;

        for attempt in 1..=self.max_retries {
            match self.try_apply(&request, tipo).await {
                Ok(Some(resultado)) => return Ok(resultado),
                Ok(None) => {
                    warn!(
                        componente_id = %request.componente_id,
                        attempt,
                        "stock changed concurrently, retrying movement"
                    );
                }
                Err(LedgerError::Database(ref e)) if is_contention(e) => {
                    warn!(
                        componente_id = %request.componente_id,
                        attempt,
                        error = %e,
                        "database busy, retrying movement"
                    );
                }
                Err(e) => return Err(e),
            }

            if attempt < self.max_retries {
                tokio::time::sleep(Duration::from_millis(5 * u64::from(attempt))).await;
            }
        }

        Err(LedgerError::StorageConflict { attempts: self.max_retries })
    }

    /// One read-compute-write cycle. `Ok(None)` means the stock moved under us.
    async fn try_apply(
        &self,
        request: &NuevoMovimiento,
        tipo: TipoMovimiento,
    ) -> LedgerResult<Option<MovimientoResultado>> {
        let componente = self
            .componentes
            .get_active(&self.pool, &request.componente_id)
            .await?
            .ok_or_else(|| not_found(&request.componente_id))?;

        let cantidad_anterior = componente.stock_actual;
        let transition = compute_transition(tipo, cantidad_anterior, request.cantidad)?;

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"UPDATE componentes SET stock_actual = ?
               WHERE id = ? AND activo = 1 AND stock_actual = ?"#,
        )
            .bind(transition.cantidad_nueva)
            .bind(&componente.id)
            .bind(cantidad_anterior)
            .execute(&mut *tx)
            .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        // Taken while holding the write lock, so it follows commit order
        let now = Utc::now();

        sqlx::query("UPDATE componentes SET updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(&componente.id)
            .execute(&mut *tx)
            .await?;

        let movimiento = MovimientoStock {
            id: Uuid::new_v4().to_string(),
            componente_id: componente.id.clone(),
            tipo,
            cantidad: transition.cantidad_registrada,
            cantidad_anterior,
            cantidad_nueva: transition.cantidad_nueva,
            motivo: request.motivo.clone(),
            observaciones: request.observaciones.clone(),
            usuario: request.usuario.clone(),
            fecha: now,
        };

        sqlx::query(
            r#"INSERT INTO movimientos_stock
               (id, componente_id, tipo, cantidad, cantidad_anterior, cantidad_nueva,
                motivo, observaciones, usuario, fecha)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
            .bind(&movimiento.id)
            .bind(&movimiento.componente_id)
            .bind(movimiento.tipo)
            .bind(movimiento.cantidad)
            .bind(movimiento.cantidad_anterior)
            .bind(movimiento.cantidad_nueva)
            .bind(&movimiento.motivo)
            .bind(&movimiento.observaciones)
            .bind(&movimiento.usuario)
            .bind(movimiento.fecha)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            componente_id = %movimiento.componente_id,
            tipo = %movimiento.tipo,
            anterior = movimiento.cantidad_anterior,
            nueva = movimiento.cantidad_nueva,
            "stock movement applied"
        );

        Ok(Some(MovimientoResultado {
            stock_actual: movimiento.cantidad_nueva,
            bajo_stock: movimiento.cantidad_nueva <= componente.stock_minimo,
            movimiento,
        }))
    }

    /// Most recent movements of a component, newest first. The log is
    /// append-only, so rowid order is commit order.
    pub async fn list_movements(
        &self,
        componente_id: &str,
        limit: Option<i64>,
    ) -> LedgerResult<Vec<MovimientoStock>> {
        self.componentes
            .get_by_id(&self.pool, componente_id)
            .await?
            .ok_or_else(|| not_found(componente_id))?;

        let limit = limit
            .unwrap_or(self.default_history_limit)
            .clamp(1, self.max_history_limit);

        let movimientos = sqlx::query_as::<_, MovimientoStock>(
            r#"SELECT id, componente_id, tipo, cantidad, cantidad_anterior, cantidad_nueva,
                      motivo, observaciones, usuario, fecha
               FROM movimientos_stock
               WHERE componente_id = ?
               ORDER BY rowid DESC
               LIMIT ?"#,
        )
            .bind(componente_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(movimientos)
    }

    /// Active components at or below their minimum, most short first.
    pub async fn list_low_stock(&self) -> LedgerResult<Vec<Componente>> {
        let componentes = sqlx::query_as::<_, Componente>(
            r#"SELECT * FROM componentes
               WHERE activo = 1 AND stock_actual <= stock_minimo
               ORDER BY (stock_actual - stock_minimo) ASC, nombre ASC"#,
        )
            .fetch_all(&self.pool)
            .await?;

        debug!(count = componentes.len(), "low stock components listed");
        Ok(componentes)
    }

    /// Σ stock_actual × precio_unitario over active components.
    pub async fn inventory_value(&self) -> LedgerResult<f64> {
        let total: f64 = sqlx::query_scalar(
            "SELECT CAST(COALESCE(SUM(stock_actual * precio_unitario), 0) AS REAL) FROM componentes WHERE activo = 1",
        )
            .fetch_one(&self.pool)
            .await?;

        Ok(round_cents(total))
    }

    pub async fn get_movement(&self, id: &str) -> LedgerResult<MovimientoStock> {
        sqlx::query_as::<_, MovimientoStock>(
            r#"SELECT id, componente_id, tipo, cantidad, cantidad_anterior, cantidad_nueva,
                      motivo, observaciones, usuario, fecha
               FROM movimientos_stock WHERE id = ?"#,
        )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("Movement with ID '{}' not found", id)))
    }

    /// Paginated movement search across components.
    pub async fn search_movements(
        &self,
        filter: &MovimientoFilter,
    ) -> LedgerResult<PaginatedResponse<MovimientoStock>> {
        let tipo = filter
            .tipo
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .map(parse_tipo)
            .transpose()?;

        if let (Some(desde), Some(hasta)) = (filter.fecha_desde, filter.fecha_hasta) {
            if desde > hasta {
                return Err(LedgerError::InvalidArgument(format!(
                    "fecha_desde ({}) is after fecha_hasta ({})",
                    desde, hasta
                )));
            }
        }

        let (page, per_page, offset) = PaginationQuery {
            page: filter.page,
            per_page: filter.per_page,
        }
            .normalize();

        let mut count_builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM movimientos_stock WHERE 1 = 1");
        push_movement_filters(&mut count_builder, filter, tipo);
        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut data_builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"SELECT id, componente_id, tipo, cantidad, cantidad_anterior, cantidad_nueva,
                      motivo, observaciones, usuario, fecha
               FROM movimientos_stock WHERE 1 = 1"#,
        );
        push_movement_filters(&mut data_builder, filter, tipo);
        data_builder
            .push(" ORDER BY rowid DESC LIMIT ")
            .push_bind(per_page)
            .push(" OFFSET ")
            .push_bind(offset);

        let data = data_builder
            .build_query_as::<MovimientoStock>()
            .fetch_all(&self.pool)
            .await?;

        Ok(PaginatedResponse::new(data, total, page, per_page))
    }

    pub fn movement_types(&self) -> Vec<TipoMovimientoInfo> {
        TipoMovimiento::iter()
            .map(|valor| TipoMovimientoInfo { valor, label: valor.label() })
            .collect()
    }

    pub async fn movement_summary(&self, componente_id: &str) -> LedgerResult<ResumenMovimientos> {
        let componente = self
            .componentes
            .get_by_id(&self.pool, componente_id)
            .await?
            .ok_or_else(|| not_found(componente_id))?;

        let (total_movimientos, total_entradas, total_salidas, total_ajustes): (i64, i64, i64, i64) =
            sqlx::query_as(
                r#"SELECT COUNT(*),
                          COALESCE(SUM(CASE WHEN tipo = 'entrada' THEN cantidad ELSE 0 END), 0),
                          COALESCE(SUM(CASE WHEN tipo = 'salida' THEN cantidad ELSE 0 END), 0),
                          COALESCE(SUM(CASE WHEN tipo = 'ajuste' THEN 1 ELSE 0 END), 0)
                   FROM movimientos_stock
                   WHERE componente_id = ?"#,
            )
                .bind(componente_id)
                .fetch_one(&self.pool)
                .await?;

        let ultimo_movimiento = self
            .list_movements(componente_id, Some(1))
            .await?
            .into_iter()
            .next()
            .map(|m| m.fecha);

        Ok(ResumenMovimientos {
            componente_id: componente.id,
            total_movimientos,
            total_entradas,
            total_salidas,
            total_ajustes,
            stock_actual: componente.stock_actual,
            ultimo_movimiento,
        })
    }
}

fn push_movement_filters<'a>(
    builder: &mut QueryBuilder<'a, Sqlite>,
    filter: &'a MovimientoFilter,
    tipo: Option<TipoMovimiento>,
) {
    if let Some(componente_id) = filter.componente_id.as_deref().filter(|c| !c.is_empty()) {
        builder.push(" AND componente_id = ").push_bind(componente_id);
    }
    if let Some(tipo) = tipo {
        builder.push(" AND tipo = ").push_bind(tipo);
    }
    if let Some(desde) = filter.fecha_desde {
        builder.push(" AND fecha >= ").push_bind(start_of_day(desde));
    }
    if let Some(hasta) = filter.fecha_hasta.and_then(|d| d.succ_opt()) {
        builder.push(" AND fecha < ").push_bind(start_of_day(hasta));
    }
}

fn not_found(componente_id: &str) -> LedgerError {
    LedgerError::NotFound(format!("Componente with ID '{}' not found", componente_id))
}
