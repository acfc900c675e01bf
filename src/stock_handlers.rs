// src/stock_handlers.rs
//! Stock movement endpoints

use actix_web::{web, HttpResponse};
use serde::Serialize;
use validator::Validate;

use crate::error::ApiResult;
use crate::handlers::{ApiResponse, AppData};
use crate::models::{ComponenteView, MovimientoFilter, NuevoMovimiento};

#[derive(Debug, Serialize)]
pub struct ValorInventario {
    pub valor_total: f64,
}

pub async fn create_movimiento(
    app_state: AppData,
    request: web::Json<NuevoMovimiento>,
) -> ApiResult<HttpResponse> {
    let request = request.into_inner();
    request.validate()?;

    let resultado = app_state.ledger.apply_movement(request).await?;

    log::info!(
        "Movement {} ({}) on componente {}: {} -> {}",
        resultado.movimiento.id,
        resultado.movimiento.tipo,
        resultado.movimiento.componente_id,
        resultado.movimiento.cantidad_anterior,
        resultado.movimiento.cantidad_nueva
    );

    let message = if resultado.bajo_stock {
        "Movement recorded, component is at or below minimum stock"
    } else {
        "Movement recorded successfully"
    };

    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        resultado,
        message.to_string(),
    )))
}

pub async fn search_movimientos(
    app_state: AppData,
    query: web::Query<MovimientoFilter>,
) -> ApiResult<HttpResponse> {
    let page = app_state.ledger.search_movements(&query).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(page)))
}

pub async fn get_movimiento(
    app_state: AppData,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let movimiento = app_state.ledger.get_movement(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(movimiento)))
}

pub async fn get_tipos_movimiento(app_state: AppData) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(ApiResponse::success(app_state.ledger.movement_types())))
}

pub async fn get_bajo_stock(app_state: AppData) -> ApiResult<HttpResponse> {
    let componentes: Vec<ComponenteView> = app_state
        .ledger
        .list_low_stock()
        .await?
        .into_iter()
        .map(ComponenteView::from)
        .collect();

    Ok(HttpResponse::Ok().json(ApiResponse::success(componentes)))
}

pub async fn get_valor_inventario(app_state: AppData) -> ApiResult<HttpResponse> {
    let valor_total = app_state.ledger.inventory_value().await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(ValorInventario { valor_total })))
}
