// src/componente_handlers.rs
//! Component registry endpoints and per-component history

use actix_web::{web, HttpResponse};
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::handlers::{ApiResponse, AppData, HistoryQuery};
use crate::models::{ComponenteView, CreateComponenteRequest};
use crate::repositories::{ComponenteRepository, CrudRepository};

pub async fn create_componente(
    app_state: AppData,
    request: web::Json<CreateComponenteRequest>,
) -> ApiResult<HttpResponse> {
    let request = request.into_inner().trimmed();
    request.validate()?;

    let componente = ComponenteRepository::new()
        .create(&app_state.db_pool, request)
        .await?;

    log::info!(
        "Componente {} created ({}), initial stock {}",
        componente.id, componente.numero_parte, componente.stock_actual
    );

    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        ComponenteView::from(componente),
        "Componente created successfully".to_string(),
    )))
}

pub async fn get_componente(
    app_state: AppData,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();
    let componente = ComponenteRepository::new()
        .get_by_id(&app_state.db_pool, &id)
        .await?
        .ok_or_else(|| ApiError::componente_not_found(&id))?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(ComponenteView::from(componente))))
}

pub async fn deactivate_componente(
    app_state: AppData,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();
    ComponenteRepository::new()
        .deactivate(&app_state.db_pool, &id)
        .await?;

    log::info!("Componente {} deactivated", id);

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        id,
        "Componente deactivated successfully".to_string(),
    )))
}

pub async fn get_componente_movimientos(
    app_state: AppData,
    path: web::Path<String>,
    query: web::Query<HistoryQuery>,
) -> ApiResult<HttpResponse> {
    let movimientos = app_state
        .ledger
        .list_movements(&path.into_inner(), query.limit)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(movimientos)))
}

pub async fn get_componente_resumen(
    app_state: AppData,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let resumen = app_state.ledger.movement_summary(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(resumen)))
}

#[cfg(test)]
mod tests {
    use crate::handlers::test_support::test_state;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use serde_json::{json, Value};

    fn nuevo_componente(numero_parte: &str) -> Value {
        json!({
            "numero_parte": numero_parte,
            "nombre": "Rodamiento 6204",
            "categoria": "rodamientos",
            "precio_unitario": 4.5,
            "stock_inicial": 10,
            "stock_minimo": 5
        })
    }

    #[actix_rt::test]
    async fn test_componente_lifecycle() {
        let (app_state, _dir) = test_state().await;
        let app = test::init_service(
            App::new().app_data(app_state.clone()).configure(crate::configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/componentes")
            .set_json(nuevo_componente("ROD-6204"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        let id = body["data"]["id"].as_str().unwrap().to_string();
        assert_eq!(body["data"]["valor_total_stock"], 45.0);
        assert_eq!(body["data"]["bajo_stock"], false);

        let req = test::TestRequest::post()
            .uri("/api/v1/componentes")
            .set_json(nuevo_componente("ROD-6204"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::delete()
            .uri(&format!("/api/v1/componentes/{}", id))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        // Still readable, but no longer accepts movements
        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/componentes/{}", id))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["activo"], false);

        let req = test::TestRequest::post()
            .uri("/api/v1/stock/movimientos")
            .set_json(json!({ "componente_id": id, "tipo": "entrada", "cantidad": 1 }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::delete()
            .uri(&format!("/api/v1/componentes/{}", id))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_rt::test]
    async fn test_invalid_componente_is_unprocessable() {
        let (app_state, _dir) = test_state().await;
        let app = test::init_service(
            App::new().app_data(app_state.clone()).configure(crate::configure_routes),
        )
        .await;

        let mut payload = nuevo_componente("");
        payload["stock_inicial"] = json!(-2);
        let req = test::TestRequest::post()
            .uri("/api/v1/componentes")
            .set_json(payload)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[actix_rt::test]
    async fn test_blank_part_number_is_unprocessable() {
        let (app_state, _dir) = test_state().await;
        let app = test::init_service(
            App::new().app_data(app_state.clone()).configure(crate::configure_routes),
        )
        .await;

        for (numero_parte, nombre) in [("   ", "Correa"), ("COR-1", " \t ")] {
            let req = test::TestRequest::post()
                .uri("/api/v1/componentes")
                .set_json(json!({ "numero_parte": numero_parte, "nombre": nombre }))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["success"], false);
        }

        // Surrounding whitespace is stripped before storing
        let req = test::TestRequest::post()
            .uri("/api/v1/componentes")
            .set_json(json!({ "numero_parte": "  COR-1 ", "nombre": " Correa " }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["numero_parte"], "COR-1");
        assert_eq!(body["data"]["nombre"], "Correa");
    }

    #[actix_rt::test]
    async fn test_history_and_resumen() {
        let (app_state, _dir) = test_state().await;
        let app = test::init_service(
            App::new().app_data(app_state.clone()).configure(crate::configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/componentes")
            .set_json(nuevo_componente("FIL-01"))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let id = body["data"]["id"].as_str().unwrap().to_string();

        for (tipo, cantidad) in [("entrada", 5), ("salida", 12), ("ajuste", 0)] {
            let req = test::TestRequest::post()
                .uri("/api/v1/stock/movimientos")
                .set_json(json!({ "componente_id": id, "tipo": tipo, "cantidad": cantidad }))
                .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);
        }

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/componentes/{}/movimientos?limit=2", id))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let history = body["data"].as_array().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0]["tipo"], "ajuste");
        assert_eq!(history[0]["cantidad_anterior"], 3);
        assert_eq!(history[0]["cantidad_nueva"], 0);

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/componentes/{}/resumen", id))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["total_movimientos"], 3);
        assert_eq!(body["data"]["total_entradas"], 5);
        assert_eq!(body["data"]["total_salidas"], 12);
        assert_eq!(body["data"]["stock_actual"], 0);

        let req = test::TestRequest::get()
            .uri("/api/v1/componentes/missing/movimientos")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }
}
