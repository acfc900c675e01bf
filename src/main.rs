// Stock ledger service for agricultural equipment inventory
use actix_web::{
    middleware::{Compress, DefaultHeaders, Logger},
    web, App, HttpServer,
};
use actix_web::http::header;
use actix_cors::Cors;
use anyhow::Context;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod componente_handlers;
mod config;
mod db;
mod error;
mod handlers;
mod ledger;
mod models;
mod monitoring;
mod repositories;
mod stock_handlers;

use crate::config::{load_config, Config};
use crate::ledger::StockLedger;
use crate::monitoring::{Metrics, RequestLogger};

pub struct AppState {
    pub db_pool: SqlitePool,
    pub ledger: StockLedger,
}

// ==================== ROUTES ====================

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Health check and metrics
        .route("/health", web::get().to(monitoring::health_check))
        .route("/ready", web::get().to(monitoring::readiness_check))
        .route("/metrics", web::get().to(monitoring::metrics_endpoint))
        .service(
            web::scope("/api/v1")
                .service(
                    web::scope("/stock")
                        .route("/movimientos", web::post().to(stock_handlers::create_movimiento))
                        .route("/movimientos", web::get().to(stock_handlers::search_movimientos))
                        .route("/movimientos/{id}", web::get().to(stock_handlers::get_movimiento))
                        .route("/tipos", web::get().to(stock_handlers::get_tipos_movimiento))
                        .route("/bajo-stock", web::get().to(stock_handlers::get_bajo_stock))
                        .route("/valor", web::get().to(stock_handlers::get_valor_inventario))
                )
                .service(
                    web::scope("/componentes")
                        .route("", web::post().to(componente_handlers::create_componente))
                        .route("/{id}", web::get().to(componente_handlers::get_componente))
                        .route("/{id}", web::delete().to(componente_handlers::deactivate_componente))
                        .route("/{id}/movimientos", web::get().to(componente_handlers::get_componente_movimientos))
                        .route("/{id}/resumen", web::get().to(componente_handlers::get_componente_resumen))
                )
        );
}

// ==================== MAIN ====================

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration (this calls load_env_file internally)
    let config = load_config()?;

    setup_logging(&config)?;
    config.print_startup_info();

    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool).await?;

    let app_state = Arc::new(AppState {
        ledger: StockLedger::new(pool.clone(), &config.ledger),
        db_pool: pool,
    });

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    log::info!("Starting server at http://{}", bind_address);

    let metrics_arc = Arc::new(Metrics::new());
    let metrics = web::Data::from(metrics_arc.clone());
    let server_config = config.server.clone();

    let mut server = HttpServer::new(move || {
        let cors = setup_cors(&config.security.allowed_origins, config.is_production());
        let security_headers = setup_security_headers(&config.security);
        let json_config = web::JsonConfig::default().limit(config.security.max_request_size);

        App::new()
            .wrap(cors)
            .wrap(security_headers)
            .wrap(Logger::default())
            .wrap(Compress::default())
            .wrap(RequestLogger::new(metrics_arc.clone()))
            .app_data(web::Data::new(app_state.clone()))
            .app_data(metrics.clone())
            .app_data(json_config)
            .configure(configure_routes)
    })
        .keep_alive(Duration::from_secs(server_config.keep_alive))
        .client_request_timeout(Duration::from_secs(server_config.client_timeout))
        .client_disconnect_timeout(Duration::from_secs(server_config.client_shutdown));

    if let Some(workers) = server_config.workers {
        server = server.workers(workers);
    }

    server
        .bind(&bind_address)
        .with_context(|| format!("Failed to bind {}", bind_address))?
        .run()
        .await
        .context("Server failed to run")?;

    Ok(())
}

// ==================== HELPER FUNCTIONS ====================

fn setup_cors(allowed_origins: &[String], is_production: bool) -> Cors {
    let mut cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
        .allowed_headers(vec![
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::USER_AGENT,
            header::REFERER,
        ])
        .expose_headers(vec![header::CONTENT_LENGTH])
        .max_age(3600);

    // Config::validate rejects the wildcard in production before we get here
    if allowed_origins.iter().any(|o| o == "*") && !is_production {
        log::warn!("Using wildcard CORS (*) in development mode");
        return cors.allow_any_origin().allow_any_header().allow_any_method();
    }

    for origin in allowed_origins.iter().filter(|o| !o.is_empty() && o.as_str() != "*") {
        cors = cors.allowed_origin(origin);
    }

    cors
}

fn setup_logging(config: &Config) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.as_str()));

    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.format.eq_ignore_ascii_case("json") {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .context("Failed to initialise logging")?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .context("Failed to initialise logging")?;
    }

    Ok(())
}

fn setup_security_headers(config: &crate::config::SecurityConfig) -> DefaultHeaders {
    let mut headers = DefaultHeaders::new()
        .add(("X-Content-Type-Options", "nosniff"))
        .add(("X-Frame-Options", "DENY"))
        .add(("Referrer-Policy", "strict-origin-when-cross-origin"));

    if config.require_https {
        headers = headers.add((
            "Strict-Transport-Security",
            "max-age=31536000; includeSubDomains"
        ));
    }

    headers
}
