// HTTP handlers - health, Prometheus metrics and sync stats

use actix_web::{web, HttpResponse, Responder};
use delegation_sync::SyncOrchestrator;
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use tracing::error;

pub struct AppState {
    pub orchestrator: Arc<SyncOrchestrator>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/metrics", web::get().to(metrics))
        .route("/sync/stats", web::get().to(sync_stats));
}

async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "sync-service",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn metrics() -> impl Responder {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

async fn sync_stats(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.orchestrator.history())
}
