use actix_web::{web, HttpResponse, Responder};

use crate::AppState;
use crate::scan::ScanStatus;

/// Version from Cargo.toml, available at compile time
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/health").route(web::get().to(health_check)));
    cfg.service(web::resource("/api/version").route(web::get().to(get_version)));
}

async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let running = state
        .scans
        .list()
        .iter()
        .filter(|s| s.status == ScanStatus::Running)
        .count();

    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "version": VERSION,
        "model": state.config.llm.model,
        "browser": state.launcher_name,
        "running_scans": running,
        "connected_clients": state.broadcaster.client_count()
    }))
}

async fn get_version() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "version": VERSION
    }))
}
