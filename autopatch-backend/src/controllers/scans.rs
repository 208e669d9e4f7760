//! Scan API endpoints
//!
//! REST counterpart of the gateway methods, for clients that do not hold a
//! socket open.

use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;

use crate::AppState;
use crate::scan::ScanError;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/scans")
            .route("", web::get().to(list_scans))
            .route("", web::post().to(start_scan))
            .route("/{id}", web::get().to(get_scan))
            .route("/{id}", web::delete().to(cancel_scan))
            .route("/{id}/logs", web::get().to(get_scan_logs)),
    );
    cfg.service(web::resource("/api/agents").route(web::get().to(list_agents)));
}

#[derive(Debug, Deserialize)]
pub struct StartScanRequest {
    url: String,
}

fn error_response(e: ScanError) -> HttpResponse {
    let body = serde_json::json!({
        "success": false,
        "error": e.to_string()
    });
    match e {
        ScanError::InvalidUrl(_) => HttpResponse::BadRequest().json(body),
        ScanError::TooManyScans(_) => HttpResponse::TooManyRequests().json(body),
        ScanError::NotFound(_) => HttpResponse::NotFound().json(body),
        ScanError::NotRunning(_) => HttpResponse::Conflict().json(body),
    }
}

async fn start_scan(state: web::Data<AppState>, body: web::Json<StartScanRequest>) -> impl Responder {
    match state.scans.start_scan(&body.url) {
        Ok(scan) => HttpResponse::Accepted().json(serde_json::json!({
            "success": true,
            "scan": scan
        })),
        Err(e) => {
            log::info!("[SCAN] Rejected scan request for '{}': {}", body.url, e);
            error_response(e)
        }
    }
}

async fn list_scans(state: web::Data<AppState>) -> impl Responder {
    let scans = state.scans.list();
    HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "total": scans.len(),
        "scans": scans
    }))
}

async fn get_scan(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let id = path.into_inner();
    match state.scans.get(&id) {
        Some(scan) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "scan": scan
        })),
        None => error_response(ScanError::NotFound(id)),
    }
}

async fn get_scan_logs(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let id = path.into_inner();
    match state.scans.logs(&id) {
        Some(lines) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "scan_id": id,
            "lines": lines
        })),
        None => error_response(ScanError::NotFound(id)),
    }
}

async fn cancel_scan(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    match state.scans.cancel_scan(&path.into_inner()) {
        Ok(scan) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "scan": scan
        })),
        Err(e) => error_response(e),
    }
}

async fn list_agents(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "agents": state.scans.roster()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::AiResponse;
    use crate::controllers::test_support::test_state;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use serde_json::{json, Value};
    use std::time::Duration;

    #[actix_web::test]
    async fn test_start_then_fetch_scan() {
        let state = test_state(vec![
            AiResponse::text("map"),
            AiResponse::text("forms"),
            AiResponse::text("findings"),
            AiResponse::text("fixes"),
        ]);
        let app = test::init_service(App::new().app_data(state).configure(config)).await;

        let req = test::TestRequest::post()
            .uri("/api/scans")
            .set_json(json!({"url": "http://shop.test/"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let body: Value = test::read_body_json(resp).await;
        let id = body["scan"]["id"].as_str().unwrap().to_string();

        let mut scan = Value::Null;
        for _ in 0..100 {
            let req = test::TestRequest::get().uri(&format!("/api/scans/{}", id)).to_request();
            let body: Value = test::call_and_read_body_json(&app, req).await;
            scan = body["scan"].clone();
            if scan["status"] != "running" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(scan["status"], "completed");
        assert_eq!(scan["result"], "fixes");

        let req = test::TestRequest::get().uri(&format!("/api/scans/{}/logs", id)).to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let lines = body["lines"].as_array().unwrap();
        assert_eq!(lines[0]["agent"], "system");
        assert_eq!(lines.last().unwrap()["line"], "Final Result: fixes");

        let req = test::TestRequest::get().uri("/api/scans").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["total"], 1);

        let req = test::TestRequest::delete().uri(&format!("/api/scans/{}", id)).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[actix_web::test]
    async fn test_invalid_url_is_bad_request() {
        let app = test::init_service(App::new().app_data(test_state(vec![])).configure(config)).await;
        let req = test::TestRequest::post()
            .uri("/api/scans")
            .set_json(json!({"url": "file:///etc/passwd"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
    }

    #[actix_web::test]
    async fn test_unknown_scan_is_not_found() {
        let app = test::init_service(App::new().app_data(test_state(vec![])).configure(config)).await;
        for req in [
            test::TestRequest::get().uri("/api/scans/missing").to_request(),
            test::TestRequest::get().uri("/api/scans/missing/logs").to_request(),
            test::TestRequest::delete().uri("/api/scans/missing").to_request(),
        ] {
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        }
    }

    #[actix_web::test]
    async fn test_list_agents() {
        let app = test::init_service(App::new().app_data(test_state(vec![])).configure(config)).await;
        let req = test::TestRequest::get().uri("/api/agents").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let agents = body["agents"].as_array().unwrap();
        assert_eq!(agents.len(), 4);
        assert_eq!(agents[1]["name"], "Website Reconnaissance Specialist");
        assert_eq!(agents[0]["tools"], json!(["crawl_site"]));
    }
}
