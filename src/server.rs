//! Admin and booking HTTP endpoints.
//!
//! | Route | Auth | Purpose |
//! |-------|------|---------|
//! | `GET /health` | none | liveness |
//! | `POST /api/admin/sync-pages` | bearer `ADMIN_API_SECRET` | scan routes and sync the pages table |
//! | `GET /api/availability?service=type:location&month=YYYY-MM` | none | per-day availability |
//! | `POST /api/checkout` | none | start a paid booking |
//! | `POST /api/booking/confirm` | none | confirm after payment |
//!
//! Every response is JSON with a `success` flag; failures carry `error`.

use crate::availability::{AvailabilityRegistry, BookableService, YearMonth};
use crate::booking::{BookingError, BookingService, CheckoutRequest};
use crate::config::{ConfigError, SiteConfig};
use crate::scan;
use crate::store::PageStore;
use crate::sync::{self, SyncOptions};
use crate::types::ServiceKey;
use actix_web::http::StatusCode;
use actix_web::{App, HttpRequest, HttpResponse, HttpServer, web};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

/// Everything the handlers need, shared across workers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<SiteConfig>,
    /// Project directory; `pages.root` and `pages.error_log` are relative to it.
    pub root: PathBuf,
    pub admin_secret: Option<String>,
    pub pages: Arc<dyn PageStore>,
    pub availability: Arc<AvailabilityRegistry>,
    pub booking: Arc<BookingService>,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .service(
            web::scope("/api")
                .route("/admin/sync-pages", web::post().to(sync_pages))
                .route("/availability", web::get().to(availability))
                .route("/checkout", web::post().to(checkout))
                .route("/booking/confirm", web::post().to(confirm)),
        );
}

/// Bind and serve until shutdown.
pub async fn run(state: AppState) -> std::io::Result<()> {
    let bind_addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    tracing::info!(addr = %bind_addr, "starting server");

    let data = web::Data::new(state);
    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .configure(configure_routes)
    })
    .bind(&bind_addr)?
    .run()
    .await
}

fn failure(status: StatusCode, error: impl ToString) -> HttpResponse {
    HttpResponse::build(status).json(json!({
        "success": false,
        "error": error.to_string(),
    }))
}

fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "success": true,
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn sync_pages(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    let Some(secret) = state.admin_secret.as_deref() else {
        return failure(
            StatusCode::SERVICE_UNAVAILABLE,
            ConfigError::MissingSecret("ADMIN_API_SECRET"),
        );
    };
    if bearer_token(&req) != Some(secret) {
        return failure(StatusCode::UNAUTHORIZED, "Unauthorized");
    }

    let pages = &state.config.pages;
    let manifest = match scan::scan(&state.root.join(&pages.root), &pages.marker_file) {
        Ok(manifest) => manifest,
        Err(e) => {
            tracing::error!(error = %e, "route scan failed");
            return failure(StatusCode::INTERNAL_SERVER_ERROR, e);
        }
    };
    let options = SyncOptions {
        dry_run: false,
        error_log: Some(state.root.join(&pages.error_log)),
    };

    match sync::sync_pages(&manifest, &state.config, state.pages.as_ref(), &options).await {
        Ok(report) => HttpResponse::Ok().json(json!({
            "success": true,
            "message": format!(
                "Synced {} routes: {} new, {} adopted, {} conflicts",
                report.total_scanned,
                report.new_pages(),
                report.updated.len(),
                report.conflicts.len()
            ),
            "totalScanned": report.total_scanned,
            "newPages": report.new_pages(),
        })),
        Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

#[derive(Debug, Deserialize)]
struct AvailabilityQuery {
    service: String,
    month: String,
}

async fn availability(
    query: web::Query<AvailabilityQuery>,
    state: web::Data<AppState>,
) -> HttpResponse {
    let key: ServiceKey = match query.service.parse() {
        Ok(key) => key,
        Err(e) => return failure(StatusCode::BAD_REQUEST, e),
    };
    let month: YearMonth = match query.month.parse() {
        Ok(month) => month,
        Err(e) => return failure(StatusCode::BAD_REQUEST, e),
    };
    let service = match BookableService::from_config(&state.config, &key) {
        Ok(service) => service,
        Err(e) => return failure(StatusCode::BAD_REQUEST, e),
    };

    let cache = state.availability.cache(&service);
    let today = chrono::Utc::now().date_naive();
    let load = match cache.load_month(month, today).await {
        Ok(load) => load,
        Err(e) => return failure(StatusCode::INTERNAL_SERVER_ERROR, e),
    };
    let loading = load.remaining.as_ref().is_some_and(|h| !h.is_finished());
    let days = cache.month_summary(month).await;

    HttpResponse::Ok().json(json!({
        "success": true,
        "service": key.to_string(),
        "month": month.to_string(),
        "days": days,
        "loading": loading,
    }))
}

fn booking_status(err: &BookingError) -> StatusCode {
    match err {
        BookingError::InvalidRequest(_) | BookingError::Config(_) => StatusCode::BAD_REQUEST,
        BookingError::UnknownSession(_) => StatusCode::NOT_FOUND,
        BookingError::NotPaid { .. } => StatusCode::PAYMENT_REQUIRED,
        BookingError::SlotTaken { .. } | BookingError::InProgress(_) => StatusCode::CONFLICT,
        BookingError::Upstream(_) => StatusCode::BAD_GATEWAY,
    }
}

async fn checkout(
    payload: web::Json<CheckoutRequest>,
    state: web::Data<AppState>,
) -> HttpResponse {
    match state.booking.create_checkout(&payload).await {
        Ok(started) => HttpResponse::Ok().json(json!({
            "success": true,
            "sessionId": started.session_id,
            "url": started.url,
        })),
        Err(e) => {
            tracing::warn!(error = %e, "checkout failed");
            failure(booking_status(&e), e)
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmRequest {
    session_id: String,
}

async fn confirm(payload: web::Json<ConfirmRequest>, state: web::Data<AppState>) -> HttpResponse {
    match state.booking.confirm(&payload.session_id).await {
        Ok(confirmation) => HttpResponse::Ok().json(json!({
            "success": true,
            "bookingId": confirmation.booking_id,
            "alreadyConfirmed": confirmation.already_confirmed,
        })),
        Err(e) => {
            tracing::warn!(session_id = %payload.session_id, error = %e, "booking confirmation failed");
            failure(booking_status(&e), e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::availability::AvailabilitySource;
    use crate::availability::zoho::AppointmentRequest;
    use crate::booking::AppointmentBooker;
    use crate::config::ServiceConfig;
    use crate::http::UpstreamError;
    use crate::kv::MemoryStore;
    use crate::payment::{CheckoutSession, PaymentProvider, SessionParams};
    use crate::store::MemoryDatabase;
    use crate::test_helpers::setup_fixtures;
    use actix_web::test;
    use async_trait::async_trait;
    use chrono::{Datelike, NaiveDate, Weekday};
    use serde_json::Value;
    use tempfile::TempDir;

    struct Offline;

    #[async_trait]
    impl PaymentProvider for Offline {
        async fn create_session(&self, _: &SessionParams) -> Result<CheckoutSession, UpstreamError> {
            Err(UpstreamError::Api {
                status: 503,
                message: "offline".into(),
            })
        }

        async fn retrieve_session(&self, _: &str) -> Result<CheckoutSession, UpstreamError> {
            Err(UpstreamError::Api {
                status: 503,
                message: "offline".into(),
            })
        }
    }

    #[async_trait]
    impl AppointmentBooker for Offline {
        async fn book(&self, _: &AppointmentRequest<'_>) -> Result<String, UpstreamError> {
            Err(UpstreamError::Rejected("offline".into()))
        }
    }

    #[async_trait]
    impl AvailabilitySource for Offline {
        async fn available_slots(
            &self,
            _: &BookableService,
            date: NaiveDate,
        ) -> Result<Vec<String>, UpstreamError> {
            // Mondays are fully booked.
            if date.weekday() == Weekday::Mon {
                Ok(Vec::new())
            } else {
                Ok(vec!["10:00".to_string()])
            }
        }
    }

    fn state(tmp: &TempDir, db: Arc<MemoryDatabase>) -> AppState {
        let mut config = SiteConfig::default();
        config.booking.services.insert(
            "consult:amsterdam".into(),
            ServiceConfig {
                service_id: "svc-1".into(),
                staff_id: "staff-1".into(),
            },
        );
        let config = Arc::new(config);
        let registry = Arc::new(AvailabilityRegistry::new(
            Arc::new(Offline),
            Arc::new(MemoryStore::new()),
            5,
        ));
        let booking = Arc::new(BookingService::new(
            Arc::clone(&config),
            Arc::new(Offline),
            Arc::new(Offline),
            db.clone(),
            db.clone(),
            Arc::clone(&registry),
        ));
        AppState {
            config,
            root: tmp.path().to_path_buf(),
            admin_secret: Some("s3cret".into()),
            pages: db,
            availability: registry,
            booking,
        }
    }

    macro_rules! app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($state))
                    .configure(configure_routes),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn health_is_public() {
        let tmp = TempDir::new().unwrap();
        let app = app!(state(&tmp, Arc::new(MemoryDatabase::new())));
        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert!(resp.status().is_success());
    }

    #[actix_web::test]
    async fn sync_requires_bearer_secret() {
        let tmp = setup_fixtures();
        let app = app!(state(&tmp, Arc::new(MemoryDatabase::new())));

        for header in [None, Some("Bearer wrong"), Some("s3cret")] {
            let mut req = test::TestRequest::post().uri("/api/admin/sync-pages");
            if let Some(value) = header {
                req = req.insert_header(("Authorization", value));
            }
            let resp = test::call_service(&app, req.to_request()).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["success"], false);
        }
    }

    #[actix_web::test]
    async fn sync_reports_counts() {
        let tmp = setup_fixtures();
        let db = Arc::new(MemoryDatabase::new());
        let app = app!(state(&tmp, db.clone()));

        let req = test::TestRequest::post()
            .uri("/api/admin/sync-pages")
            .insert_header(("Authorization", "Bearer s3cret"))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        // 8 routes; the bare root, the dynamic blog route and admin yield no pages.
        assert_eq!(body["success"], true);
        assert_eq!(body["totalScanned"], 8);
        assert_eq!(body["newPages"], 10);
        assert_eq!(db.pages().len(), 10);

        let req = test::TestRequest::post()
            .uri("/api/admin/sync-pages")
            .insert_header(("Authorization", "Bearer s3cret"))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["newPages"], 0);
    }

    #[actix_web::test]
    async fn sync_missing_routes_root_is_error() {
        let tmp = TempDir::new().unwrap();
        let app = app!(state(&tmp, Arc::new(MemoryDatabase::new())));
        let req = test::TestRequest::post()
            .uri("/api/admin/sync-pages")
            .insert_header(("Authorization", "Bearer s3cret"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("does not exist"));
    }

    #[actix_web::test]
    async fn availability_reports_days() {
        let tmp = TempDir::new().unwrap();
        let app = app!(state(&tmp, Arc::new(MemoryDatabase::new())));

        // March 2099 starts on a Sunday; the first chunk is Mon 2 to Fri 6.
        let req = test::TestRequest::get()
            .uri("/api/availability?service=consult:amsterdam&month=2099-03")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["days"]["2099-03-02"], false);
        assert_eq!(body["days"]["2099-03-03"], true);
        assert!(body["days"].get("2099-03-01").is_none());
    }

    #[actix_web::test]
    async fn availability_rejects_bad_query() {
        let tmp = TempDir::new().unwrap();
        let app = app!(state(&tmp, Arc::new(MemoryDatabase::new())));

        for uri in [
            "/api/availability?service=consult&month=2099-03",
            "/api/availability?service=consult:amsterdam&month=March",
            "/api/availability?service=consult:utrecht&month=2099-03",
        ] {
            let resp =
                test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{uri}");
        }
    }

    #[actix_web::test]
    async fn checkout_validation_error_is_bad_request() {
        let tmp = TempDir::new().unwrap();
        let app = app!(state(&tmp, Arc::new(MemoryDatabase::new())));
        let req = test::TestRequest::post()
            .uri("/api/checkout")
            .set_json(json!({
                "service": "consult:amsterdam",
                "date": "2099-03-03",
                "time": "ten",
                "name": "Jan",
                "email": "jan@example.com"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn checkout_upstream_failure_is_bad_gateway() {
        let tmp = TempDir::new().unwrap();
        let app = app!(state(&tmp, Arc::new(MemoryDatabase::new())));
        let req = test::TestRequest::post()
            .uri("/api/checkout")
            .set_json(json!({
                "service": "consult:amsterdam",
                "date": "2099-03-03",
                "time": "10:00",
                "name": "Jan",
                "email": "jan@example.com"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    #[actix_web::test]
    async fn confirm_unknown_session_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let app = app!(state(&tmp, Arc::new(MemoryDatabase::new())));
        let req = test::TestRequest::post()
            .uri("/api/booking/confirm")
            .set_json(json!({"sessionId": "cs_missing"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
