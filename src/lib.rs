pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::api::middleware::rate_limit::{ClientRateLimiter, rate_limit_middleware};
use crate::config::AppConfig;
use crate::models::Category;
use crate::services::catalog::CatalogService;
use crate::services::intake::IntakeService;
use crate::services::record_store::{DbRecordStore, RecordStore};
use crate::services::session_store::SessionStore;
use crate::services::storage::StorageService;
use crate::utils::auth::AdminCredentials;
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::upload::upload_files,
        api::handlers::catalog::view_catalog,
        api::handlers::files::download_file,
        api::handlers::admin::login,
        api::handlers::admin::logout,
        api::handlers::admin::dashboard,
        api::handlers::admin::delete_upload,
        api::handlers::health::health_check,
        api::handlers::health::api_test,
    ),
    components(
        schemas(
            api::handlers::types::MessageResponse,
            api::handlers::types::LoginRequest,
            api::handlers::types::UploadEntry,
            api::handlers::health::HealthResponse,
            Category,
        )
    ),
    tags(
        (name = "uploads", description = "Lab artifact intake and catalog"),
        (name = "admin", description = "Administrator session and moderation"),
        (name = "system", description = "Health probes")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub storage: Arc<dyn StorageService>,
    pub sessions: Arc<dyn SessionStore>,
    pub intake: Arc<IntakeService>,
    pub catalog: Arc<CatalogService>,
    pub admin: Arc<AdminCredentials>,
    pub config: AppConfig,
}

impl AppState {
    /// Wires the services on top of the given infrastructure
    pub fn new(
        db: DatabaseConnection,
        storage: Arc<dyn StorageService>,
        sessions: Arc<dyn SessionStore>,
        config: AppConfig,
    ) -> anyhow::Result<Self> {
        let records: Arc<dyn RecordStore> = Arc::new(DbRecordStore::new(db.clone()));
        let admin = Arc::new(AdminCredentials::from_config(&config)?);

        Ok(Self {
            intake: Arc::new(IntakeService::new(
                records.clone(),
                storage.clone(),
                config.clone(),
            )),
            catalog: Arc::new(CatalogService::new(records, storage.clone())),
            db,
            storage,
            sessions,
            admin,
            config,
        })
    }
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    // Cookies require explicit origins, methods and headers
    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
}

pub fn create_app(state: AppState) -> Router {
    // Three attachments plus form fields and multipart framing
    let upload_limit = state.config.max_file_size * Category::ALL.len() + 1024 * 1024;

    let admin_only = || from_fn_with_state(state.clone(), api::middleware::auth::admin_session_middleware);

    let mut upload = post(api::handlers::upload::upload_files)
        .layer(axum::extract::DefaultBodyLimit::max(upload_limit));
    let mut login = post(api::handlers::admin::login);

    // Uploads and logins draw from one budget per client
    if let Some(limiter) = ClientRateLimiter::from_config(&state.config.rate_limit) {
        let limiter = Arc::new(limiter);
        upload = upload.layer(from_fn_with_state(limiter.clone(), rate_limit_middleware));
        login = login.layer(from_fn_with_state(limiter, rate_limit_middleware));
    }

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route("/api/test", get(api::handlers::health::api_test))
        .route("/upload", upload)
        .route("/view", get(api::handlers::catalog::view_catalog))
        .route("/files/*key", get(api::handlers::files::download_file))
        .route("/admin", login)
        .route(
            "/admin/logout",
            post(api::handlers::admin::logout).layer(admin_only()),
        )
        .route(
            "/admin/dashboard",
            get(api::handlers::admin::dashboard).layer(admin_only()),
        )
        .route(
            "/admin/delete/:id",
            delete(api::handlers::admin::delete_upload).layer(admin_only()),
        )
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(cors_layer(&state.config))
        .with_state(state)
}
