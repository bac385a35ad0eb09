use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::{auth::CurrentUser, state::AppState};

pub mod auth;
pub mod dashboard;
pub mod departments;
pub mod documents;
pub mod files;
pub mod health;
pub mod history;
pub mod notifications;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = if let Some(origins) = state.config.cors_allowed_origin.as_ref() {
        let headers: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|value| {
                let trimmed = value.trim();
                (!trimmed.is_empty()).then(|| {
                    trimmed
                        .parse::<HeaderValue>()
                        .expect("invalid CORS allowed origin")
                })
            })
            .collect();

        let allow_origin = AllowOrigin::list(headers);

        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    };

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/me", get(auth::me));

    let documents_routes = Router::new()
        .route(
            "/",
            get(documents::list_documents).post(documents::create_document),
        )
        .route("/stats", get(documents::document_stats))
        .route(
            "/:id",
            get(documents::get_document)
                .patch(documents::update_document)
                .delete(documents::archive_document),
        )
        .route("/:id/forward", post(documents::forward_document))
        .route("/:id/status", post(documents::change_status))
        .route("/:id/history", get(documents::document_history))
        .route("/:id/routing", get(documents::document_routing))
        .route(
            "/:id/files",
            get(files::list_files).post(files::upload_file),
        )
        .route(
            "/:id/files/:file_id",
            get(files::download_file).delete(files::delete_file),
        );

    let notifications_routes = Router::new()
        .route("/", get(notifications::list_notifications))
        .route("/unread-count", get(notifications::unread_count))
        .route("/read-all", post(notifications::mark_all_read))
        .route("/:id/read", post(notifications::mark_read))
        .route("/:id", delete(notifications::delete_notification));

    let history_routes = Router::new()
        .route("/users/:user_id", get(history::user_history))
        .route(
            "/departments/:department_id",
            get(history::department_history),
        );

    let departments_routes = Router::new()
        .route("/", get(departments::list_departments))
        .route("/:id/users", get(departments::department_users));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/documents", documents_routes)
        .nest("/api/notifications", notifications_routes)
        .nest("/api/history", history_routes)
        .nest("/api/departments", departments_routes)
        .route("/api/dashboard", get(dashboard::dashboard))
        .layer(middleware::from_extractor_with_state::<CurrentUser, _>(
            protected_state,
        ));

    Router::new()
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
        // Leaves the multipart envelope room above the 50 MB per-file cap.
        .layer(DefaultBodyLimit::max(1024 * 1024 * 64))
}
