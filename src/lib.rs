use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod password;
pub mod policy;
pub mod repository;
pub mod service;

// Routers grouped by the guard applied at the HTTP layer (public, read, authenticated, admin).
pub mod routes;
use auth::AuthUser;
use routes::{admin, authenticated, public, read};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::AppError;
pub use policy::Identity;
pub use repository::{RepositoryState, SqliteRepository};
pub use service::Library;

/// ApiDoc
///
/// OpenAPI document served at `/api-docs/openapi.json` and rendered by Swagger UI.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::list_books, handlers::get_book, handlers::create_book, handlers::replace_book,
        handlers::patch_book, handlers::delete_book, handlers::get_book_authors,
        handlers::search_books, handlers::find_books_by_title, handlers::find_books_by_title_contains,
        handlers::find_books_published_after, handlers::find_books_by_title_contains_published_after,
        handlers::find_books_by_price_range, handlers::find_books_by_author_last_name,
        handlers::list_authors, handlers::get_author, handlers::create_author,
        handlers::replace_author, handlers::patch_author, handlers::delete_author,
        handlers::get_author_books, handlers::find_authors_by_last_name,
        handlers::find_authors_by_books_title,
        handlers::list_accounts, handlers::get_account, handlers::create_account,
        handlers::replace_account, handlers::patch_account, handlers::delete_account,
        handlers::find_account_by_user_name
    ),
    components(
        schemas(
            models::Book, models::Author, models::Account, models::Money, models::Currency,
            models::Role, models::BookRequest, models::BookPatch, models::AuthorRequest,
            models::AuthorPatch, models::AccountRequest, models::AccountPatch, error::ErrorBody,
        )
    ),
    tags(
        (name = "books", description = "Book catalog"),
        (name = "authors", description = "Book authors"),
        (name = "accounts", description = "Login accounts and roles")
    )
)]
struct ApiDoc;

/// AppState
///
/// The shared, cloneable application state: the guarded service and the loaded configuration.
#[derive(Clone)]
pub struct AppState {
    /// Guarded access to the store. Handlers never see the raw repository.
    pub library: Library,
    pub config: AppConfig,
}

impl FromRef<AppState> for Library {
    fn from_ref(app_state: &AppState) -> Library {
        app_state.library.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// build_state
///
/// Opens the database, runs migrations, wires the guarded service and, when
/// `seed_data` is enabled, inserts the demo records.
pub async fn build_state(config: AppConfig) -> error::Result<AppState> {
    let pool = db::connect(&config.db_url).await?;
    let repo = Arc::new(SqliteRepository::new(pool)) as RepositoryState;
    let library = Library::new(repo, config.bcrypt_cost);

    if config.seed_data {
        bootstrap::seed(&library).await?;
    }

    Ok(AppState { library, config })
}

/// auth_middleware
///
/// Rejects anonymous requests with 401 by extracting `AuthUser`, before the handler's
/// own path, query or body extractors can answer 400. The resolved caller is cached in
/// the request extensions for the handler.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// admin_middleware
///
/// 401 without credentials, 403 for an authenticated caller lacking ADMIN.
async fn admin_middleware(
    AuthUser(identity): AuthUser,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !identity.has_role(models::Role::Admin) {
        tracing::warn!(user = %identity.user_name, uri = %request.uri(), "admin route refused");
        return Err(AppError::Forbidden);
    }
    Ok(next.run(request).await)
}

/// create_router
///
/// Assembles the routers, applies the scoped guards and the observability layers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            read::read_routes()
                .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware)),
        )
        .merge(
            authenticated::authenticated_routes()
                .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware)),
        )
        .merge(
            admin::admin_routes()
                .route_layer(middleware::from_fn_with_state(state.clone(), admin_middleware)),
        )
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for every request, correlated by the `x-request-id` header.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
