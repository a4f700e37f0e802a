use crate::{AppState, handlers};
use axum::{Router, routing::{post, put}};

/// Admin Router Module
///
/// Catalog mutations: every POST, PUT, PATCH and DELETE on books and authors.
///
/// Access Control:
/// The router layer above wraps this module in `admin_middleware`, which authenticates
/// the caller (401 on failure) and requires the ADMIN role (403 otherwise). The handlers
/// then go through the guarded `Library`, which applies the same rule again.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/books", post(handlers::create_book))
        .route(
            "/books/{id}",
            put(handlers::replace_book)
                .patch(handlers::patch_book)
                .delete(handlers::delete_book),
        )
        .route("/authors", post(handlers::create_author))
        .route(
            "/authors/{id}",
            put(handlers::replace_author)
                .patch(handlers::patch_author)
                .delete(handlers::delete_author),
        )
}
