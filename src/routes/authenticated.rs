use crate::{AppState, handlers};
use axum::{Router, routing::{post, put}};

/// Authenticated Router Module
///
/// Account mutations. The router layer above wraps these routes in `auth_middleware`,
/// so an anonymous request is answered with 401 before the handler runs. Either USER
/// or ADMIN passes this layer; the guarded service additionally restricts DELETE to ADMIN.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // POST /accounts
        // Provisions a new account; the plaintext password is hashed before storage.
        .route("/accounts", post(handlers::create_account))
        // PUT/PATCH/DELETE /accounts/{id}
        .route(
            "/accounts/{id}",
            put(handlers::replace_account)
                .patch(handlers::patch_account)
                .delete(handlers::delete_account),
        )
}
