use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Read Router Module
///
/// Every GET endpoint on books, authors and accounts.
///
/// Access Control:
/// The router layer above wraps this module in `auth_middleware`, so an anonymous
/// request is answered with 401 before any path or query extractor runs. The guarded
/// `Library` then checks the Read permission for the resolved caller.
pub fn read_routes() -> Router<AppState> {
    Router::new()
        // --- Books ---
        .route("/books", get(handlers::list_books))
        .route("/books/{id}", get(handlers::get_book))
        .route("/books/{id}/authors", get(handlers::get_book_authors))
        // GET /books/search?title_contains=...&currency=...&min_price=...
        // Structured filter over every book column.
        .route("/books/search", get(handlers::search_books))
        .route("/books/search/findByTitle", get(handlers::find_books_by_title))
        .route(
            "/books/search/findByTitleContains",
            get(handlers::find_books_by_title_contains),
        )
        .route(
            "/books/search/findByPublishedDateAfter",
            get(handlers::find_books_published_after),
        )
        .route(
            "/books/search/findByTitleContainsAndPublishedDateAfter",
            get(handlers::find_books_by_title_contains_published_after),
        )
        .route(
            "/books/search/findByTitleContainsAndPriceCurrencyAndPriceAmountBetween",
            get(handlers::find_books_by_price_range),
        )
        .route(
            "/books/search/findByAuthorsLastName",
            get(handlers::find_books_by_author_last_name),
        )
        // --- Authors ---
        .route("/authors", get(handlers::list_authors))
        .route("/authors/{id}", get(handlers::get_author))
        .route("/authors/{id}/books", get(handlers::get_author_books))
        .route(
            "/authors/search/findByLastName",
            get(handlers::find_authors_by_last_name),
        )
        .route(
            "/authors/search/findByBooksTitle",
            get(handlers::find_authors_by_books_title),
        )
        // --- Accounts ---
        .route("/accounts", get(handlers::list_accounts))
        .route("/accounts/{id}", get(handlers::get_account))
        .route(
            "/accounts/search/findByUserName",
            get(handlers::find_account_by_user_name),
        )
}
