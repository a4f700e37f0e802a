use crate::{
    AppState,
    auth::Caller,
    error::{AppError, ErrorBody},
    models::{
        Account, AccountPatch, AccountRequest, Amount, Author, AuthorPatch, AuthorRequest, Book,
        BookPatch, BookRequest, Currency,
    },
    repository::BookQuery,
};
use axum::{
    Json,
    extract::{
        FromRequest, FromRequestParts, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
};
use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::IntoParams;

// --- Extractors ---

/// ApiJson
///
/// `axum::Json` whose rejection is an `AppError::Validation`, so malformed bodies
/// (including a bad `amount`) get the same 400 JSON error as failed entity validation.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// ApiQuery
///
/// `axum::Query` with the same error mapping as `ApiJson`.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

/// ApiPath
///
/// `axum::extract::Path` with the same error mapping, so a non-numeric id is a JSON 400.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

// --- Finder parameter structs ---
// Parameter names follow the `/search/findBy...` conventions clients already use.

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TitleParams {
    pub title: String,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct KeywordParams {
    pub keyword: String,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct PublishedDateParams {
    /// ISO date (YYYY-MM-DD).
    pub published_date: NaiveDate,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct KeywordDateParams {
    pub keyword: String,
    pub published_date: NaiveDate,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PriceRangeParams {
    pub keyword: String,
    pub currency: Currency,
    /// Inclusive lower bound.
    #[param(value_type = f64)]
    pub low: Amount,
    /// Inclusive upper bound.
    #[param(value_type = f64)]
    pub high: Amount,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct LastNameParams {
    pub last_name: String,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct UserNameParams {
    pub user_name: String,
}

// --- Book Handlers ---

/// list_books
///
/// [Read Route] Lists every book with its authors. Requires an authenticated USER or ADMIN.
#[utoipa::path(
    get,
    path = "/books",
    tag = "books",
    responses(
        (status = 200, description = "All books", body = [Book]),
        (status = 401, description = "Not authenticated", body = ErrorBody)
    )
)]
pub async fn list_books(caller: Caller, State(state): State<AppState>) -> Result<Json<Vec<Book>>, AppError> {
    Ok(Json(state.library.list_books(caller.identity()).await?))
}

#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "books",
    params(("id" = i64, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Found", body = Book),
        (status = 404, description = "Not Found", body = ErrorBody)
    )
)]
pub async fn get_book(
    caller: Caller,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Book>, AppError> {
    Ok(Json(state.library.get_book(caller.identity(), id).await?))
}

/// create_book
///
/// [Admin Route] Creates a book linked to existing authors.
#[utoipa::path(
    post,
    path = "/books",
    tag = "books",
    request_body = BookRequest,
    responses(
        (status = 201, description = "Created", body = Book),
        (status = 400, description = "Invalid book", body = ErrorBody),
        (status = 403, description = "ADMIN role required", body = ErrorBody)
    )
)]
pub async fn create_book(
    caller: Caller,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<BookRequest>,
) -> Result<(StatusCode, Json<Book>), AppError> {
    let book = state.library.create_book(caller.identity(), payload).await?;
    Ok((StatusCode::CREATED, Json(book)))
}

/// replace_book
///
/// [Admin Route] Full replacement, including the author list.
#[utoipa::path(
    put,
    path = "/books/{id}",
    tag = "books",
    params(("id" = i64, Path)),
    request_body = BookRequest,
    responses((status = 200, description = "Updated", body = Book))
)]
pub async fn replace_book(
    caller: Caller,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(payload): ApiJson<BookRequest>,
) -> Result<Json<Book>, AppError> {
    Ok(Json(state.library.replace_book(caller.identity(), id, payload).await?))
}

/// patch_book
///
/// [Admin Route] Partial update; absent fields keep their stored values.
#[utoipa::path(
    patch,
    path = "/books/{id}",
    tag = "books",
    params(("id" = i64, Path)),
    request_body = BookPatch,
    responses((status = 200, description = "Updated", body = Book))
)]
pub async fn patch_book(
    caller: Caller,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(payload): ApiJson<BookPatch>,
) -> Result<Json<Book>, AppError> {
    Ok(Json(state.library.patch_book(caller.identity(), id, payload).await?))
}

#[utoipa::path(
    delete,
    path = "/books/{id}",
    tag = "books",
    params(("id" = i64, Path)),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found", body = ErrorBody)
    )
)]
pub async fn delete_book(
    caller: Caller,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, AppError> {
    state.library.delete_book(caller.identity(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/books/{id}/authors",
    tag = "books",
    params(("id" = i64, Path)),
    responses((status = 200, description = "Authors of the book", body = [Author]))
)]
pub async fn get_book_authors(
    caller: Caller,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Vec<Author>>, AppError> {
    Ok(Json(state.library.book_authors(caller.identity(), id).await?))
}

/// search_books
///
/// [Read Route] Structured filter combining every `BookQuery` field with AND.
#[utoipa::path(
    get,
    path = "/books/search",
    tag = "books",
    params(BookQuery),
    responses((status = 200, description = "Matching books", body = [Book]))
)]
pub async fn search_books(
    caller: Caller,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<BookQuery>,
) -> Result<Json<Vec<Book>>, AppError> {
    Ok(Json(state.library.search_books(caller.identity(), &query).await?))
}

#[utoipa::path(
    get,
    path = "/books/search/findByTitle",
    tag = "books",
    params(TitleParams),
    responses((status = 200, description = "Books with this exact title", body = [Book]))
)]
pub async fn find_books_by_title(
    caller: Caller,
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<TitleParams>,
) -> Result<Json<Vec<Book>>, AppError> {
    Ok(Json(
        state
            .library
            .find_books_by_title(caller.identity(), &params.title)
            .await?,
    ))
}

#[utoipa::path(
    get,
    path = "/books/search/findByTitleContains",
    tag = "books",
    params(KeywordParams),
    responses((status = 200, description = "Books whose title contains the keyword", body = [Book]))
)]
pub async fn find_books_by_title_contains(
    caller: Caller,
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<KeywordParams>,
) -> Result<Json<Vec<Book>>, AppError> {
    Ok(Json(
        state
            .library
            .find_books_by_title_contains(caller.identity(), &params.keyword)
            .await?,
    ))
}

#[utoipa::path(
    get,
    path = "/books/search/findByPublishedDateAfter",
    tag = "books",
    params(PublishedDateParams),
    responses((status = 200, description = "Books published after the date", body = [Book]))
)]
pub async fn find_books_published_after(
    caller: Caller,
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<PublishedDateParams>,
) -> Result<Json<Vec<Book>>, AppError> {
    Ok(Json(
        state
            .library
            .find_books_published_after(caller.identity(), params.published_date)
            .await?,
    ))
}

#[utoipa::path(
    get,
    path = "/books/search/findByTitleContainsAndPublishedDateAfter",
    tag = "books",
    params(KeywordDateParams),
    responses((status = 200, description = "Matching books", body = [Book]))
)]
pub async fn find_books_by_title_contains_published_after(
    caller: Caller,
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<KeywordDateParams>,
) -> Result<Json<Vec<Book>>, AppError> {
    Ok(Json(
        state
            .library
            .find_books_by_title_contains_published_after(
                caller.identity(),
                &params.keyword,
                params.published_date,
            )
            .await?,
    ))
}

#[utoipa::path(
    get,
    path = "/books/search/findByTitleContainsAndPriceCurrencyAndPriceAmountBetween",
    tag = "books",
    params(PriceRangeParams),
    responses((status = 200, description = "Matching books", body = [Book]))
)]
pub async fn find_books_by_price_range(
    caller: Caller,
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<PriceRangeParams>,
) -> Result<Json<Vec<Book>>, AppError> {
    Ok(Json(
        state
            .library
            .find_books_by_title_contains_and_price_between(
                caller.identity(),
                &params.keyword,
                params.currency,
                params.low,
                params.high,
            )
            .await?,
    ))
}

#[utoipa::path(
    get,
    path = "/books/search/findByAuthorsLastName",
    tag = "books",
    params(LastNameParams),
    responses((status = 200, description = "Books by authors with this last name", body = [Book]))
)]
pub async fn find_books_by_author_last_name(
    caller: Caller,
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<LastNameParams>,
) -> Result<Json<Vec<Book>>, AppError> {
    Ok(Json(
        state
            .library
            .find_books_by_author_last_name(caller.identity(), &params.last_name)
            .await?,
    ))
}

// --- Author Handlers ---

#[utoipa::path(
    get,
    path = "/authors",
    tag = "authors",
    responses((status = 200, description = "All authors", body = [Author]))
)]
pub async fn list_authors(caller: Caller, State(state): State<AppState>) -> Result<Json<Vec<Author>>, AppError> {
    Ok(Json(state.library.list_authors(caller.identity()).await?))
}

#[utoipa::path(
    get,
    path = "/authors/{id}",
    tag = "authors",
    params(("id" = i64, Path, description = "Author ID")),
    responses((status = 200, description = "Found", body = Author))
)]
pub async fn get_author(
    caller: Caller,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Author>, AppError> {
    Ok(Json(state.library.get_author(caller.identity(), id).await?))
}

#[utoipa::path(
    post,
    path = "/authors",
    tag = "authors",
    request_body = AuthorRequest,
    responses((status = 201, description = "Created", body = Author))
)]
pub async fn create_author(
    caller: Caller,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<AuthorRequest>,
) -> Result<(StatusCode, Json<Author>), AppError> {
    let author = state.library.create_author(caller.identity(), payload).await?;
    Ok((StatusCode::CREATED, Json(author)))
}

#[utoipa::path(
    put,
    path = "/authors/{id}",
    tag = "authors",
    params(("id" = i64, Path)),
    request_body = AuthorRequest,
    responses((status = 200, description = "Updated", body = Author))
)]
pub async fn replace_author(
    caller: Caller,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(payload): ApiJson<AuthorRequest>,
) -> Result<Json<Author>, AppError> {
    Ok(Json(state.library.replace_author(caller.identity(), id, payload).await?))
}

#[utoipa::path(
    patch,
    path = "/authors/{id}",
    tag = "authors",
    params(("id" = i64, Path)),
    request_body = AuthorPatch,
    responses((status = 200, description = "Updated", body = Author))
)]
pub async fn patch_author(
    caller: Caller,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(payload): ApiJson<AuthorPatch>,
) -> Result<Json<Author>, AppError> {
    Ok(Json(state.library.patch_author(caller.identity(), id, payload).await?))
}

/// delete_author
///
/// [Admin Route] Refused with 409 while any book still lists the author.
#[utoipa::path(
    delete,
    path = "/authors/{id}",
    tag = "authors",
    params(("id" = i64, Path)),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found", body = ErrorBody),
        (status = 409, description = "Author still referenced by a book", body = ErrorBody)
    )
)]
pub async fn delete_author(
    caller: Caller,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, AppError> {
    state.library.delete_author(caller.identity(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/authors/{id}/books",
    tag = "authors",
    params(("id" = i64, Path)),
    responses((status = 200, description = "Books by the author", body = [Book]))
)]
pub async fn get_author_books(
    caller: Caller,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Vec<Book>>, AppError> {
    Ok(Json(state.library.author_books(caller.identity(), id).await?))
}

#[utoipa::path(
    get,
    path = "/authors/search/findByLastName",
    tag = "authors",
    params(LastNameParams),
    responses((status = 200, description = "Authors with this last name", body = [Author]))
)]
pub async fn find_authors_by_last_name(
    caller: Caller,
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<LastNameParams>,
) -> Result<Json<Vec<Author>>, AppError> {
    Ok(Json(
        state
            .library
            .find_authors_by_last_name(caller.identity(), &params.last_name)
            .await?,
    ))
}

#[utoipa::path(
    get,
    path = "/authors/search/findByBooksTitle",
    tag = "authors",
    params(TitleParams),
    responses((status = 200, description = "Authors of books with this title", body = [Author]))
)]
pub async fn find_authors_by_books_title(
    caller: Caller,
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<TitleParams>,
) -> Result<Json<Vec<Author>>, AppError> {
    Ok(Json(
        state
            .library
            .find_authors_by_book_title(caller.identity(), &params.title)
            .await?,
    ))
}

// --- Account Handlers ---

/// list_accounts
///
/// [Read Route] Password hashes are never part of the response.
#[utoipa::path(
    get,
    path = "/accounts",
    tag = "accounts",
    responses((status = 200, description = "All accounts", body = [Account]))
)]
pub async fn list_accounts(caller: Caller, State(state): State<AppState>) -> Result<Json<Vec<Account>>, AppError> {
    Ok(Json(state.library.list_accounts(caller.identity()).await?))
}

#[utoipa::path(
    get,
    path = "/accounts/{id}",
    tag = "accounts",
    params(("id" = i64, Path, description = "Account ID")),
    responses((status = 200, description = "Found", body = Account))
)]
pub async fn get_account(
    caller: Caller,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Account>, AppError> {
    Ok(Json(state.library.get_account(caller.identity(), id).await?))
}

/// create_account
///
/// [Authenticated Route] Any USER or ADMIN may provision accounts. The password is
/// hashed before storage.
#[utoipa::path(
    post,
    path = "/accounts",
    tag = "accounts",
    request_body = AccountRequest,
    responses(
        (status = 201, description = "Created", body = Account),
        (status = 409, description = "User name taken", body = ErrorBody)
    )
)]
pub async fn create_account(
    caller: Caller,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<AccountRequest>,
) -> Result<(StatusCode, Json<Account>), AppError> {
    let account = state.library.create_account(caller.identity(), payload).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

#[utoipa::path(
    put,
    path = "/accounts/{id}",
    tag = "accounts",
    params(("id" = i64, Path)),
    request_body = AccountRequest,
    responses((status = 200, description = "Updated", body = Account))
)]
pub async fn replace_account(
    caller: Caller,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(payload): ApiJson<AccountRequest>,
) -> Result<Json<Account>, AppError> {
    Ok(Json(state.library.replace_account(caller.identity(), id, payload).await?))
}

#[utoipa::path(
    patch,
    path = "/accounts/{id}",
    tag = "accounts",
    params(("id" = i64, Path)),
    request_body = AccountPatch,
    responses((status = 200, description = "Updated", body = Account))
)]
pub async fn patch_account(
    caller: Caller,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(payload): ApiJson<AccountPatch>,
) -> Result<Json<Account>, AppError> {
    Ok(Json(state.library.patch_account(caller.identity(), id, payload).await?))
}

/// delete_account
///
/// [Authenticated Route] Reaches the handler for any authenticated caller; the guarded
/// service then requires ADMIN.
#[utoipa::path(
    delete,
    path = "/accounts/{id}",
    tag = "accounts",
    params(("id" = i64, Path)),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "ADMIN role required", body = ErrorBody)
    )
)]
pub async fn delete_account(
    caller: Caller,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, AppError> {
    state.library.delete_account(caller.identity(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/accounts/search/findByUserName",
    tag = "accounts",
    params(UserNameParams),
    responses(
        (status = 200, description = "Found", body = Account),
        (status = 404, description = "No such user", body = ErrorBody)
    )
)]
pub async fn find_account_by_user_name(
    caller: Caller,
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<UserNameParams>,
) -> Result<Json<Account>, AppError> {
    state
        .library
        .find_account_by_user_name(caller.identity(), &params.user_name)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("account", &params.user_name))
}
