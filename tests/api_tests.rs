use bookstore::{AppConfig, build_state, create_router};
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use tokio::net::TcpListener;

#[derive(Debug)]
pub struct TestApp {
    pub address: String,
    pub client: Client,
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }
}

async fn spawn_app() -> TestApp {
    let state = build_state(AppConfig::default())
        .await
        .expect("Failed to build in-memory state");
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp {
        address,
        client: Client::new(),
    }
}

fn new_book_body() -> Value {
    json!({
        "title": "Cloud Native Java",
        "description": "Designing resilient systems",
        "published_date": "2017-08-11",
        "price": { "currency": "USD", "amount": 39.95 },
        "authors": [1]
    })
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;
    let response = app.client.get(app.url("/health")).send().await.expect("req fail");
    assert!(response.status().is_success());
}

#[tokio::test]
async fn test_anonymous_read_is_unauthorized() {
    let app = spawn_app().await;
    let response = app.client.get(app.url("/books")).send().await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key("www-authenticate"));
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "unauthenticated");
}

#[tokio::test]
async fn test_wrong_password_is_unauthorized() {
    let app = spawn_app().await;
    let response = app
        .client
        .get(app.url("/books"))
        .basic_auth("user", Some("nope"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_user_reads_catalog() {
    let app = spawn_app().await;
    let response = app
        .client
        .get(app.url("/books"))
        .basic_auth("user", Some("user"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let books: Value = response.json().await.unwrap();
    let books = books.as_array().unwrap();
    assert_eq!(books.len(), 2);
    assert_eq!(books[0]["title"], "Spring Microservices");
    assert_eq!(books[0]["price"]["amount"], json!(45.83));
    assert_eq!(books[0]["authors"][0]["last_name"], "Gutierrez");
}

#[tokio::test]
async fn test_finder_routes() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(app.url("/books/search/findByTitleContains?keyword=Boot"))
        .basic_auth("user", Some("user"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let books: Value = response.json().await.unwrap();
    assert_eq!(books.as_array().unwrap().len(), 1);
    assert_eq!(books[0]["title"], "Pro Spring Boot");

    let response = app
        .client
        .get(app.url(
            "/books/search/findByTitleContainsAndPriceCurrencyAndPriceAmountBetween\
             ?keyword=Spring&currency=USD&low=45&high=50",
        ))
        .basic_auth("user", Some("user"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let books: Value = response.json().await.unwrap();
    assert_eq!(books[0]["title"], "Spring Microservices");

    let response = app
        .client
        .get(app.url("/accounts/search/findByUserName?userName=admin"))
        .basic_auth("user", Some("user"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let account: Value = response.json().await.unwrap();
    assert_eq!(account["roles"], json!(["USER", "ADMIN"]));
    assert!(account.get("password_hash").is_none());

    let response = app
        .client
        .get(app.url("/accounts/search/findByUserName?userName=ghost"))
        .basic_auth("user", Some("user"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_bad_query_parameter_is_bad_request() {
    let app = spawn_app().await;
    let response = app
        .client
        .get(app.url("/books/search/findByPublishedDateAfter?publishedDate=yesterday"))
        .basic_auth("user", Some("user"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "validation_error");
}

#[tokio::test]
async fn test_anonymous_read_with_bad_query_is_unauthorized() {
    let app = spawn_app().await;
    for path in [
        "/books/search/findByTitleContains",
        "/books/search/findByPublishedDateAfter?publishedDate=yesterday",
        "/books/search?min_price=1.234",
        "/accounts/search/findByUserName",
    ] {
        let response = app.client.get(app.url(path)).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "GET {path}");
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["code"], "unauthenticated");
    }
}

#[tokio::test]
async fn test_non_numeric_id() {
    let app = spawn_app().await;

    let response = app.client.get(app.url("/books/abc")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .client
        .get(app.url("/books/abc"))
        .basic_auth("user", Some("user"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "validation_error");

    let response = app
        .client
        .delete(app.url("/authors/abc"))
        .basic_auth("admin", Some("admin"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "validation_error");
}

#[tokio::test]
async fn test_user_cannot_create_book() {
    let app = spawn_app().await;
    let response = app
        .client
        .post(app.url("/books"))
        .basic_auth("user", Some("user"))
        .json(&new_book_body())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_anonymous_create_book_is_unauthorized() {
    let app = spawn_app().await;
    let response = app
        .client
        .post(app.url("/books"))
        .json(&new_book_body())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_book_lifecycle() {
    let app = spawn_app().await;

    let response = app
        .client
        .post(app.url("/books"))
        .basic_auth("admin", Some("admin"))
        .json(&new_book_body())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: Value = response.json().await.unwrap();
    let id = created["id"].as_i64().unwrap();
    assert_eq!(created["price"]["amount"], json!(39.95));

    let response = app
        .client
        .patch(app.url(&format!("/books/{id}")))
        .basic_auth("admin", Some("admin"))
        .json(&json!({ "title": "Cloud Native Java, 2nd Edition" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let patched: Value = response.json().await.unwrap();
    assert_eq!(patched["title"], "Cloud Native Java, 2nd Edition");
    assert_eq!(patched["description"], "Designing resilient systems");

    let response = app
        .client
        .delete(app.url(&format!("/books/{id}")))
        .basic_auth("admin", Some("admin"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .client
        .get(app.url(&format!("/books/{id}")))
        .basic_auth("admin", Some("admin"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_book_body_is_bad_request() {
    let app = spawn_app().await;

    let mut body = new_book_body();
    body["price"]["amount"] = json!(0);
    let response = app
        .client
        .post(app.url("/books"))
        .basic_auth("admin", Some("admin"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut body = new_book_body();
    body["price"]["amount"] = json!(1.999);
    let response = app
        .client
        .post(app.url("/books"))
        .basic_auth("admin", Some("admin"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_referenced_author_conflicts() {
    let app = spawn_app().await;
    let response = app
        .client
        .delete(app.url("/authors/1"))
        .basic_auth("admin", Some("admin"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_account_routes() {
    let app = spawn_app().await;

    let response = app
        .client
        .post(app.url("/accounts"))
        .json(&json!({ "user_name": "reader", "password": "s3cret" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .client
        .post(app.url("/accounts"))
        .basic_auth("user", Some("user"))
        .json(&json!({ "user_name": "reader", "password": "s3cret" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let account: Value = response.json().await.unwrap();
    let id = account["id"].as_i64().unwrap();
    assert_eq!(account["roles"], json!(["USER"]));

    let response = app
        .client
        .get(app.url("/books"))
        .basic_auth("reader", Some("s3cret"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .client
        .delete(app.url(&format!("/accounts/{id}")))
        .basic_auth("user", Some("user"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .client
        .delete(app.url(&format!("/accounts/{id}")))
        .basic_auth("admin", Some("admin"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = spawn_app().await;
    let response = app
        .client
        .get(app.url("/api-docs/openapi.json"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let doc: Value = response.json().await.unwrap();
    assert!(doc["paths"].get("/books").is_some());
    assert!(doc["paths"].get("/accounts/search/findByUserName").is_some());
}
