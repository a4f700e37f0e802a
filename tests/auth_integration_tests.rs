use axum::{
    extract::FromRequestParts,
    http::{HeaderValue, Method, Request, StatusCode, Uri, header, request::Parts},
};
use bookstore::{
    AppConfig, AppError, AppState,
    auth::{AuthUser, Caller, basic_header, parse_basic},
    build_state,
    models::Role,
};

// --- Helper Functions ---

async fn create_app_state() -> AppState {
    build_state(AppConfig::default())
        .await
        .expect("in-memory state should build")
}

/// Helper to get the mutable Parts struct from a generated Request
fn get_request_parts(method: Method, uri: Uri, authorization: Option<&str>) -> Parts {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    let (parts, _) = builder.body(axum::body::Body::empty()).unwrap().into_parts();
    parts
}

// --- Header parsing ---

#[test]
fn test_parse_basic_round_trip() {
    let value = HeaderValue::from_str(&basic_header("admin", "admin")).unwrap();
    assert_eq!(
        parse_basic(&value),
        Some(("admin".to_string(), "admin".to_string()))
    );
}

#[test]
fn test_parse_basic_keeps_colons_in_password() {
    let value = HeaderValue::from_str(&basic_header("user", "a:b:c")).unwrap();
    assert_eq!(
        parse_basic(&value),
        Some(("user".to_string(), "a:b:c".to_string()))
    );
}

#[test]
fn test_parse_basic_rejects_other_schemes_and_garbage() {
    for raw in ["Bearer abc.def", "Basic !!!not-base64", "Basic", "Basic dXNlcg=="] {
        let value = HeaderValue::from_static(raw);
        assert_eq!(parse_basic(&value), None, "'{raw}' should not parse");
    }
}

#[test]
fn test_parse_basic_scheme_is_case_insensitive() {
    let encoded = basic_header("user", "user").replacen("Basic", "basic", 1);
    let value = HeaderValue::from_str(&encoded).unwrap();
    assert!(parse_basic(&value).is_some());
}

// --- Extractors ---

#[tokio::test]
async fn test_caller_resolves_valid_credentials() {
    let app_state = create_app_state().await;
    let header = basic_header("admin", "admin");
    let mut parts = get_request_parts(Method::GET, "/books".parse().unwrap(), Some(&header));

    let caller = Caller::from_request_parts(&mut parts, &app_state).await.unwrap();
    let identity = caller.identity().expect("identity resolved");
    assert_eq!(identity.user_name, "admin");
    assert!(identity.has_role(Role::Admin));

    // The resolved caller is cached for later extractors in the same request.
    assert!(parts.extensions.get::<Caller>().is_some());
}

#[tokio::test]
async fn test_caller_without_header_is_anonymous() {
    let app_state = create_app_state().await;
    let mut parts = get_request_parts(Method::GET, "/books".parse().unwrap(), None);

    let caller = Caller::from_request_parts(&mut parts, &app_state).await.unwrap();
    assert!(caller.identity().is_none());
}

#[tokio::test]
async fn test_caller_with_bad_password_is_rejected() {
    let app_state = create_app_state().await;
    let header = basic_header("user", "wrong");
    let mut parts = get_request_parts(Method::GET, "/books".parse().unwrap(), Some(&header));

    let result = Caller::from_request_parts(&mut parts, &app_state).await;
    let err = result.unwrap_err();
    assert!(matches!(err, AppError::Unauthenticated));
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_caller_with_malformed_header_is_rejected() {
    let app_state = create_app_state().await;
    let mut parts = get_request_parts(Method::GET, "/books".parse().unwrap(), Some("Basic ???"));

    let result = Caller::from_request_parts(&mut parts, &app_state).await;
    assert!(matches!(result, Err(AppError::Unauthenticated)));
}

#[tokio::test]
async fn test_auth_user_requires_identity() {
    let app_state = create_app_state().await;

    let mut anonymous = get_request_parts(Method::POST, "/accounts".parse().unwrap(), None);
    let result = AuthUser::from_request_parts(&mut anonymous, &app_state).await;
    assert!(matches!(result, Err(AppError::Unauthenticated)));

    let header = basic_header("user", "user");
    let mut authed = get_request_parts(Method::POST, "/accounts".parse().unwrap(), Some(&header));
    let AuthUser(identity) = AuthUser::from_request_parts(&mut authed, &app_state)
        .await
        .unwrap();
    assert_eq!(identity.user_name, "user");
    assert!(!identity.has_role(Role::Admin));
}
