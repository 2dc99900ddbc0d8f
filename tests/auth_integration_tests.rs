use axum::{
    extract::FromRequestParts,
    http::{Method, Request, StatusCode, Uri, header, request::Parts},
    response::IntoResponse,
};
use chrono::Duration;
use jsonwebtoken::{EncodingKey, Header, encode};
use party_qna::{
    AppState,
    auth::{AuthUser, Claims, Scope, TokenKind, issue_token, verify_token},
    config::{AppConfig, Env},
    error::{AppError, AuthError},
    models::User,
    store::{MemoryStore, Store},
};
use std::{sync::Arc, time::SystemTime};
use uuid::Uuid;

// --- Helper Functions ---

const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";

/// Stores one user directly and returns it with its assigned id.
async fn seed_user(store: &MemoryStore, username: &str, is_active: bool) -> User {
    let mut tx = store.begin().await.unwrap();
    let user = tx
        .insert_user(&User {
            id: 0,
            username: username.to_string(),
            hashed_password: "unused".to_string(),
            is_active,
            is_staff: false,
        })
        .await
        .unwrap();
    tx.commit().await.unwrap();
    user
}

fn create_app_state(env: Env, store: MemoryStore) -> AppState {
    let config = AppConfig {
        env,
        jwt_secret: TEST_JWT_SECRET.to_string(),
        ..AppConfig::default()
    };
    AppState {
        store: Arc::new(store),
        config,
    }
}

/// Signs arbitrary claims, for tokens the service itself would never issue.
fn forge_token(username: &str, kind: TokenKind, exp_offset: i64) -> String {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;

    let claims = Claims {
        sub: username.to_string(),
        iat: now as usize,
        exp: (now + exp_offset).max(0) as usize,
        scopes: Scope::ALL.to_vec(),
        token_type: kind,
        jti: Uuid::new_v4(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

fn get_request_parts(method: Method, uri: Uri) -> Parts {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let (parts, _) = request.into_parts();
    parts
}

fn with_bearer(parts: &mut Parts, token: &str) {
    parts.headers.insert(
        header::AUTHORIZATION,
        header::HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    );
}

fn auth_error(result: Result<AuthUser, AppError>) -> AuthError {
    match result {
        Err(AppError::Auth(err)) => err,
        other => panic!("expected an auth rejection, got {:?}", other.map(|u| u.user)),
    }
}

// --- Token Tests ---

#[test]
fn test_issue_and_verify_access_token() {
    let user = User {
        id: 7,
        username: "alice".to_string(),
        ..User::default()
    };
    let token = issue_token(
        TEST_JWT_SECRET,
        &user,
        TokenKind::Access,
        Duration::minutes(15),
        &[Scope::Read, Scope::Me],
    )
    .unwrap();

    let claims = verify_token(TEST_JWT_SECRET, &token, TokenKind::Access).unwrap();
    assert_eq!(claims.sub, "alice");
    assert_eq!(claims.scopes, vec![Scope::Read, Scope::Me]);
    assert_eq!(claims.token_type, TokenKind::Access);
    assert_eq!(claims.exp - claims.iat, 15 * 60);
}

#[test]
fn test_verify_rejects_wrong_secret_and_kind() {
    let user = User {
        username: "alice".to_string(),
        ..User::default()
    };
    let token = issue_token(
        TEST_JWT_SECRET,
        &user,
        TokenKind::Refresh,
        Duration::days(7),
        &Scope::ALL,
    )
    .unwrap();

    assert!(verify_token("another-secret", &token, TokenKind::Refresh).is_err());
    // A refresh token is not an access token.
    assert!(verify_token(TEST_JWT_SECRET, &token, TokenKind::Access).is_err());
    assert!(verify_token(TEST_JWT_SECRET, &token, TokenKind::Refresh).is_ok());
}

#[test]
fn test_tokens_issued_together_are_distinct() {
    let user = User {
        username: "alice".to_string(),
        ..User::default()
    };
    let first = issue_token(TEST_JWT_SECRET, &user, TokenKind::Access, Duration::minutes(1), &Scope::ALL).unwrap();
    let second = issue_token(TEST_JWT_SECRET, &user, TokenKind::Access, Duration::minutes(1), &Scope::ALL).unwrap();
    assert_ne!(first, second);
}

// --- Extractor Tests ---

#[tokio::test]
async fn test_auth_success_with_valid_jwt() {
    let store = MemoryStore::new();
    let user = seed_user(&store, "alice", true).await;
    let app_state = create_app_state(Env::Production, store);

    let token = forge_token("alice", TokenKind::Access, 3600);
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &token);

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();

    assert_eq!(auth_user.user, user);
    assert!(auth_user.has_scope(Scope::Delete));
}

#[tokio::test]
async fn test_auth_failure_with_missing_header() {
    let app_state = create_app_state(Env::Production, MemoryStore::new());
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());

    let result = AuthUser::from_request_parts(&mut parts, &app_state).await;
    let err = auth_error(result);

    assert_eq!(err, AuthError::MissingCredentials);
    let response = err.into_response();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
}

#[tokio::test]
async fn test_auth_failure_with_expired_jwt() {
    let store = MemoryStore::new();
    seed_user(&store, "alice", true).await;
    let app_state = create_app_state(Env::Production, store);

    let token = forge_token("alice", TokenKind::Access, -60);
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &token);

    let result = AuthUser::from_request_parts(&mut parts, &app_state).await;
    assert_eq!(auth_error(result), AuthError::ExpiredToken);
}

#[tokio::test]
async fn test_auth_failure_with_malformed_jwt() {
    let app_state = create_app_state(Env::Production, MemoryStore::new());
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, "not.a.token");

    let result = AuthUser::from_request_parts(&mut parts, &app_state).await;
    assert_eq!(auth_error(result), AuthError::MalformedToken);
}

#[tokio::test]
async fn test_auth_rejects_refresh_token_as_bearer() {
    let store = MemoryStore::new();
    seed_user(&store, "alice", true).await;
    let app_state = create_app_state(Env::Production, store);

    let token = forge_token("alice", TokenKind::Refresh, 3600);
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &token);

    let result = AuthUser::from_request_parts(&mut parts, &app_state).await;
    assert_eq!(auth_error(result), AuthError::MalformedToken);
}

#[tokio::test]
async fn test_auth_failure_for_unknown_subject() {
    let app_state = create_app_state(Env::Production, MemoryStore::new());
    let token = forge_token("ghost", TokenKind::Access, 3600);
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &token);

    let result = AuthUser::from_request_parts(&mut parts, &app_state).await;
    assert_eq!(auth_error(result), AuthError::UnknownUser);
}

#[tokio::test]
async fn test_inactive_user_still_resolves() {
    let store = MemoryStore::new();
    seed_user(&store, "sleepy", false).await;
    let app_state = create_app_state(Env::Production, store);

    let token = forge_token("sleepy", TokenKind::Access, 3600);
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &token);

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert!(!auth_user.user.is_active);
}

#[tokio::test]
async fn test_local_bypass_success() {
    let store = MemoryStore::new();
    let user = seed_user(&store, "dev", true).await;
    let app_state = create_app_state(Env::Local, store);

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::HeaderName::from_static("x-user-id"),
        header::HeaderValue::from_str(&user.id.to_string()).unwrap(),
    );

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert_eq!(auth_user.user.id, user.id);
    assert_eq!(auth_user.scopes, Scope::ALL.to_vec());
}

#[tokio::test]
async fn test_local_bypass_disabled_in_prod() {
    let store = MemoryStore::new();
    let user = seed_user(&store, "dev", true).await;
    let app_state = create_app_state(Env::Production, store);

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    // Provide ONLY the local bypass header
    parts.headers.insert(
        header::HeaderName::from_static("x-user-id"),
        header::HeaderValue::from_str(&user.id.to_string()).unwrap(),
    );

    let result = AuthUser::from_request_parts(&mut parts, &app_state).await;
    assert_eq!(auth_error(result), AuthError::MissingCredentials);
}

// --- Error Mapping ---

#[test]
fn test_scope_rejection_carries_challenge() {
    let response = AuthError::InsufficientScope(Scope::Delete).into_response();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers()[header::WWW_AUTHENTICATE],
        "Bearer scope=\"delete\""
    );
}

#[test]
fn test_forbidden_and_inactive_are_403_without_challenge() {
    for err in [AuthError::Forbidden, AuthError::Inactive] {
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().get(header::WWW_AUTHENTICATE).is_none());
    }
}
