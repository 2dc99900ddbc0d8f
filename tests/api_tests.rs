use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use party_qna::{AppConfig, AppState, MemoryStore, create_router, seed};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

const ADMIN: &str = "admin";
const PASSWORD: &str = "secret-pw";

// --- Test Harness ---

struct TestApp {
    router: Router,
}

struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

async fn spawn_app() -> TestApp {
    let config = AppConfig {
        admin_username: Some(ADMIN.to_string()),
        admin_password: Some(PASSWORD.to_string()),
        ..AppConfig::default()
    };
    let store = MemoryStore::new();
    seed(&store, &config).await.expect("seeding failed");

    let state = AppState {
        store: Arc::new(store),
        config,
    };
    TestApp {
        router: create_router(state),
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        TestResponse {
            status,
            headers,
            body,
        }
    }

    async fn call(&self, method: Method, uri: &str, token: &str, body: Option<Value>) -> TestResponse {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"));
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        };
        self.send(request.unwrap()).await
    }

    async fn login_response(&self, username: &str, password: &str, scope: Option<&str>) -> TestResponse {
        let mut form = format!("username={username}&password={password}");
        if let Some(scope) = scope {
            form.push_str(&format!("&scope={}", scope.replace(' ', "+")));
        }
        let request = Request::builder()
            .method(Method::POST)
            .uri("/auth/token")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form))
            .unwrap();
        self.send(request).await
    }

    async fn login(&self, username: &str) -> String {
        let response = self.login_response(username, PASSWORD, None).await;
        assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
        response.body["access_token"].as_str().unwrap().to_string()
    }

    /// Registers a user and returns its id and an access token.
    async fn register(&self, username: &str) -> (i64, String) {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/users")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "username": username, "password": PASSWORD }).to_string(),
            ))
            .unwrap();
        let response = self.send(request).await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        let id = response.body["id"].as_i64().unwrap();
        (id, self.login(username).await)
    }
}

fn question_body(text: &str) -> Value {
    json!({ "text": text, "game_type_id": 1, "game_category_id": 1 })
}

// --- Tests ---

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.send(request).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, Value::String("ok".to_string()));
    assert!(response.headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn test_openapi_document_served() {
    let app = spawn_app().await;
    let request = Request::builder()
        .uri("/api-docs/openapi.json")
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body["paths"]["/auth/token"].is_object());

    let paths = &response.body["paths"];
    for path in [
        "/api/players",
        "/api/game-types/{id}",
        "/api/questions",
        "/api/answers/{id}",
        "/api/game-rooms",
        "/api/rankings/{id}",
    ] {
        assert!(paths[path].is_object(), "{path} is not documented");
    }
    let question = &paths["/api/questions/{id}"];
    for method in ["get", "patch", "delete"] {
        assert!(question[method].is_object(), "questions/{{id}} {method}");
    }
    assert!(paths["/api/game-categories"]["post"]["requestBody"].is_object());
}

#[tokio::test]
async fn test_register_login_and_me() {
    let app = spawn_app().await;
    let (id, _) = app.register("alice").await;

    let login = app.login_response("alice", PASSWORD, None).await;
    assert_eq!(login.status, StatusCode::OK);
    assert_eq!(login.body["token_type"], "bearer");
    let cookie = login.headers[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("refresh_token="));
    assert!(cookie.contains("HttpOnly"));

    let token = login.body["access_token"].as_str().unwrap();
    let me = app.call(Method::GET, "/auth/me", token, None).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["id"].as_i64(), Some(id));
    assert_eq!(me.body["username"], "alice");
    assert!(me.body.get("hashed_password").is_none());
}

#[tokio::test]
async fn test_bad_credentials_return_401_without_token() {
    let app = spawn_app().await;
    app.register("alice").await;

    for (username, password) in [("alice", "wrong-pw"), ("ghost", "pw")] {
        let response = app.login_response(username, password, None).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert!(response.body.get("access_token").is_none());
        assert!(!response.headers.contains_key(header::SET_COOKIE));
    }
}

#[tokio::test]
async fn test_duplicate_registration_is_400() {
    let app = spawn_app().await;
    app.register("alice").await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/users")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "username": "alice", "password": PASSWORD }).to_string()))
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_token_is_401() {
    let app = spawn_app().await;
    let request = Request::builder()
        .uri("/api/questions")
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers[header::WWW_AUTHENTICATE], "Bearer");
}

#[tokio::test]
async fn test_missing_scope_is_401_with_challenge() {
    let app = spawn_app().await;
    app.register("alice").await;

    let login = app.login_response("alice", PASSWORD, Some("read")).await;
    let token = login.body["access_token"].as_str().unwrap();

    let me = app.call(Method::GET, "/auth/me", token, None).await;
    assert_eq!(me.status, StatusCode::UNAUTHORIZED);
    assert_eq!(me.headers[header::WWW_AUTHENTICATE], "Bearer scope=\"me\"");

    let read = app.call(Method::GET, "/api/questions", token, None).await;
    assert_eq!(read.status, StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_scope_is_400() {
    let app = spawn_app().await;
    app.register("alice").await;

    let login = app.login_response("alice", PASSWORD, Some("read launch")).await;
    assert_eq!(login.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_non_staff_cannot_manage_reference_tables() {
    let app = spawn_app().await;
    let (_, token) = app.register("alice").await;

    let create = app
        .call(Method::POST, "/api/game-types", &token, Some(json!({ "name": "Ego" })))
        .await;
    assert_eq!(create.status, StatusCode::FORBIDDEN);

    let list = app.call(Method::GET, "/api/game-types", &token, None).await;
    assert_eq!(list.status, StatusCode::OK);
    assert_eq!(list.body.as_array().unwrap().len(), 4);
    assert_eq!(list.body[1]["name"], "Who's Most Likely");
}

#[tokio::test]
async fn test_unknown_enum_name_is_422() {
    let app = spawn_app().await;
    let token = app.login(ADMIN).await;

    let response = app
        .call(Method::POST, "/api/game-types", &token, Some(json!({ "name": "Poker" })))
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_deleting_referenced_game_category_is_400() {
    let app = spawn_app().await;
    let token = app.login(ADMIN).await;

    let room = app
        .call(
            Method::POST,
            "/api/game-rooms",
            &token,
            Some(json!({ "game_type_id": 1, "game_category_id": 2 })),
        )
        .await;
    assert_eq!(room.status, StatusCode::CREATED);

    let response = app.call(Method::DELETE, "/api/game-categories/2", &token, None).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    // An unreferenced one can go.
    let response = app.call(Method::DELETE, "/api/game-categories/3", &token, None).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_edit_by_other_user_forks_question() {
    let app = spawn_app().await;
    let (alice_id, alice) = app.register("alice").await;
    let (bob_id, bob) = app.register("bob").await;
    let staff = app.login(ADMIN).await;

    // The author is always the caller, whatever the body says.
    let mut body = question_body("Who is most likely to be late?");
    body["author_id"] = json!(bob_id);
    let created = app.call(Method::POST, "/api/questions", &alice, Some(body)).await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.body["author_id"].as_i64(), Some(alice_id));
    let q_id = created.body["id"].as_i64().unwrap();

    let edited = app
        .call(
            Method::PATCH,
            &format!("/api/questions/{q_id}"),
            &bob,
            Some(json!({ "text": "x" })),
        )
        .await;
    assert_eq!(edited.status, StatusCode::OK);
    assert_eq!(edited.body["author_id"].as_i64(), Some(bob_id));
    assert_eq!(edited.body["prev_version_id"].as_i64(), Some(q_id));
    assert_ne!(edited.body["id"].as_i64(), Some(q_id));

    let original = app
        .call(Method::GET, &format!("/api/questions/{q_id}"), &staff, None)
        .await;
    assert_eq!(original.status, StatusCode::OK);
    assert_eq!(original.body["text"], "Who is most likely to be late?");
    assert_eq!(original.body["author_id"].as_i64(), Some(alice_id));
}

#[tokio::test]
async fn test_question_detail_and_game_type_listing() {
    let app = spawn_app().await;
    let (_, alice) = app.register("alice").await;

    let q = app
        .call(Method::POST, "/api/questions", &alice, Some(question_body("Q")))
        .await;
    let q_id = q.body["id"].as_i64().unwrap();
    let answer = app
        .call(
            Method::POST,
            "/api/answers",
            &alice,
            Some(json!({ "text": "A", "game_type_id": 1, "game_category_id": 1, "question_id": q_id })),
        )
        .await;
    assert_eq!(answer.status, StatusCode::CREATED);

    let detail = app
        .call(Method::GET, &format!("/api/questions/{q_id}"), &alice, None)
        .await;
    assert_eq!(detail.status, StatusCode::OK);
    assert_eq!(detail.body["text"], "Q");
    assert_eq!(detail.body["answers"][0]["text"], "A");

    let listing = app
        .call(Method::GET, "/api/game-types/1/questions", &alice, None)
        .await;
    assert_eq!(listing.status, StatusCode::OK);
    assert_eq!(listing.body.as_array().unwrap().len(), 1);
    assert_eq!(listing.body[0]["answers"].as_array().unwrap().len(), 1);

    let other = app
        .call(Method::GET, "/api/game-types/2/questions", &alice, None)
        .await;
    assert_eq!(other.body.as_array().unwrap().len(), 0);

    let missing = app
        .call(Method::GET, "/api/game-types/99/questions", &alice, None)
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_deleted_question_hidden_from_non_staff() {
    let app = spawn_app().await;
    let (_, alice) = app.register("alice").await;
    let staff = app.login(ADMIN).await;

    let q = app
        .call(Method::POST, "/api/questions", &alice, Some(question_body("Q")))
        .await;
    let uri = format!("/api/questions/{}", q.body["id"]);

    let deleted = app.call(Method::DELETE, &uri, &alice, None).await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);

    let hidden = app.call(Method::GET, &uri, &alice, None).await;
    assert_eq!(hidden.status, StatusCode::NOT_FOUND);
    let list = app.call(Method::GET, "/api/questions", &alice, None).await;
    assert_eq!(list.body.as_array().unwrap().len(), 0);

    let visible = app.call(Method::GET, &uri, &staff, None).await;
    assert_eq!(visible.status, StatusCode::OK);
    assert_eq!(visible.body["deleted"], true);
}

#[tokio::test]
async fn test_content_with_unknown_game_type_is_400() {
    let app = spawn_app().await;
    let (_, alice) = app.register("alice").await;

    let response = app
        .call(
            Method::POST,
            "/api/questions",
            &alice,
            Some(json!({ "text": "Q", "game_type_id": 999, "game_category_id": 1 })),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_schema_failure_is_422() {
    let app = spawn_app().await;
    let (_, alice) = app.register("alice").await;

    let response = app
        .call(
            Method::POST,
            "/api/questions",
            &alice,
            Some(json!({ "game_type_id": 1, "game_category_id": 1 })),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_unknown_id_is_404() {
    let app = spawn_app().await;
    let (_, alice) = app.register("alice").await;

    let response = app.call(Method::GET, "/api/game-rooms/12345", &alice, None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(response.body["error"].as_str().unwrap().contains("12345"));
}

#[tokio::test]
async fn test_refresh_cookie_issues_new_access_token() {
    let app = spawn_app().await;
    app.register("alice").await;

    let login = app.login_response("alice", PASSWORD, Some("read me")).await;
    let set_cookie = login.headers[header::SET_COOKIE].to_str().unwrap();
    let cookie = set_cookie.split(';').next().unwrap().to_string();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/auth/refresh")
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap();
    let refreshed = app.send(request).await;
    assert_eq!(refreshed.status, StatusCode::OK);
    let token = refreshed.body["access_token"].as_str().unwrap();

    let me = app.call(Method::GET, "/auth/me", token, None).await;
    assert_eq!(me.status, StatusCode::OK);

    // Scopes survive the refresh.
    let create = app
        .call(Method::POST, "/api/questions", token, Some(question_body("Q")))
        .await;
    assert_eq!(create.status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/auth/refresh")
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.send(request).await.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_access_token_is_not_a_refresh_cookie() {
    let app = spawn_app().await;
    app.register("alice").await;
    let token = app.login("alice").await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/auth/refresh")
        .header(header::COOKIE, format!("refresh_token={token}"))
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.send(request).await.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_deactivated_user_is_locked_out() {
    let app = spawn_app().await;
    let (alice_id, alice) = app.register("alice").await;
    let staff = app.login(ADMIN).await;

    let forbidden = app
        .call(Method::DELETE, &format!("/api/users/{alice_id}"), &alice, None)
        .await;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);

    let response = app
        .call(Method::DELETE, &format!("/api/users/{alice_id}"), &staff, None)
        .await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);

    let reuse = app.call(Method::GET, "/api/questions", &alice, None).await;
    assert_eq!(reuse.status, StatusCode::FORBIDDEN);

    let login = app.login_response("alice", PASSWORD, None).await;
    assert_eq!(login.status, StatusCode::FORBIDDEN);

    let (_, bob) = app.register("bob").await;
    let hidden = app
        .call(Method::GET, &format!("/api/users/{alice_id}"), &bob, None)
        .await;
    assert_eq!(hidden.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_user_updates_are_self_or_staff() {
    let app = spawn_app().await;
    let (alice_id, alice) = app.register("alice").await;
    let (_, bob) = app.register("bob").await;
    let uri = format!("/api/users/{alice_id}");

    let other = app
        .call(Method::PATCH, &uri, &bob, Some(json!({ "username": "mallory" })))
        .await;
    assert_eq!(other.status, StatusCode::FORBIDDEN);

    let escalate = app
        .call(Method::PATCH, &uri, &alice, Some(json!({ "is_staff": true })))
        .await;
    assert_eq!(escalate.status, StatusCode::FORBIDDEN);

    let own = app
        .call(Method::PATCH, &uri, &alice, Some(json!({ "password": "fresh-secret" })))
        .await;
    assert_eq!(own.status, StatusCode::OK);

    let login = app.login_response("alice", "fresh-secret", None).await;
    assert_eq!(login.status, StatusCode::OK);
}

#[tokio::test]
async fn test_player_stats_are_self_or_staff() {
    let app = spawn_app().await;
    let (alice_id, alice) = app.register("alice").await;
    let (_, bob) = app.register("bob").await;
    let uri = format!("/api/players/{alice_id}");
    let patch = json!({ "games_played": 2, "games_won": 1 });

    let other = app.call(Method::PATCH, &uri, &bob, Some(patch.clone())).await;
    assert_eq!(other.status, StatusCode::FORBIDDEN);

    let own = app.call(Method::PATCH, &uri, &alice, Some(patch)).await;
    assert_eq!(own.status, StatusCode::OK);
    assert_eq!(own.body["games_won"], 1);
}

#[tokio::test]
async fn test_rankings_are_staff_managed() {
    let app = spawn_app().await;
    let (alice_id, alice) = app.register("alice").await;
    let staff = app.login(ADMIN).await;
    let body = json!({ "scores": [{ "player_id": alice_id, "points": 4.5 }] });

    let denied = app.call(Method::POST, "/api/rankings", &alice, Some(body.clone())).await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);

    let created = app.call(Method::POST, "/api/rankings", &staff, Some(body)).await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.body["scores"][0]["points"], 4.5);

    let read = app
        .call(Method::GET, &format!("/api/rankings/{}", created.body["id"]), &alice, None)
        .await;
    assert_eq!(read.status, StatusCode::OK);
}
