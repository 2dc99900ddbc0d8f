use crate::{
    AppState,
    handlers::{auth, users},
};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints that do not require a token up front.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check for load balancers; does not touch the store.
        .route("/health", get(|| async { "ok" }))
        // POST /auth/token, POST /auth/login
        // OAuth2 password flow. Returns the access token and sets the refresh cookie.
        .route("/auth/token", post(auth::token))
        .route("/auth/login", post(auth::login))
        // POST /auth/refresh
        // Exchanges the HttpOnly refresh cookie for a new token pair.
        .route("/auth/refresh", post(auth::refresh))
        // POST /api/users, GET /api/users
        // Registration is open. Listing shares the path, so it lives here and resolves
        // the caller through its own `AuthUser` argument.
        .route("/api/users", post(users::register).get(users::list_users))
}
