use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core services.
pub mod auth;
pub mod config;
pub mod error;
pub mod identity;
pub mod models;
pub mod policy;
pub mod repository;
pub mod store;
pub mod versioning;

// HTTP surface.
pub mod handlers;
pub mod routes;
use auth::AuthUser;
use handlers::docs;
use routes::{authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::{AppError, AuthError, ServiceError};
pub use store::{MemoryStore, PostgresStore, Store, StoreState};

/// ApiDoc
///
/// OpenAPI document served at `/api-docs/openapi.json`. Routes served by the generic
/// CRUD handlers are described in [`handlers::docs`].
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::auth::token, handlers::auth::login, handlers::auth::refresh,
        handlers::auth::get_me, handlers::users::register, handlers::users::list_users,
        handlers::users::get_user, handlers::users::update_user, handlers::users::delete_user,
        handlers::content::get_question, handlers::content::game_type_questions,
        docs::game_types::create, docs::game_types::list, docs::game_types::get,
        docs::game_types::update, docs::game_types::delete,
        docs::game_categories::create, docs::game_categories::list, docs::game_categories::get,
        docs::game_categories::update, docs::game_categories::delete,
        docs::qna_categories::create, docs::qna_categories::list, docs::qna_categories::get,
        docs::qna_categories::update, docs::qna_categories::delete,
        docs::players::create, docs::players::list, docs::players::get,
        docs::players::update, docs::players::delete,
        docs::questions::create, docs::questions::list,
        docs::questions::update, docs::questions::delete,
        docs::answers::create, docs::answers::list, docs::answers::get,
        docs::answers::update, docs::answers::delete,
        docs::game_rooms::create, docs::game_rooms::list, docs::game_rooms::get,
        docs::game_rooms::update, docs::game_rooms::delete,
        docs::rankings::create, docs::rankings::list, docs::rankings::get,
        docs::rankings::update, docs::rankings::delete,
    ),
    components(
        schemas(
            auth::Scope, models::UserRead, models::UserCreate, models::UserUpdate,
            models::Player, models::PlayerCreate, models::PlayerUpdate,
            models::GameTypeChoice, models::GameCategoryChoice, models::QnACategoryChoice,
            models::GameType, models::GameCategory, models::QnACategory,
            models::Question, models::QuestionCreate, models::QuestionUpdate,
            models::QuestionDetail, models::Answer, models::AnswerCreate, models::AnswerUpdate,
            models::GameRoom, models::GameRoomCreate, models::GameRoomUpdate,
            models::Ranking, models::RankingCreate, models::RankingUpdate,
            models::PlayerScore, models::ScoreEntry,
            models::LoginForm, models::TokenResponse, models::ErrorDto,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "party-qna", description = "Party game questions and answers API")
    )
)]
struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            )
        }
    }
}

/// AppState
///
/// Shared, cheaply cloneable state handed to every request.
#[derive(Clone)]
pub struct AppState {
    /// Persistence backend, Postgres or in-memory.
    pub store: StoreState,
    pub config: AppConfig,
}

impl FromRef<AppState> for StoreState {
    fn from_ref(app_state: &AppState) -> StoreState {
        app_state.store.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Rejects requests whose `AuthUser` cannot be resolved before any handler runs.
/// Scope and role gates are left to the handlers.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles routes, middleware and state.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .with_state(state);

    // 3. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                // 3a. Request ID generation.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 3b. Request tracing, span carries the request id.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 3c. Echo x-request-id back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS
        .layer(cors)
}

/// trace_span_logger
///
/// Span factory for `TraceLayer`: method, uri and the `x-request-id` header.
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

/// seed
///
/// Startup data: the enum-backed reference tables and, when both `ADMIN_USERNAME` and
/// `ADMIN_PASSWORD` are configured, a staff account. Safe to run on every start.
pub async fn seed(store: &dyn Store, config: &AppConfig) -> Result<(), ServiceError> {
    repository::populate_references(store).await?;

    if let (Some(username), Some(password)) = (&config.admin_username, &config.admin_password) {
        identity::ensure_staff_account(store, username, password, config.bcrypt_cost).await?;
    }
    Ok(())
}
