use axum::{
    Form, Json,
    extract::State,
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use chrono::Duration;

use crate::{
    AppState,
    auth::{AuthUser, Scope, TokenKind, issue_token, verify_token},
    config::{AppConfig, Env},
    error::{AppError, AuthError},
    identity,
    models::{LoginForm, TokenResponse, User, UserRead},
    policy::Policy,
};

pub const REFRESH_COOKIE: &str = "refresh_token";

fn refresh_cookie(config: &AppConfig, token: &str) -> String {
    let max_age = Duration::days(config.refresh_token_days).num_seconds();
    let mut cookie =
        format!("{REFRESH_COOKIE}={token}; HttpOnly; Path=/auth; Max-Age={max_age}; SameSite=Lax");
    if config.env == Env::Production {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Reads the refresh token out of the `Cookie` header.
fn refresh_token_from(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == REFRESH_COOKIE)
        .map(|(_, token)| token)
}

/// Issues the access token in the body and the refresh token as a cookie.
fn token_pair(config: &AppConfig, user: &User, scopes: &[Scope]) -> Result<Response, AppError> {
    let access = issue_token(
        &config.jwt_secret,
        user,
        TokenKind::Access,
        Duration::minutes(config.access_token_minutes),
        scopes,
    )?;
    let refresh = issue_token(
        &config.jwt_secret,
        user,
        TokenKind::Refresh,
        Duration::days(config.refresh_token_days),
        scopes,
    )?;

    Ok((
        [(header::SET_COOKIE, refresh_cookie(config, &refresh))],
        Json(TokenResponse::bearer(access)),
    )
        .into_response())
}

async fn password_login(state: AppState, form: LoginForm) -> Result<Response, AppError> {
    let scopes = Scope::parse_list(form.scope.as_deref())?;

    let user = identity::authenticate(state.store.as_ref(), &form.username, &form.password)
        .await?
        .ok_or_else(|| {
            tracing::info!(username = %form.username, "login failed");
            AuthError::BadCredentials
        })?;

    if !user.is_active {
        return Err(AuthError::Inactive.into());
    }

    tracing::info!(user_id = user.id, "login succeeded");
    token_pair(&state.config, &user, &scopes)
}

/// login_for_access_token
///
/// [Public Route] OAuth2 password flow. The form may narrow the granted scopes.
#[utoipa::path(
    post,
    path = "/auth/token",
    request_body(content = LoginForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Access token; refresh token set as cookie", body = TokenResponse),
        (status = 401, description = "Incorrect username or password"),
        (status = 403, description = "Inactive user")
    )
)]
pub async fn token(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    password_login(state, form).await
}

/// Alias of `/auth/token` used by the web client.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body(content = LoginForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Access token; refresh token set as cookie", body = TokenResponse),
        (status = 401, description = "Incorrect username or password"),
        (status = 403, description = "Inactive user")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    password_login(state, form).await
}

/// refresh
///
/// [Public Route] Exchanges the refresh cookie for a new access token. The refresh
/// token is rotated and keeps the scopes it was issued with.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "New access token", body = TokenResponse),
        (status = 401, description = "Missing, invalid or expired refresh token")
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let token = refresh_token_from(&headers).ok_or(AuthError::MissingCredentials)?;
    let claims = verify_token(&state.config.jwt_secret, token, TokenKind::Refresh)
        .map_err(AuthError::from)?;

    let mut tx = state.store.begin().await?;
    let user = tx
        .user_by_username(&claims.sub)
        .await?
        .ok_or(AuthError::UnknownUser)?;
    drop(tx);

    if !user.is_active {
        return Err(AuthError::Inactive.into());
    }
    token_pair(&state.config, &user, &claims.scopes)
}

/// get_me
///
/// [Authenticated Route] The caller's own account. Requires the `me` scope.
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Current user", body = UserRead),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer" = []))
)]
pub async fn get_me(caller: AuthUser) -> Result<Json<UserRead>, AppError> {
    Policy::active(Scope::Me).enforce(&caller)?;
    Ok(Json(UserRead::from(&caller.user)))
}
