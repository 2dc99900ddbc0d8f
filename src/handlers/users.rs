use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    AppState,
    auth::{AuthUser, Scope},
    error::{AppError, AuthError},
    identity,
    models::{UserCreate, UserRead, UserUpdate},
    policy::{Policy, Visibility, require_self_or_staff},
    store::Page,
};

/// register
///
/// [Public Route] Creates an active, non-staff account and its player profile.
#[utoipa::path(
    post,
    path = "/api/users",
    request_body = UserCreate,
    responses(
        (status = 201, description = "Registered", body = UserRead),
        (status = 400, description = "Invalid or taken username")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<UserCreate>,
) -> Result<(StatusCode, Json<UserRead>), AppError> {
    let account = identity::prepare_account(payload, state.config.bcrypt_cost).await?;

    let mut tx = state.store.begin().await?;
    let user = identity::register(tx.as_mut(), account).await?;
    tx.commit().await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// list_users
///
/// [Authenticated Route] Inactive accounts are only listed for staff.
#[utoipa::path(
    get,
    path = "/api/users",
    params(Page),
    responses((status = 200, description = "Users", body = [UserRead])),
    security(("bearer" = []))
)]
pub async fn list_users(
    caller: AuthUser,
    State(state): State<AppState>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<UserRead>>, AppError> {
    Policy::active(Scope::Read).enforce(&caller)?;
    let mut tx = state.store.begin().await?;
    let users = identity::list_users(tx.as_mut(), page, Visibility::of(&caller.user)).await?;
    Ok(Json(users.into_iter().map(UserRead::from).collect()))
}

#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "User", body = UserRead),
        (status = 404, description = "Not Found")
    ),
    security(("bearer" = []))
)]
pub async fn get_user(
    caller: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<UserRead>, AppError> {
    Policy::active(Scope::Read).enforce(&caller)?;
    let mut tx = state.store.begin().await?;
    let user = identity::find_user(tx.as_mut(), id, Visibility::of(&caller.user)).await?;
    Ok(Json(user.into()))
}

/// update_user
///
/// [Authenticated Route] Self-or-staff. Changing `is_active` or `is_staff` requires
/// staff even on one's own account.
#[utoipa::path(
    patch,
    path = "/api/users/{id}",
    params(("id" = i32, Path, description = "User ID")),
    request_body = UserUpdate,
    responses(
        (status = 200, description = "Updated", body = UserRead),
        (status = 403, description = "Not self or staff"),
        (status = 404, description = "Not Found")
    ),
    security(("bearer" = []))
)]
pub async fn update_user(
    caller: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(patch): Json<UserUpdate>,
) -> Result<Json<UserRead>, AppError> {
    Policy::active(Scope::Update).enforce(&caller)?;

    if patch.touches_privileges() && !caller.user.is_staff {
        tracing::info!(user_id = caller.user.id, target_id = id, "privilege change rejected");
        return Err(AuthError::Forbidden.into());
    }
    let change = identity::prepare_update(patch, state.config.bcrypt_cost).await?;

    let mut tx = state.store.begin().await?;
    let target = identity::find_user(tx.as_mut(), id, Visibility::of(&caller.user)).await?;
    require_self_or_staff(&caller.user, &target)?;

    let user = identity::update_user(tx.as_mut(), target, change).await?;
    tx.commit().await?;
    Ok(Json(user.into()))
}

/// delete_user
///
/// [Staff Route] Deactivates the account; the row and its player are kept.
#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 204, description = "Deactivated"),
        (status = 403, description = "Not staff"),
        (status = 404, description = "Not Found")
    ),
    security(("bearer" = []))
)]
pub async fn delete_user(
    caller: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, AppError> {
    Policy::staff(Scope::Delete).enforce(&caller)?;

    let mut tx = state.store.begin().await?;
    let target = identity::find_user(tx.as_mut(), id, Visibility::Staff).await?;
    identity::deactivate(tx.as_mut(), target).await?;
    tx.commit().await?;
    Ok(StatusCode::NO_CONTENT)
}
