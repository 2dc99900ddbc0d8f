//! Generic CRUD handlers.
//!
//! Every resource under `/api` (except users) is served by these five functions,
//! instantiated per [`Resource`]. The caller is resolved first, then the resource's
//! [`Policy`](crate::policy::Policy) for the operation is enforced, then the repository
//! runs inside one transaction that is committed only on success.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{AppState, auth::AuthUser, error::AppError, policy::{Resource, Visibility}, store::Page};

/// POST /api/{resource}
pub async fn create<R: Resource>(
    caller: AuthUser,
    State(state): State<AppState>,
    Json(mut payload): Json<R::Create>,
) -> Result<(StatusCode, Json<R::Entity>), AppError> {
    R::CREATE.enforce(&caller)?;
    let repo = R::default();
    repo.before_create(&caller.user, &mut payload);

    let mut tx = state.store.begin().await?;
    let entity = repo
        .create(tx.as_mut(), payload)
        .await
        .inspect_err(|e| tracing::info!(entity = R::ENTITY, error = %e, "create failed"))?;
    tx.commit().await?;

    tracing::info!(entity = R::ENTITY, id = R::key(&entity), user_id = caller.user.id, "created");
    Ok((StatusCode::CREATED, Json(entity)))
}

/// GET /api/{resource}
pub async fn list<R: Resource>(
    caller: AuthUser,
    State(state): State<AppState>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<R::Entity>>, AppError> {
    R::READ.enforce(&caller)?;
    let mut tx = state.store.begin().await?;
    let rows = R::default()
        .list(tx.as_mut(), page, Visibility::of(&caller.user))
        .await?;
    Ok(Json(rows))
}

/// GET /api/{resource}/{id}
pub async fn get<R: Resource>(
    caller: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<R::Entity>, AppError> {
    R::READ.enforce(&caller)?;
    let mut tx = state.store.begin().await?;
    let entity = R::default()
        .get_by_id(tx.as_mut(), id, Visibility::of(&caller.user))
        .await?;
    Ok(Json(entity))
}

/// PATCH /api/{resource}/{id}
///
/// The row is loaded with the caller's visibility before the per-record gate runs, so
/// hidden rows answer 404 rather than 403.
pub async fn update<R: Resource>(
    caller: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(mut patch): Json<R::Update>,
) -> Result<Json<R::Entity>, AppError> {
    R::UPDATE.enforce(&caller)?;
    let repo = R::default();

    let mut tx = state.store.begin().await?;
    let existing = repo
        .get_by_id(tx.as_mut(), id, Visibility::of(&caller.user))
        .await?;
    repo.authorize_update(tx.as_mut(), &caller, &existing).await?;
    repo.before_update(&caller.user, &mut patch);

    let entity = repo
        .update(tx.as_mut(), existing, patch)
        .await
        .inspect_err(|e| tracing::info!(entity = R::ENTITY, id, error = %e, "update failed"))?;
    tx.commit().await?;
    Ok(Json(entity))
}

/// DELETE /api/{resource}/{id}
pub async fn delete<R: Resource>(
    caller: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, AppError> {
    R::DELETE.enforce(&caller)?;
    let repo = R::default();

    let mut tx = state.store.begin().await?;
    let existing = repo
        .get_by_id(tx.as_mut(), id, Visibility::of(&caller.user))
        .await?;
    repo.delete(tx.as_mut(), existing)
        .await
        .inspect_err(|e| tracing::info!(entity = R::ENTITY, id, error = %e, "delete failed"))?;
    tx.commit().await?;

    tracing::info!(entity = R::ENTITY, id, user_id = caller.user.id, "deleted");
    Ok(StatusCode::NO_CONTENT)
}
