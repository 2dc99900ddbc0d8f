use axum::{
    Json,
    extract::{Path, Query, State},
};

use crate::{
    AppState,
    auth::AuthUser,
    error::AppError,
    models::QuestionDetail,
    policy::{Resource, Visibility},
    repository::Repository,
    store::Page,
    versioning::QuestionRepository,
};

/// get_question
///
/// [Authenticated Route] A single question version with the answers currently linked
/// to it. Deleted rows (the question or its answers) are only visible to staff.
#[utoipa::path(
    get,
    path = "/api/questions/{id}",
    params(("id" = i32, Path, description = "Question ID")),
    responses(
        (status = 200, description = "Question with answers", body = QuestionDetail),
        (status = 404, description = "Not Found")
    ),
    security(("bearer" = []))
)]
pub async fn get_question(
    caller: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<QuestionDetail>, AppError> {
    QuestionRepository::READ.enforce(&caller)?;
    let visibility = Visibility::of(&caller.user);
    let repo = QuestionRepository;

    let mut tx = state.store.begin().await?;
    let question = repo.get_by_id(tx.as_mut(), id, visibility).await?;
    let detail = repo.detail(tx.as_mut(), question, visibility).await?;
    Ok(Json(detail))
}

/// game_type_questions
///
/// [Authenticated Route] Questions of one game type, each with its answers.
#[utoipa::path(
    get,
    path = "/api/game-types/{id}/questions",
    params(("id" = i32, Path, description = "Game type ID"), Page),
    responses(
        (status = 200, description = "Questions with answers", body = [QuestionDetail]),
        (status = 404, description = "Unknown game type")
    ),
    security(("bearer" = []))
)]
pub async fn game_type_questions(
    caller: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<QuestionDetail>>, AppError> {
    QuestionRepository::READ.enforce(&caller)?;

    let mut tx = state.store.begin().await?;
    let details = QuestionRepository
        .by_game_type(tx.as_mut(), id, page, Visibility::of(&caller.user))
        .await?;
    Ok(Json(details))
}
