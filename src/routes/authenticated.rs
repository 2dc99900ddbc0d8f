use crate::{
    AppState,
    handlers::{auth, content, crud, users},
    models::{GameCategory, GameType, QnACategory},
    policy::Resource,
    repository::{EnumRepository, GameRoomRepository, PlayerRepository, RankingRepository},
    versioning::{AnswerRepository, QuestionRepository},
};
use axum::{
    Router,
    routing::{get, post},
};

/// Collection and item routes for one resource, served by the generic CRUD handlers.
fn resource<R: Resource>(path: &str) -> Router<AppState> {
    Router::new()
        .route(path, post(crud::create::<R>).get(crud::list::<R>))
        .route(
            &format!("{path}/{{id}}"),
            get(crud::get::<R>)
                .patch(crud::update::<R>)
                .delete(crud::delete::<R>),
        )
}

/// Authenticated Router Module
///
/// Every route here runs behind the `AuthUser` middleware. Which operations need staff
/// is declared on each [`Resource`].
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /auth/me
        // The caller's account; needs the `me` scope.
        .route("/auth/me", get(auth::get_me))
        // GET/PATCH/DELETE /api/users/{id}
        // Inactive users are hidden from non-staff. Delete deactivates.
        .route(
            "/api/users/{id}",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
        // --- Reference tables (staff-managed allow-lists) ---
        .merge(resource::<EnumRepository<GameType>>("/api/game-types"))
        .merge(resource::<EnumRepository<GameCategory>>("/api/game-categories"))
        .merge(resource::<EnumRepository<QnACategory>>("/api/qna-categories"))
        // GET /api/game-types/{id}/questions
        // Questions of a game type with their answers.
        .route(
            "/api/game-types/{id}/questions",
            get(content::game_type_questions),
        )
        // --- Players ---
        .merge(resource::<PlayerRepository>("/api/players"))
        // --- Versioned content ---
        // Questions: GET by id returns the question with its answers.
        .route(
            "/api/questions",
            post(crud::create::<QuestionRepository>).get(crud::list::<QuestionRepository>),
        )
        .route(
            "/api/questions/{id}",
            get(content::get_question)
                .patch(crud::update::<QuestionRepository>)
                .delete(crud::delete::<QuestionRepository>),
        )
        .merge(resource::<AnswerRepository>("/api/answers"))
        // --- Games ---
        .merge(resource::<GameRoomRepository>("/api/game-rooms"))
        .merge(resource::<RankingRepository>("/api/rankings"))
}
