//! OpenAPI operations for the routes served by [`super::crud`].
//!
//! The generic handlers cannot carry `#[utoipa::path]` themselves, so each resource
//! gets a module of bodiless operations listed in the `ApiDoc`.

use crate::{
    models::{
        Answer, AnswerCreate, AnswerUpdate, ErrorDto, GameCategory, GameCategoryChoice, GameRoom,
        GameRoomCreate, GameRoomUpdate, GameType, GameTypeChoice, Player, PlayerCreate,
        PlayerUpdate, QnACategory, QnACategoryChoice, Question, QuestionCreate, QuestionUpdate,
        Ranking, RankingCreate, RankingUpdate, ReferenceCreate, ReferenceUpdate,
    },
    store::Page,
};

/// `crud_docs!(module: tag, collection, item, entity [..], create [..], update [..] $(, get)?)`
///
/// Pass the trailing `get` unless a hand-written handler documents `GET {item}`.
macro_rules! crud_docs {
    (
        $module:ident: $tag:tt, $collection:tt, $item:tt,
        entity [$($entity:tt)+], create [$($create:tt)+], update [$($update:tt)+], get
    ) => {
        pub mod $module {
            #[allow(unused_imports)]
            use super::*;

            crud_docs!(@writes $tag, $collection, $item, [$($entity)+], [$($create)+], [$($update)+]);

            #[utoipa::path(
                get,
                path = $item,
                tag = $tag,
                params(("id" = i32, Path, description = "Row ID")),
                responses(
                    (status = 200, description = "Row", body = $($entity)+),
                    (status = 404, description = "Not Found", body = ErrorDto)
                ),
                security(("bearer" = []))
            )]
            pub async fn get() {}
        }
    };
    (
        $module:ident: $tag:tt, $collection:tt, $item:tt,
        entity [$($entity:tt)+], create [$($create:tt)+], update [$($update:tt)+]
    ) => {
        pub mod $module {
            #[allow(unused_imports)]
            use super::*;

            crud_docs!(@writes $tag, $collection, $item, [$($entity)+], [$($create)+], [$($update)+]);
        }
    };
    (@writes $tag:tt, $collection:tt, $item:tt, [$($entity:tt)+], [$($create:tt)+], [$($update:tt)+]) => {
        #[utoipa::path(
            post,
            path = $collection,
            tag = $tag,
            request_body = $($create)+,
            responses(
                (status = 201, description = "Created", body = $($entity)+),
                (status = 400, description = "Invalid payload", body = ErrorDto),
                (status = 403, description = "Missing scope or role", body = ErrorDto)
            ),
            security(("bearer" = []))
        )]
        pub async fn create() {}

        #[utoipa::path(
            get,
            path = $collection,
            tag = $tag,
            params(Page),
            responses((status = 200, description = "One page of rows", body = [$($entity)+])),
            security(("bearer" = []))
        )]
        pub async fn list() {}

        #[utoipa::path(
            patch,
            path = $item,
            tag = $tag,
            params(("id" = i32, Path, description = "Row ID")),
            request_body = $($update)+,
            responses(
                (status = 200, description = "Updated row or its new version", body = $($entity)+),
                (status = 400, description = "Invalid patch", body = ErrorDto),
                (status = 404, description = "Not Found", body = ErrorDto)
            ),
            security(("bearer" = []))
        )]
        pub async fn update() {}

        #[utoipa::path(
            delete,
            path = $item,
            tag = $tag,
            params(("id" = i32, Path, description = "Row ID")),
            responses(
                (status = 204, description = "Deleted"),
                (status = 400, description = "Still referenced", body = ErrorDto),
                (status = 404, description = "Not Found", body = ErrorDto)
            ),
            security(("bearer" = []))
        )]
        pub async fn delete() {}
    };
}

crud_docs!(game_types: "references", "/api/game-types", "/api/game-types/{id}",
    entity [GameType], create [ReferenceCreate<GameTypeChoice>], update [ReferenceUpdate<GameTypeChoice>], get);
crud_docs!(game_categories: "references", "/api/game-categories", "/api/game-categories/{id}",
    entity [GameCategory], create [ReferenceCreate<GameCategoryChoice>],
    update [ReferenceUpdate<GameCategoryChoice>], get);
crud_docs!(qna_categories: "references", "/api/qna-categories", "/api/qna-categories/{id}",
    entity [QnACategory], create [ReferenceCreate<QnACategoryChoice>],
    update [ReferenceUpdate<QnACategoryChoice>], get);
crud_docs!(players: "players", "/api/players", "/api/players/{id}",
    entity [Player], create [PlayerCreate], update [PlayerUpdate], get);
// GET /api/questions/{id} is `content::get_question`.
crud_docs!(questions: "content", "/api/questions", "/api/questions/{id}",
    entity [Question], create [QuestionCreate], update [QuestionUpdate]);
crud_docs!(answers: "content", "/api/answers", "/api/answers/{id}",
    entity [Answer], create [AnswerCreate], update [AnswerUpdate], get);
crud_docs!(game_rooms: "games", "/api/game-rooms", "/api/game-rooms/{id}",
    entity [GameRoom], create [GameRoomCreate], update [GameRoomUpdate], get);
crud_docs!(rankings: "games", "/api/rankings", "/api/rankings/{id}",
    entity [Ranking], create [RankingCreate], update [RankingUpdate], get);
