//! Transactional persistence.
//!
//! Every request opens exactly one [`Transaction`] through [`Store::begin`], threads it
//! through all repository calls and commits it once. Dropping a transaction without
//! committing rolls back everything written through it.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use utoipa::IntoParams;

use crate::models::{
    Answer, GameRoom, Player, Question, Ranking, RefTable, ReferenceRow, User,
};

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

pub const DEFAULT_PAGE_SIZE: i64 = 25;
pub const MAX_PAGE_SIZE: i64 = 100;

/// StoreError
///
/// Failures raised by a store implementation. `Conflict` covers unique, foreign-key
/// and check constraint violations; the service layer turns it into invalid input.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("constraint violated: {0}")]
    Conflict(String),
    #[error("invalid stored value: {0}")]
    Decode(String),
    #[error("{table} row {id} does not exist")]
    Missing { table: &'static str, id: i32 },
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            // unique_violation, foreign_key_violation, check_violation
            if matches!(db_err.code().as_deref(), Some("23505" | "23503" | "23514")) {
                return StoreError::Conflict(db_err.message().to_string());
            }
        }
        StoreError::Database(err)
    }
}

/// Page
///
/// Offset pagination as received on list endpoints. Missing values fall back to the
/// default page size; oversized limits are capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct Page {
    /// Rows to skip.
    pub offset: Option<i64>,
    /// Rows to return, at most 100.
    pub limit: Option<i64>,
}

impl Page {
    pub fn new(offset: i64, limit: i64) -> Self {
        Self {
            offset: Some(offset),
            limit: Some(limit),
        }
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    pub fn limit(&self) -> i64 {
        self.limit
            .map_or(DEFAULT_PAGE_SIZE, |limit| limit.clamp(0, MAX_PAGE_SIZE))
    }
}

/// Filters shared by question and answer listings.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentFilter {
    pub include_deleted: bool,
    pub game_type_id: Option<i32>,
}

/// Store
///
/// Entry point of a persistence backend.
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError>;
}

pub type StoreState = Arc<dyn Store>;

/// Transaction
///
/// Row-level operations within one unit of work. Rows passed to `insert_*` carry a
/// placeholder id; the stored row with its assigned id is returned.
#[async_trait]
pub trait Transaction: Send {
    // --- Users & players ---
    async fn insert_user(&mut self, user: &User) -> Result<User, StoreError>;
    async fn user_by_id(&mut self, id: i32) -> Result<Option<User>, StoreError>;
    async fn user_by_username(&mut self, username: &str) -> Result<Option<User>, StoreError>;
    async fn list_users(&mut self, include_inactive: bool, page: Page) -> Result<Vec<User>, StoreError>;
    async fn save_user(&mut self, user: &User) -> Result<User, StoreError>;

    /// Players keep the id of their user; it is not reassigned.
    async fn insert_player(&mut self, player: &Player) -> Result<Player, StoreError>;
    async fn player_by_id(&mut self, id: i32) -> Result<Option<Player>, StoreError>;
    async fn list_players(&mut self, page: Page) -> Result<Vec<Player>, StoreError>;
    async fn save_player(&mut self, player: &Player) -> Result<Player, StoreError>;
    async fn delete_player(&mut self, id: i32) -> Result<bool, StoreError>;

    // --- Reference tables ---
    async fn insert_reference(&mut self, table: RefTable, name: &str) -> Result<ReferenceRow, StoreError>;
    async fn reference_by_id(&mut self, table: RefTable, id: i32) -> Result<Option<ReferenceRow>, StoreError>;
    async fn reference_by_name(&mut self, table: RefTable, name: &str) -> Result<Option<ReferenceRow>, StoreError>;
    async fn list_references(&mut self, table: RefTable, page: Page) -> Result<Vec<ReferenceRow>, StoreError>;
    async fn save_reference(&mut self, table: RefTable, row: &ReferenceRow) -> Result<ReferenceRow, StoreError>;
    async fn delete_reference(&mut self, table: RefTable, id: i32) -> Result<bool, StoreError>;

    // --- Questions & answers ---
    async fn insert_question(&mut self, question: &Question) -> Result<Question, StoreError>;
    async fn question_by_id(&mut self, id: i32) -> Result<Option<Question>, StoreError>;
    /// Reads the question and holds a row lock on it until the transaction ends.
    async fn lock_question(&mut self, id: i32) -> Result<Option<Question>, StoreError>;
    /// Id of the version that replaced this one, if any.
    async fn question_successor(&mut self, id: i32) -> Result<Option<i32>, StoreError>;
    /// Ordered by `excluded`, then id.
    async fn list_questions(&mut self, filter: ContentFilter, page: Page) -> Result<Vec<Question>, StoreError>;
    async fn save_question(&mut self, question: &Question) -> Result<Question, StoreError>;

    async fn insert_answer(&mut self, answer: &Answer) -> Result<Answer, StoreError>;
    async fn answer_by_id(&mut self, id: i32) -> Result<Option<Answer>, StoreError>;
    async fn lock_answer(&mut self, id: i32) -> Result<Option<Answer>, StoreError>;
    async fn answer_successor(&mut self, id: i32) -> Result<Option<i32>, StoreError>;
    /// Ordered by `excluded`, then id.
    async fn list_answers(&mut self, filter: ContentFilter, page: Page) -> Result<Vec<Answer>, StoreError>;
    async fn save_answer(&mut self, answer: &Answer) -> Result<Answer, StoreError>;
    /// Every answer attached to the question, unpaged, in listing order.
    async fn answers_of(&mut self, question_id: i32, include_deleted: bool) -> Result<Vec<Answer>, StoreError>;

    /// Moves every answer attached to `from` onto `to`.
    async fn relink_answers(&mut self, from: i32, to: i32) -> Result<u64, StoreError>;
    /// Marks every answer attached to the question as deleted.
    async fn delete_answers_of(&mut self, question_id: i32) -> Result<u64, StoreError>;
    /// Moves game room memberships of question `from` onto `to`.
    async fn relink_room_questions(&mut self, from: i32, to: i32) -> Result<u64, StoreError>;

    // --- Game rooms & rankings ---
    async fn insert_game_room(&mut self, room: &GameRoom) -> Result<GameRoom, StoreError>;
    async fn game_room_by_id(&mut self, id: i32) -> Result<Option<GameRoom>, StoreError>;
    async fn list_game_rooms(&mut self, page: Page) -> Result<Vec<GameRoom>, StoreError>;
    /// Also replaces the question memberships.
    async fn save_game_room(&mut self, room: &GameRoom) -> Result<GameRoom, StoreError>;
    async fn delete_game_room(&mut self, id: i32) -> Result<bool, StoreError>;

    /// Inserts the ranking and its scores; score ids are assigned too.
    async fn insert_ranking(&mut self, ranking: &Ranking) -> Result<Ranking, StoreError>;
    async fn ranking_by_id(&mut self, id: i32) -> Result<Option<Ranking>, StoreError>;
    async fn list_rankings(&mut self, page: Page) -> Result<Vec<Ranking>, StoreError>;
    /// Also replaces the score table.
    async fn save_ranking(&mut self, ranking: &Ranking) -> Result<Ranking, StoreError>;
    async fn delete_ranking(&mut self, id: i32) -> Result<bool, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
