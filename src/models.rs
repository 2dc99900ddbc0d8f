use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;

// --- Identity ---

/// User
///
/// The stored identity record. Never serialized directly: the hash stays server-side
/// and every response goes through [`UserRead`].
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Default)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub hashed_password: String,
    pub is_active: bool,
    pub is_staff: bool,
}

/// UserRead
///
/// Public projection of a [`User`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserRead {
    pub id: i32,
    pub username: String,
    pub is_active: bool,
    pub is_staff: bool,
}

impl From<&User> for UserRead {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            is_active: user.is_active,
            is_staff: user.is_staff,
        }
    }
}

impl From<User> for UserRead {
    fn from(user: User) -> Self {
        Self::from(&user)
    }
}

/// Registration payload (POST /api/users).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserCreate {
    #[schema(example = "quizmaster")]
    pub username: String,
    pub password: String,
}

/// UserUpdate
///
/// Partial profile update. `is_active` and `is_staff` are privilege flags and are
/// only honoured for staff callers.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_staff: Option<bool>,
}

impl UserUpdate {
    pub fn touches_privileges(&self) -> bool {
        self.is_active.is_some() || self.is_staff.is_some()
    }
}

/// Player
///
/// Game statistics of a user. Shares its primary key with the owning [`User`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Player {
    pub id: i32,
    pub games_played: i32,
    pub games_won: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PlayerCreate {
    /// Id of the user this player belongs to.
    pub id: i32,
    pub games_played: Option<i32>,
    pub games_won: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct PlayerUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub games_played: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub games_won: Option<i32>,
}

// --- Reference tables ---

/// The three enum-backed lookup tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefTable {
    GameTypes,
    GameCategories,
    QnaCategories,
}

impl RefTable {
    pub const ALL: [RefTable; 3] = [
        RefTable::GameTypes,
        RefTable::GameCategories,
        RefTable::QnaCategories,
    ];

    pub const fn table_name(self) -> &'static str {
        match self {
            RefTable::GameTypes => "game_types",
            RefTable::GameCategories => "game_categories",
            RefTable::QnaCategories => "qna_categories",
        }
    }

    pub const fn entity(self) -> &'static str {
        match self {
            RefTable::GameTypes => "game_type",
            RefTable::GameCategories => "game_category",
            RefTable::QnaCategories => "qna_category",
        }
    }
}

/// Choice
///
/// A closed allow-list of names for one reference table. Serde rejects unknown names
/// at the API boundary; [`Choice::parse`] rejects them when rows are read back.
pub trait Choice:
    Copy + Eq + Send + Sync + Serialize + DeserializeOwned + std::fmt::Debug + 'static
{
    const ALL: &'static [Self];
    const TABLE: RefTable;

    fn as_str(self) -> &'static str;

    fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|choice| choice.as_str() == value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub enum GameTypeChoice {
    #[serde(rename = "Ego")]
    Ego,
    #[serde(rename = "Who's Most Likely")]
    WhosMostLikely,
    #[serde(rename = "Gentlemen's cards")]
    GentlemensCards,
    #[serde(rename = "Never have I ever")]
    NeverHaveIEver,
}

impl Choice for GameTypeChoice {
    const ALL: &'static [Self] = &[
        Self::Ego,
        Self::WhosMostLikely,
        Self::GentlemensCards,
        Self::NeverHaveIEver,
    ];
    const TABLE: RefTable = RefTable::GameTypes;

    fn as_str(self) -> &'static str {
        match self {
            Self::Ego => "Ego",
            Self::WhosMostLikely => "Who's Most Likely",
            Self::GentlemensCards => "Gentlemen's cards",
            Self::NeverHaveIEver => "Never have I ever",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub enum GameCategoryChoice {
    #[serde(rename = "SFW")]
    Sfw,
    #[serde(rename = "NSFW")]
    Nsfw,
    #[serde(rename = "Mixed")]
    Mixed,
}

impl Choice for GameCategoryChoice {
    const ALL: &'static [Self] = &[Self::Sfw, Self::Nsfw, Self::Mixed];
    const TABLE: RefTable = RefTable::GameCategories;

    fn as_str(self) -> &'static str {
        match self {
            Self::Sfw => "SFW",
            Self::Nsfw => "NSFW",
            Self::Mixed => "Mixed",
        }
    }
}

/// Categories a single question or answer can carry. A game room may be `Mixed`,
/// a piece of content cannot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub enum QnACategoryChoice {
    #[serde(rename = "SFW")]
    Sfw,
    #[serde(rename = "NSFW")]
    Nsfw,
}

impl Choice for QnACategoryChoice {
    const ALL: &'static [Self] = &[Self::Sfw, Self::Nsfw];
    const TABLE: RefTable = RefTable::QnaCategories;

    fn as_str(self) -> &'static str {
        match self {
            Self::Sfw => "SFW",
            Self::Nsfw => "NSFW",
        }
    }
}

/// Raw reference row as persisted. Names are validated when converted into an entity.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ReferenceRow {
    pub id: i32,
    pub name: String,
}

/// Reference
///
/// Typed view over a [`ReferenceRow`] for one table.
pub trait Reference: Serialize + Send + Sync + 'static {
    type Choice: Choice;

    fn new(id: i32, name: Self::Choice) -> Self;
    fn id(&self) -> i32;
    fn name(&self) -> Self::Choice;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct GameType {
    pub id: i32,
    pub name: GameTypeChoice,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct GameCategory {
    pub id: i32,
    pub name: GameCategoryChoice,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct QnACategory {
    pub id: i32,
    pub name: QnACategoryChoice,
}

impl Reference for GameType {
    type Choice = GameTypeChoice;

    fn new(id: i32, name: GameTypeChoice) -> Self {
        Self { id, name }
    }
    fn id(&self) -> i32 {
        self.id
    }
    fn name(&self) -> GameTypeChoice {
        self.name
    }
}

impl Reference for GameCategory {
    type Choice = GameCategoryChoice;

    fn new(id: i32, name: GameCategoryChoice) -> Self {
        Self { id, name }
    }
    fn id(&self) -> i32 {
        self.id
    }
    fn name(&self) -> GameCategoryChoice {
        self.name
    }
}

impl Reference for QnACategory {
    type Choice = QnACategoryChoice;

    fn new(id: i32, name: QnACategoryChoice) -> Self {
        Self { id, name }
    }
    fn id(&self) -> i32 {
        self.id
    }
    fn name(&self) -> QnACategoryChoice {
        self.name
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReferenceCreate<C> {
    pub name: C,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReferenceUpdate<C> {
    pub name: Option<C>,
}

// --- Versioned content ---

/// Question
///
/// One version of a question. Edits append a new row whose `prev_version_id` points
/// here; this row is then only reachable as history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Question {
    pub id: i32,
    #[schema(example = "Who is most likely to forget their own birthday?")]
    pub text: String,
    pub excluded: bool,
    pub deleted: bool,
    pub author_id: i32,
    pub game_type_id: i32,
    pub game_category_id: i32,
    pub prev_version_id: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct QuestionCreate {
    pub text: String,
    pub excluded: Option<bool>,
    /// Overwritten with the caller's id.
    pub author_id: Option<i32>,
    pub game_type_id: i32,
    pub game_category_id: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct QuestionUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excluded: Option<bool>,
    /// Overwritten with the caller's id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_type_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_category_id: Option<i32>,
}

impl QuestionUpdate {
    /// True when the patch changes content and therefore needs a new version.
    pub fn forks(&self) -> bool {
        self.text.is_some() || self.game_type_id.is_some() || self.game_category_id.is_some()
    }
}

/// A question together with the answers attached to it.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct QuestionDetail {
    #[serde(flatten)]
    pub question: Question,
    pub answers: Vec<Answer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Answer {
    pub id: i32,
    pub text: String,
    pub excluded: bool,
    pub deleted: bool,
    pub author_id: i32,
    pub game_type_id: i32,
    pub game_category_id: i32,
    pub question_id: Option<i32>,
    pub prev_version_id: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AnswerCreate {
    pub text: String,
    pub excluded: Option<bool>,
    /// Overwritten with the caller's id.
    pub author_id: Option<i32>,
    pub game_type_id: i32,
    pub game_category_id: i32,
    pub question_id: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AnswerUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excluded: Option<bool>,
    /// Overwritten with the caller's id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_type_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_category_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_id: Option<i32>,
}

impl AnswerUpdate {
    pub fn forks(&self) -> bool {
        self.text.is_some()
            || self.game_type_id.is_some()
            || self.game_category_id.is_some()
            || self.question_id.is_some()
    }
}

// --- Game rooms & rankings ---

/// GameRoom
///
/// A played (or running) session. `question_ids` is the membership list; question
/// edits move memberships onto the new version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct GameRoom {
    pub id: i32,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    pub rounds: i32,
    pub cur_round: i32,
    pub game_type_id: i32,
    pub game_category_id: i32,
    #[sqlx(skip)]
    pub question_ids: Vec<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct GameRoomCreate {
    pub rounds: Option<i32>,
    pub game_type_id: i32,
    pub game_category_id: i32,
    #[serde(default)]
    pub question_ids: Vec<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct GameRoomUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rounds: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cur_round: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_ids: Option<Vec<i32>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct PlayerScore {
    pub id: i32,
    pub points: f64,
    pub player_id: i32,
    pub ranking_id: i32,
}

/// Final scores of one game room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Ranking {
    pub id: i32,
    pub game_room_id: Option<i32>,
    #[sqlx(skip)]
    pub scores: Vec<PlayerScore>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ScoreEntry {
    pub player_id: i32,
    pub points: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RankingCreate {
    pub game_room_id: Option<i32>,
    #[serde(default)]
    pub scores: Vec<ScoreEntry>,
}

/// Replaces the listed parts of a ranking. `scores`, when present, replaces the
/// whole score table.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RankingUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_room_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scores: Option<Vec<ScoreEntry>>,
}

// --- Auth payloads ---

/// LoginForm
///
/// OAuth2 password-flow form. `scope` is a space separated list; when absent every
/// scope is granted.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct TokenResponse {
    pub access_token: String,
    #[schema(example = "bearer")]
    pub token_type: String,
}

impl TokenResponse {
    pub fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer".to_string(),
        }
    }
}

/// Error body returned by every failing request.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ErrorDto {
    pub error: String,
}
