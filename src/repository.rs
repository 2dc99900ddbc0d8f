use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    error::ServiceError,
    models::{
        Choice, GameRoom, GameRoomCreate, GameRoomUpdate, Player, PlayerCreate, PlayerScore,
        PlayerUpdate, Ranking, RankingCreate, RankingUpdate, RefTable, Reference, ReferenceCreate,
        ReferenceRow, ReferenceUpdate, ScoreEntry,
    },
    policy::Visibility,
    store::{Page, Store, StoreError, Transaction},
};

pub const DEFAULT_ROUNDS: i32 = 10;

/// Repository
///
/// The generic operation set shared by every resource. Implementations are stateless;
/// all state lives behind the transaction handed to each call.
#[async_trait]
pub trait Repository: Default + Send + Sync + 'static {
    type Entity: Serialize + Send + Sync + 'static;
    type Create: DeserializeOwned + Send + 'static;
    type Update: DeserializeOwned + Send + 'static;

    /// Entity name used in errors and logs.
    const ENTITY: &'static str;

    fn key(entity: &Self::Entity) -> i32;

    /// Looks up a row, hiding what `visibility` does not allow.
    async fn find(
        &self,
        tx: &mut dyn Transaction,
        id: i32,
        visibility: Visibility,
    ) -> Result<Option<Self::Entity>, ServiceError>;

    async fn get_by_id(
        &self,
        tx: &mut dyn Transaction,
        id: i32,
        visibility: Visibility,
    ) -> Result<Self::Entity, ServiceError> {
        match self.find(tx, id, visibility).await? {
            Some(entity) => Ok(entity),
            None => {
                tracing::warn!(entity = Self::ENTITY, id, "record not found");
                Err(ServiceError::NotFound {
                    entity: Self::ENTITY,
                    id,
                })
            }
        }
    }

    async fn list(
        &self,
        tx: &mut dyn Transaction,
        page: Page,
        visibility: Visibility,
    ) -> Result<Vec<Self::Entity>, ServiceError>;

    async fn create(
        &self,
        tx: &mut dyn Transaction,
        payload: Self::Create,
    ) -> Result<Self::Entity, ServiceError>;

    /// Applies the fields present in `patch`; absent fields keep their value.
    async fn update(
        &self,
        tx: &mut dyn Transaction,
        existing: Self::Entity,
        patch: Self::Update,
    ) -> Result<Self::Entity, ServiceError>;

    async fn delete(&self, tx: &mut dyn Transaction, existing: Self::Entity) -> Result<(), ServiceError>;
}

// --- Relation helpers ---

/// Resolves a foreign reference; a miss is a `RelationNotFound`, not a `NotFound`.
pub async fn require_reference(
    tx: &mut dyn Transaction,
    table: RefTable,
    id: i32,
) -> Result<ReferenceRow, ServiceError> {
    tx.reference_by_id(table, id)
        .await?
        .ok_or(ServiceError::RelationNotFound {
            entity: table.entity(),
            id,
        })
}

pub async fn require_user(tx: &mut dyn Transaction, id: i32) -> Result<(), ServiceError> {
    match tx.user_by_id(id).await? {
        Some(_) => Ok(()),
        None => Err(ServiceError::RelationNotFound { entity: "user", id }),
    }
}

/// Resolves a question that may still be linked to, i.e. one that is not deleted.
/// The row stays locked until the transaction ends.
pub async fn require_live_question(tx: &mut dyn Transaction, id: i32) -> Result<(), ServiceError> {
    match tx.lock_question(id).await? {
        Some(question) if !question.deleted => Ok(()),
        _ => Err(ServiceError::RelationNotFound {
            entity: "question",
            id,
        }),
    }
}

fn removed(deleted: bool, entity: &'static str, id: i32) -> Result<(), ServiceError> {
    if deleted {
        tracing::info!(entity, id, "deleted");
        Ok(())
    } else {
        Err(ServiceError::NotFound { entity, id })
    }
}

// --- Enum-backed reference tables ---

/// EnumRepository
///
/// CRUD over one reference table. Names are restricted to the table's [`Choice`]
/// allow-list both on input and when reading rows back.
pub struct EnumRepository<E>(PhantomData<fn() -> E>);

impl<E> Default for EnumRepository<E> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<E: Reference> EnumRepository<E> {
    fn table() -> RefTable {
        <E::Choice as Choice>::TABLE
    }

    fn decode(row: ReferenceRow) -> Result<E, ServiceError> {
        let name = E::Choice::parse(&row.name).ok_or_else(|| {
            StoreError::Decode(format!(
                "{} {} has unknown name {:?}",
                Self::table().entity(),
                row.id,
                row.name
            ))
        })?;
        Ok(E::new(row.id, name))
    }

    /// populate
    ///
    /// Inserts every allow-listed name not yet present. Idempotent; returns the number
    /// of rows added.
    pub async fn populate(&self, tx: &mut dyn Transaction) -> Result<usize, ServiceError> {
        let table = Self::table();
        let mut added = 0;
        for choice in E::Choice::ALL {
            if tx.reference_by_name(table, choice.as_str()).await?.is_none() {
                tx.insert_reference(table, choice.as_str()).await?;
                added += 1;
            }
        }
        if added > 0 {
            tracing::info!(table = table.table_name(), added, "populated reference table");
        }
        Ok(added)
    }
}

#[async_trait]
impl<E: Reference> Repository for EnumRepository<E> {
    type Entity = E;
    type Create = ReferenceCreate<E::Choice>;
    type Update = ReferenceUpdate<E::Choice>;

    const ENTITY: &'static str = <E::Choice as Choice>::TABLE.entity();

    fn key(entity: &E) -> i32 {
        entity.id()
    }

    async fn find(
        &self,
        tx: &mut dyn Transaction,
        id: i32,
        _visibility: Visibility,
    ) -> Result<Option<E>, ServiceError> {
        tx.reference_by_id(Self::table(), id)
            .await?
            .map(Self::decode)
            .transpose()
    }

    async fn list(
        &self,
        tx: &mut dyn Transaction,
        page: Page,
        _visibility: Visibility,
    ) -> Result<Vec<E>, ServiceError> {
        tx.list_references(Self::table(), page)
            .await?
            .into_iter()
            .map(Self::decode)
            .collect()
    }

    async fn create(
        &self,
        tx: &mut dyn Transaction,
        payload: ReferenceCreate<E::Choice>,
    ) -> Result<E, ServiceError> {
        let row = tx.insert_reference(Self::table(), payload.name.as_str()).await?;
        Self::decode(row)
    }

    async fn update(
        &self,
        tx: &mut dyn Transaction,
        existing: E,
        patch: ReferenceUpdate<E::Choice>,
    ) -> Result<E, ServiceError> {
        let Some(name) = patch.name else {
            return Ok(existing);
        };
        let row = ReferenceRow {
            id: existing.id(),
            name: name.as_str().to_string(),
        };
        let row = tx.save_reference(Self::table(), &row).await?;
        Self::decode(row)
    }

    async fn delete(&self, tx: &mut dyn Transaction, existing: E) -> Result<(), ServiceError> {
        let table = Self::table();
        let id = existing.id();
        removed(tx.delete_reference(table, id).await?, Self::ENTITY, id)
    }
}

/// Seeds all reference tables in one transaction.
pub async fn populate_references(store: &dyn Store) -> Result<(), ServiceError> {
    use crate::models::{GameCategory, GameType, QnACategory};

    let mut tx = store.begin().await?;
    EnumRepository::<GameType>::default().populate(tx.as_mut()).await?;
    EnumRepository::<GameCategory>::default().populate(tx.as_mut()).await?;
    EnumRepository::<QnACategory>::default().populate(tx.as_mut()).await?;
    tx.commit().await?;
    Ok(())
}

// --- Players ---

fn check_stats(games_played: i32, games_won: i32) -> Result<(), ServiceError> {
    if games_played < 0 || games_won < 0 {
        return Err(ServiceError::InvalidInput(
            "game counters cannot be negative".to_string(),
        ));
    }
    if games_won > games_played {
        return Err(ServiceError::InvalidInput(
            "games_won cannot exceed games_played".to_string(),
        ));
    }
    Ok(())
}

#[derive(Default)]
pub struct PlayerRepository;

#[async_trait]
impl Repository for PlayerRepository {
    type Entity = Player;
    type Create = PlayerCreate;
    type Update = PlayerUpdate;

    const ENTITY: &'static str = "player";

    fn key(entity: &Player) -> i32 {
        entity.id
    }

    async fn find(
        &self,
        tx: &mut dyn Transaction,
        id: i32,
        _visibility: Visibility,
    ) -> Result<Option<Player>, ServiceError> {
        Ok(tx.player_by_id(id).await?)
    }

    async fn list(
        &self,
        tx: &mut dyn Transaction,
        page: Page,
        _visibility: Visibility,
    ) -> Result<Vec<Player>, ServiceError> {
        Ok(tx.list_players(page).await?)
    }

    async fn create(&self, tx: &mut dyn Transaction, payload: PlayerCreate) -> Result<Player, ServiceError> {
        require_user(tx, payload.id).await?;
        let player = Player {
            id: payload.id,
            games_played: payload.games_played.unwrap_or(0),
            games_won: payload.games_won.unwrap_or(0),
        };
        check_stats(player.games_played, player.games_won)?;
        Ok(tx.insert_player(&player).await?)
    }

    async fn update(
        &self,
        tx: &mut dyn Transaction,
        existing: Player,
        patch: PlayerUpdate,
    ) -> Result<Player, ServiceError> {
        let player = Player {
            games_played: patch.games_played.unwrap_or(existing.games_played),
            games_won: patch.games_won.unwrap_or(existing.games_won),
            ..existing
        };
        check_stats(player.games_played, player.games_won)?;
        Ok(tx.save_player(&player).await?)
    }

    async fn delete(&self, tx: &mut dyn Transaction, existing: Player) -> Result<(), ServiceError> {
        removed(tx.delete_player(existing.id).await?, Self::ENTITY, existing.id)
    }
}

// --- Game rooms ---

async fn room_questions(tx: &mut dyn Transaction, ids: Vec<i32>) -> Result<Vec<i32>, ServiceError> {
    let mut ids = ids;
    ids.sort_unstable();
    ids.dedup();
    for id in &ids {
        require_live_question(tx, *id).await?;
    }
    Ok(ids)
}

fn check_rounds(rounds: i32, cur_round: i32) -> Result<(), ServiceError> {
    if rounds < 1 {
        return Err(ServiceError::InvalidInput("a game needs at least one round".to_string()));
    }
    if !(0..=rounds).contains(&cur_round) {
        return Err(ServiceError::InvalidInput(format!(
            "cur_round must be between 0 and {rounds}"
        )));
    }
    Ok(())
}

#[derive(Default)]
pub struct GameRoomRepository;

#[async_trait]
impl Repository for GameRoomRepository {
    type Entity = GameRoom;
    type Create = GameRoomCreate;
    type Update = GameRoomUpdate;

    const ENTITY: &'static str = "game_room";

    fn key(entity: &GameRoom) -> i32 {
        entity.id
    }

    async fn find(
        &self,
        tx: &mut dyn Transaction,
        id: i32,
        _visibility: Visibility,
    ) -> Result<Option<GameRoom>, ServiceError> {
        Ok(tx.game_room_by_id(id).await?)
    }

    async fn list(
        &self,
        tx: &mut dyn Transaction,
        page: Page,
        _visibility: Visibility,
    ) -> Result<Vec<GameRoom>, ServiceError> {
        Ok(tx.list_game_rooms(page).await?)
    }

    async fn create(&self, tx: &mut dyn Transaction, payload: GameRoomCreate) -> Result<GameRoom, ServiceError> {
        let rounds = payload.rounds.unwrap_or(DEFAULT_ROUNDS);
        check_rounds(rounds, 0)?;
        require_reference(tx, RefTable::GameTypes, payload.game_type_id).await?;
        require_reference(tx, RefTable::GameCategories, payload.game_category_id).await?;
        let question_ids = room_questions(tx, payload.question_ids).await?;

        let room = GameRoom {
            id: 0,
            created_at: Utc::now(),
            rounds,
            cur_round: 0,
            game_type_id: payload.game_type_id,
            game_category_id: payload.game_category_id,
            question_ids,
        };
        Ok(tx.insert_game_room(&room).await?)
    }

    async fn update(
        &self,
        tx: &mut dyn Transaction,
        existing: GameRoom,
        patch: GameRoomUpdate,
    ) -> Result<GameRoom, ServiceError> {
        let question_ids = match patch.question_ids {
            Some(ids) => room_questions(tx, ids).await?,
            None => existing.question_ids.clone(),
        };
        let room = GameRoom {
            rounds: patch.rounds.unwrap_or(existing.rounds),
            cur_round: patch.cur_round.unwrap_or(existing.cur_round),
            question_ids,
            ..existing
        };
        check_rounds(room.rounds, room.cur_round)?;
        Ok(tx.save_game_room(&room).await?)
    }

    async fn delete(&self, tx: &mut dyn Transaction, existing: GameRoom) -> Result<(), ServiceError> {
        removed(tx.delete_game_room(existing.id).await?, Self::ENTITY, existing.id)
    }
}

// --- Rankings ---

async fn collect_scores(tx: &mut dyn Transaction, entries: Vec<ScoreEntry>) -> Result<Vec<PlayerScore>, ServiceError> {
    let mut scores = Vec::with_capacity(entries.len());
    for entry in entries {
        if !entry.points.is_finite() {
            return Err(ServiceError::InvalidInput("points must be a finite number".to_string()));
        }
        if tx.player_by_id(entry.player_id).await?.is_none() {
            return Err(ServiceError::RelationNotFound {
                entity: "player",
                id: entry.player_id,
            });
        }
        scores.push(PlayerScore {
            id: 0,
            points: entry.points,
            player_id: entry.player_id,
            ranking_id: 0,
        });
    }
    Ok(scores)
}

async fn require_room(tx: &mut dyn Transaction, id: i32) -> Result<(), ServiceError> {
    match tx.game_room_by_id(id).await? {
        Some(_) => Ok(()),
        None => Err(ServiceError::RelationNotFound {
            entity: "game_room",
            id,
        }),
    }
}

#[derive(Default)]
pub struct RankingRepository;

#[async_trait]
impl Repository for RankingRepository {
    type Entity = Ranking;
    type Create = RankingCreate;
    type Update = RankingUpdate;

    const ENTITY: &'static str = "ranking";

    fn key(entity: &Ranking) -> i32 {
        entity.id
    }

    async fn find(
        &self,
        tx: &mut dyn Transaction,
        id: i32,
        _visibility: Visibility,
    ) -> Result<Option<Ranking>, ServiceError> {
        Ok(tx.ranking_by_id(id).await?)
    }

    async fn list(
        &self,
        tx: &mut dyn Transaction,
        page: Page,
        _visibility: Visibility,
    ) -> Result<Vec<Ranking>, ServiceError> {
        Ok(tx.list_rankings(page).await?)
    }

    async fn create(&self, tx: &mut dyn Transaction, payload: RankingCreate) -> Result<Ranking, ServiceError> {
        if let Some(room_id) = payload.game_room_id {
            require_room(tx, room_id).await?;
        }
        let ranking = Ranking {
            id: 0,
            game_room_id: payload.game_room_id,
            scores: collect_scores(tx, payload.scores).await?,
        };
        Ok(tx.insert_ranking(&ranking).await?)
    }

    async fn update(
        &self,
        tx: &mut dyn Transaction,
        existing: Ranking,
        patch: RankingUpdate,
    ) -> Result<Ranking, ServiceError> {
        if let Some(room_id) = patch.game_room_id {
            require_room(tx, room_id).await?;
        }
        let scores = match patch.scores {
            Some(entries) => collect_scores(tx, entries).await?,
            None => existing.scores.clone(),
        };
        let ranking = Ranking {
            game_room_id: patch.game_room_id.or(existing.game_room_id),
            scores,
            ..existing
        };
        Ok(tx.save_ranking(&ranking).await?)
    }

    async fn delete(&self, tx: &mut dyn Transaction, existing: Ranking) -> Result<(), ServiceError> {
        removed(tx.delete_ranking(existing.id).await?, Self::ENTITY, existing.id)
    }
}
