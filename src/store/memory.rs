use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{ContentFilter, Page, Store, StoreError, Transaction};
use crate::models::{
    Answer, GameRoom, Player, PlayerScore, Question, Ranking, RefTable, ReferenceRow, User,
};

/// Rows with a store-assigned integer key.
trait Keyed: Clone {
    fn key(&self) -> i32;
    fn set_key(&mut self, id: i32);
}

macro_rules! keyed {
    ($($ty:ty),+) => {
        $(impl Keyed for $ty {
            fn key(&self) -> i32 {
                self.id
            }
            fn set_key(&mut self, id: i32) {
                self.id = id;
            }
        })+
    };
}

keyed!(User, ReferenceRow, Question, Answer, GameRoom, Ranking);

/// Table
///
/// Arena of rows plus an id index. Ids are never reused, so a new row always has
/// a larger id than every row before it.
#[derive(Debug, Clone)]
struct Table<T> {
    rows: Vec<T>,
    index: HashMap<i32, usize>,
    next_id: i32,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            index: HashMap::new(),
            next_id: 1,
        }
    }
}

impl<T: Keyed> Table<T> {
    fn insert(&mut self, mut row: T) -> T {
        let id = self.next_id;
        self.next_id += 1;
        row.set_key(id);
        self.index.insert(id, self.rows.len());
        self.rows.push(row.clone());
        row
    }

    fn get(&self, id: i32) -> Option<&T> {
        self.index.get(&id).map(|&slot| &self.rows[slot])
    }

    fn replace(&mut self, row: &T) -> Option<T> {
        let slot = *self.index.get(&row.key())?;
        self.rows[slot] = row.clone();
        Some(row.clone())
    }

    fn remove(&mut self, id: i32) -> bool {
        let Some(slot) = self.index.remove(&id) else {
            return false;
        };
        self.rows.swap_remove(slot);
        if let Some(moved) = self.rows.get(slot) {
            self.index.insert(moved.key(), slot);
        }
        true
    }

    fn iter(&self) -> impl Iterator<Item = &T> {
        self.rows.iter()
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.rows.iter_mut()
    }

    /// Rows sorted by id.
    fn sorted(&self) -> Vec<T> {
        let mut rows = self.rows.clone();
        rows.sort_by_key(|row| row.key());
        rows
    }
}

fn paginate<T>(rows: Vec<T>, page: Page) -> Vec<T> {
    let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    let limit = usize::try_from(page.limit()).unwrap_or(usize::MAX);
    rows.into_iter().skip(offset).take(limit).collect()
}

fn missing(table: &'static str, id: i32) -> StoreError {
    StoreError::Missing { table, id }
}

#[derive(Debug, Clone, Default)]
struct Tables {
    users: Table<User>,
    players: BTreeMap<i32, Player>,
    references: HashMap<RefTable, Table<ReferenceRow>>,
    questions: Table<Question>,
    answers: Table<Answer>,
    game_rooms: Table<GameRoom>,
    rankings: Table<Ranking>,
    next_score_id: i32,
}

impl Tables {
    fn references(&mut self, table: RefTable) -> &mut Table<ReferenceRow> {
        self.references.entry(table).or_default()
    }

    fn reference_in_use(&self, table: RefTable, id: i32) -> bool {
        match table {
            RefTable::GameTypes => {
                self.questions.iter().any(|q| q.game_type_id == id)
                    || self.answers.iter().any(|a| a.game_type_id == id)
                    || self.game_rooms.iter().any(|r| r.game_type_id == id)
            }
            RefTable::QnaCategories => {
                self.questions.iter().any(|q| q.game_category_id == id)
                    || self.answers.iter().any(|a| a.game_category_id == id)
            }
            RefTable::GameCategories => self.game_rooms.iter().any(|r| r.game_category_id == id),
        }
    }

    fn assign_scores(&mut self, ranking_id: i32, scores: &[PlayerScore]) -> Vec<PlayerScore> {
        scores
            .iter()
            .map(|score| {
                self.next_score_id += 1;
                PlayerScore {
                    id: self.next_score_id,
                    ranking_id,
                    ..score.clone()
                }
            })
            .collect()
    }
}

/// MemoryStore
///
/// Process-local store used for local development and tests. Transactions are
/// serialized: one transaction owns the tables until it is committed or dropped.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
        let guard = self.tables.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, work }))
    }
}

/// Writes go to `work`; commit copies it back under the held lock.
struct MemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    work: Tables,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn insert_user(&mut self, user: &User) -> Result<User, StoreError> {
        if self.work.users.iter().any(|u| u.username == user.username) {
            return Err(StoreError::Conflict(format!(
                "username {} already exists",
                user.username
            )));
        }
        Ok(self.work.users.insert(user.clone()))
    }

    async fn user_by_id(&mut self, id: i32) -> Result<Option<User>, StoreError> {
        Ok(self.work.users.get(id).cloned())
    }

    async fn user_by_username(&mut self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self.work.users.iter().find(|u| u.username == username).cloned())
    }

    async fn list_users(&mut self, include_inactive: bool, page: Page) -> Result<Vec<User>, StoreError> {
        let users = self
            .work
            .users
            .sorted()
            .into_iter()
            .filter(|u| include_inactive || u.is_active)
            .collect();
        Ok(paginate(users, page))
    }

    async fn save_user(&mut self, user: &User) -> Result<User, StoreError> {
        if self
            .work
            .users
            .iter()
            .any(|u| u.id != user.id && u.username == user.username)
        {
            return Err(StoreError::Conflict(format!(
                "username {} already exists",
                user.username
            )));
        }
        self.work.users.replace(user).ok_or_else(|| missing("users", user.id))
    }

    async fn insert_player(&mut self, player: &Player) -> Result<Player, StoreError> {
        if self.work.users.get(player.id).is_none() {
            return Err(StoreError::Conflict(format!("user {} does not exist", player.id)));
        }
        if self.work.players.contains_key(&player.id) {
            return Err(StoreError::Conflict(format!("player {} already exists", player.id)));
        }
        self.work.players.insert(player.id, player.clone());
        Ok(player.clone())
    }

    async fn player_by_id(&mut self, id: i32) -> Result<Option<Player>, StoreError> {
        Ok(self.work.players.get(&id).cloned())
    }

    async fn list_players(&mut self, page: Page) -> Result<Vec<Player>, StoreError> {
        Ok(paginate(self.work.players.values().cloned().collect(), page))
    }

    async fn save_player(&mut self, player: &Player) -> Result<Player, StoreError> {
        let slot = self
            .work
            .players
            .get_mut(&player.id)
            .ok_or_else(|| missing("players", player.id))?;
        *slot = player.clone();
        Ok(player.clone())
    }

    async fn delete_player(&mut self, id: i32) -> Result<bool, StoreError> {
        let scored = self
            .work
            .rankings
            .iter()
            .any(|r| r.scores.iter().any(|s| s.player_id == id));
        if scored {
            return Err(StoreError::Conflict(format!("player {id} is referenced by a ranking")));
        }
        Ok(self.work.players.remove(&id).is_some())
    }

    async fn insert_reference(&mut self, table: RefTable, name: &str) -> Result<ReferenceRow, StoreError> {
        let rows = self.work.references(table);
        if rows.iter().any(|r| r.name == name) {
            return Err(StoreError::Conflict(format!(
                "{} {name} already exists",
                table.entity()
            )));
        }
        Ok(rows.insert(ReferenceRow {
            id: 0,
            name: name.to_string(),
        }))
    }

    async fn reference_by_id(&mut self, table: RefTable, id: i32) -> Result<Option<ReferenceRow>, StoreError> {
        Ok(self.work.references(table).get(id).cloned())
    }

    async fn reference_by_name(&mut self, table: RefTable, name: &str) -> Result<Option<ReferenceRow>, StoreError> {
        Ok(self
            .work
            .references(table)
            .iter()
            .find(|r| r.name == name)
            .cloned())
    }

    async fn list_references(&mut self, table: RefTable, page: Page) -> Result<Vec<ReferenceRow>, StoreError> {
        Ok(paginate(self.work.references(table).sorted(), page))
    }

    async fn save_reference(&mut self, table: RefTable, row: &ReferenceRow) -> Result<ReferenceRow, StoreError> {
        let rows = self.work.references(table);
        if rows.iter().any(|r| r.id != row.id && r.name == row.name) {
            return Err(StoreError::Conflict(format!(
                "{} {} already exists",
                table.entity(),
                row.name
            )));
        }
        rows.replace(row).ok_or_else(|| missing(table.table_name(), row.id))
    }

    async fn delete_reference(&mut self, table: RefTable, id: i32) -> Result<bool, StoreError> {
        if self.work.reference_in_use(table, id) {
            return Err(StoreError::Conflict(format!(
                "{} {id} is still referenced",
                table.entity()
            )));
        }
        Ok(self.work.references(table).remove(id))
    }

    async fn insert_question(&mut self, question: &Question) -> Result<Question, StoreError> {
        Ok(self.work.questions.insert(question.clone()))
    }

    async fn question_by_id(&mut self, id: i32) -> Result<Option<Question>, StoreError> {
        Ok(self.work.questions.get(id).cloned())
    }

    // Transactions already hold the whole store.
    async fn lock_question(&mut self, id: i32) -> Result<Option<Question>, StoreError> {
        self.question_by_id(id).await
    }

    async fn question_successor(&mut self, id: i32) -> Result<Option<i32>, StoreError> {
        Ok(self
            .work
            .questions
            .iter()
            .find(|q| q.prev_version_id == Some(id))
            .map(|q| q.id))
    }

    async fn list_questions(&mut self, filter: ContentFilter, page: Page) -> Result<Vec<Question>, StoreError> {
        let mut questions: Vec<Question> = self
            .work
            .questions
            .iter()
            .filter(|q| filter.include_deleted || !q.deleted)
            .filter(|q| filter.game_type_id.is_none_or(|id| q.game_type_id == id))
            .cloned()
            .collect();
        questions.sort_by_key(|q| (q.excluded, q.id));
        Ok(paginate(questions, page))
    }

    async fn save_question(&mut self, question: &Question) -> Result<Question, StoreError> {
        self.work
            .questions
            .replace(question)
            .ok_or_else(|| missing("questions", question.id))
    }

    async fn insert_answer(&mut self, answer: &Answer) -> Result<Answer, StoreError> {
        Ok(self.work.answers.insert(answer.clone()))
    }

    async fn answer_by_id(&mut self, id: i32) -> Result<Option<Answer>, StoreError> {
        Ok(self.work.answers.get(id).cloned())
    }

    async fn lock_answer(&mut self, id: i32) -> Result<Option<Answer>, StoreError> {
        self.answer_by_id(id).await
    }

    async fn answer_successor(&mut self, id: i32) -> Result<Option<i32>, StoreError> {
        Ok(self
            .work
            .answers
            .iter()
            .find(|a| a.prev_version_id == Some(id))
            .map(|a| a.id))
    }

    async fn list_answers(&mut self, filter: ContentFilter, page: Page) -> Result<Vec<Answer>, StoreError> {
        let mut answers: Vec<Answer> = self
            .work
            .answers
            .iter()
            .filter(|a| filter.include_deleted || !a.deleted)
            .filter(|a| filter.game_type_id.is_none_or(|id| a.game_type_id == id))
            .cloned()
            .collect();
        answers.sort_by_key(|a| (a.excluded, a.id));
        Ok(paginate(answers, page))
    }

    async fn save_answer(&mut self, answer: &Answer) -> Result<Answer, StoreError> {
        self.work
            .answers
            .replace(answer)
            .ok_or_else(|| missing("answers", answer.id))
    }

    async fn answers_of(&mut self, question_id: i32, include_deleted: bool) -> Result<Vec<Answer>, StoreError> {
        let mut answers: Vec<Answer> = self
            .work
            .answers
            .iter()
            .filter(|a| a.question_id == Some(question_id))
            .filter(|a| include_deleted || !a.deleted)
            .cloned()
            .collect();
        answers.sort_by_key(|a| (a.excluded, a.id));
        Ok(answers)
    }

    async fn relink_answers(&mut self, from: i32, to: i32) -> Result<u64, StoreError> {
        let mut moved = 0;
        for answer in self.work.answers.iter_mut() {
            if answer.question_id == Some(from) {
                answer.question_id = Some(to);
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn delete_answers_of(&mut self, question_id: i32) -> Result<u64, StoreError> {
        let mut deleted = 0;
        for answer in self.work.answers.iter_mut() {
            if answer.question_id == Some(question_id) && !answer.deleted {
                answer.deleted = true;
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn relink_room_questions(&mut self, from: i32, to: i32) -> Result<u64, StoreError> {
        let mut moved = 0;
        for room in self.work.game_rooms.iter_mut() {
            if let Some(slot) = room.question_ids.iter_mut().find(|id| **id == from) {
                *slot = to;
                room.question_ids.sort_unstable();
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn insert_game_room(&mut self, room: &GameRoom) -> Result<GameRoom, StoreError> {
        Ok(self.work.game_rooms.insert(room.clone()))
    }

    async fn game_room_by_id(&mut self, id: i32) -> Result<Option<GameRoom>, StoreError> {
        Ok(self.work.game_rooms.get(id).cloned())
    }

    async fn list_game_rooms(&mut self, page: Page) -> Result<Vec<GameRoom>, StoreError> {
        Ok(paginate(self.work.game_rooms.sorted(), page))
    }

    async fn save_game_room(&mut self, room: &GameRoom) -> Result<GameRoom, StoreError> {
        self.work
            .game_rooms
            .replace(room)
            .ok_or_else(|| missing("game_rooms", room.id))
    }

    async fn delete_game_room(&mut self, id: i32) -> Result<bool, StoreError> {
        if self.work.rankings.iter().any(|r| r.game_room_id == Some(id)) {
            return Err(StoreError::Conflict(format!(
                "game room {id} is referenced by a ranking"
            )));
        }
        Ok(self.work.game_rooms.remove(id))
    }

    async fn insert_ranking(&mut self, ranking: &Ranking) -> Result<Ranking, StoreError> {
        let mut stored = self.work.rankings.insert(Ranking {
            scores: Vec::new(),
            ..ranking.clone()
        });
        stored.scores = self.work.assign_scores(stored.id, &ranking.scores);
        self.work
            .rankings
            .replace(&stored)
            .ok_or_else(|| missing("rankings", stored.id))
    }

    async fn ranking_by_id(&mut self, id: i32) -> Result<Option<Ranking>, StoreError> {
        Ok(self.work.rankings.get(id).cloned())
    }

    async fn list_rankings(&mut self, page: Page) -> Result<Vec<Ranking>, StoreError> {
        Ok(paginate(self.work.rankings.sorted(), page))
    }

    async fn save_ranking(&mut self, ranking: &Ranking) -> Result<Ranking, StoreError> {
        let stored = Ranking {
            scores: self.work.assign_scores(ranking.id, &ranking.scores),
            ..ranking.clone()
        };
        self.work
            .rankings
            .replace(&stored)
            .ok_or_else(|| missing("rankings", ranking.id))
    }

    async fn delete_ranking(&mut self, id: i32) -> Result<bool, StoreError> {
        Ok(self.work.rankings.remove(id))
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }
}
