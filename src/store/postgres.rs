use async_trait::async_trait;
use sqlx::{PgPool, Postgres};

use super::{ContentFilter, Page, Store, StoreError, Transaction};
use crate::models::{
    Answer, GameRoom, Player, PlayerScore, Question, Ranking, RefTable, ReferenceRow, User,
};

/// PostgresStore
///
/// The production backend. Each [`Transaction`] wraps one `sqlx` transaction taken
/// from the pool.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new store using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTransaction { tx }))
    }
}

struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

impl PostgresTransaction {
    async fn room_questions(&mut self, room_id: i32) -> Result<Vec<i32>, StoreError> {
        let ids = sqlx::query_scalar::<_, i32>(
            "SELECT question_id FROM game_room_questions WHERE game_room_id = $1 ORDER BY question_id",
        )
        .bind(room_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(ids)
    }

    async fn set_room_questions(&mut self, room_id: i32, question_ids: &[i32]) -> Result<Vec<i32>, StoreError> {
        sqlx::query("DELETE FROM game_room_questions WHERE game_room_id = $1")
            .bind(room_id)
            .execute(&mut *self.tx)
            .await?;
        sqlx::query(
            "INSERT INTO game_room_questions (game_room_id, question_id) SELECT $1, UNNEST($2::INT[])",
        )
        .bind(room_id)
        .bind(question_ids)
        .execute(&mut *self.tx)
        .await?;
        self.room_questions(room_id).await
    }

    async fn ranking_scores(&mut self, ranking_id: i32) -> Result<Vec<PlayerScore>, StoreError> {
        let scores = sqlx::query_as::<_, PlayerScore>(
            "SELECT id, points, player_id, ranking_id FROM player_scores WHERE ranking_id = $1 ORDER BY id",
        )
        .bind(ranking_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(scores)
    }

    async fn set_ranking_scores(&mut self, ranking_id: i32, scores: &[PlayerScore]) -> Result<Vec<PlayerScore>, StoreError> {
        sqlx::query("DELETE FROM player_scores WHERE ranking_id = $1")
            .bind(ranking_id)
            .execute(&mut *self.tx)
            .await?;
        for score in scores {
            sqlx::query("INSERT INTO player_scores (points, player_id, ranking_id) VALUES ($1, $2, $3)")
                .bind(score.points)
                .bind(score.player_id)
                .bind(ranking_id)
                .execute(&mut *self.tx)
                .await?;
        }
        self.ranking_scores(ranking_id).await
    }
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn insert_user(&mut self, user: &User) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, hashed_password, is_active, is_staff)
            VALUES ($1, $2, $3, $4)
            RETURNING id, username, hashed_password, is_active, is_staff
            "#,
        )
        .bind(&user.username)
        .bind(&user.hashed_password)
        .bind(user.is_active)
        .bind(user.is_staff)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(user)
    }

    async fn user_by_id(&mut self, id: i32) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, hashed_password, is_active, is_staff FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(user)
    }

    async fn user_by_username(&mut self, username: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, hashed_password, is_active, is_staff FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(user)
    }

    async fn list_users(&mut self, include_inactive: bool, page: Page) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, hashed_password, is_active, is_staff
            FROM users
            WHERE $1 OR is_active
            ORDER BY id
            OFFSET $2 LIMIT $3
            "#,
        )
        .bind(include_inactive)
        .bind(page.offset())
        .bind(page.limit())
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(users)
    }

    async fn save_user(&mut self, user: &User) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET username = $2, hashed_password = $3, is_active = $4, is_staff = $5
            WHERE id = $1
            RETURNING id, username, hashed_password, is_active, is_staff
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.hashed_password)
        .bind(user.is_active)
        .bind(user.is_staff)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or(StoreError::Missing { table: "users", id: user.id })
    }

    async fn insert_player(&mut self, player: &Player) -> Result<Player, StoreError> {
        let player = sqlx::query_as::<_, Player>(
            r#"
            INSERT INTO players (id, games_played, games_won)
            VALUES ($1, $2, $3)
            RETURNING id, games_played, games_won
            "#,
        )
        .bind(player.id)
        .bind(player.games_played)
        .bind(player.games_won)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(player)
    }

    async fn player_by_id(&mut self, id: i32) -> Result<Option<Player>, StoreError> {
        let player = sqlx::query_as::<_, Player>(
            "SELECT id, games_played, games_won FROM players WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(player)
    }

    async fn list_players(&mut self, page: Page) -> Result<Vec<Player>, StoreError> {
        let players = sqlx::query_as::<_, Player>(
            "SELECT id, games_played, games_won FROM players ORDER BY id OFFSET $1 LIMIT $2",
        )
        .bind(page.offset())
        .bind(page.limit())
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(players)
    }

    async fn save_player(&mut self, player: &Player) -> Result<Player, StoreError> {
        sqlx::query_as::<_, Player>(
            r#"
            UPDATE players SET games_played = $2, games_won = $3
            WHERE id = $1
            RETURNING id, games_played, games_won
            "#,
        )
        .bind(player.id)
        .bind(player.games_played)
        .bind(player.games_won)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or(StoreError::Missing { table: "players", id: player.id })
    }

    async fn delete_player(&mut self, id: i32) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM players WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_reference(&mut self, table: RefTable, name: &str) -> Result<ReferenceRow, StoreError> {
        let sql = format!(
            "INSERT INTO {} (name) VALUES ($1) RETURNING id, name",
            table.table_name()
        );
        let row = sqlx::query_as::<_, ReferenceRow>(&sql)
            .bind(name)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(row)
    }

    async fn reference_by_id(&mut self, table: RefTable, id: i32) -> Result<Option<ReferenceRow>, StoreError> {
        let sql = format!("SELECT id, name FROM {} WHERE id = $1", table.table_name());
        let row = sqlx::query_as::<_, ReferenceRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row)
    }

    async fn reference_by_name(&mut self, table: RefTable, name: &str) -> Result<Option<ReferenceRow>, StoreError> {
        let sql = format!("SELECT id, name FROM {} WHERE name = $1", table.table_name());
        let row = sqlx::query_as::<_, ReferenceRow>(&sql)
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row)
    }

    async fn list_references(&mut self, table: RefTable, page: Page) -> Result<Vec<ReferenceRow>, StoreError> {
        let sql = format!(
            "SELECT id, name FROM {} ORDER BY id OFFSET $1 LIMIT $2",
            table.table_name()
        );
        let rows = sqlx::query_as::<_, ReferenceRow>(&sql)
            .bind(page.offset())
            .bind(page.limit())
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows)
    }

    async fn save_reference(&mut self, table: RefTable, row: &ReferenceRow) -> Result<ReferenceRow, StoreError> {
        let sql = format!(
            "UPDATE {} SET name = $2 WHERE id = $1 RETURNING id, name",
            table.table_name()
        );
        sqlx::query_as::<_, ReferenceRow>(&sql)
            .bind(row.id)
            .bind(&row.name)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or(StoreError::Missing { table: table.table_name(), id: row.id })
    }

    async fn delete_reference(&mut self, table: RefTable, id: i32) -> Result<bool, StoreError> {
        let sql = format!("DELETE FROM {} WHERE id = $1", table.table_name());
        let result = sqlx::query(&sql).bind(id).execute(&mut *self.tx).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_question(&mut self, question: &Question) -> Result<Question, StoreError> {
        let question = sqlx::query_as::<_, Question>(
            r#"
            INSERT INTO questions
                (text, excluded, deleted, author_id, game_type_id, game_category_id, prev_version_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, text, excluded, deleted, author_id, game_type_id, game_category_id, prev_version_id
            "#,
        )
        .bind(&question.text)
        .bind(question.excluded)
        .bind(question.deleted)
        .bind(question.author_id)
        .bind(question.game_type_id)
        .bind(question.game_category_id)
        .bind(question.prev_version_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(question)
    }

    async fn question_by_id(&mut self, id: i32) -> Result<Option<Question>, StoreError> {
        let question = sqlx::query_as::<_, Question>(
            r#"
            SELECT id, text, excluded, deleted, author_id, game_type_id, game_category_id, prev_version_id
            FROM questions WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(question)
    }

    async fn lock_question(&mut self, id: i32) -> Result<Option<Question>, StoreError> {
        let question = sqlx::query_as::<_, Question>(
            r#"
            SELECT id, text, excluded, deleted, author_id, game_type_id, game_category_id, prev_version_id
            FROM questions WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(question)
    }

    async fn question_successor(&mut self, id: i32) -> Result<Option<i32>, StoreError> {
        let next = sqlx::query_scalar::<_, i32>("SELECT id FROM questions WHERE prev_version_id = $1 LIMIT 1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(next)
    }

    async fn list_questions(&mut self, filter: ContentFilter, page: Page) -> Result<Vec<Question>, StoreError> {
        let questions = sqlx::query_as::<_, Question>(
            r#"
            SELECT id, text, excluded, deleted, author_id, game_type_id, game_category_id, prev_version_id
            FROM questions
            WHERE ($1 OR NOT deleted)
              AND ($2::INT IS NULL OR game_type_id = $2)
            ORDER BY excluded, id
            OFFSET $3 LIMIT $4
            "#,
        )
        .bind(filter.include_deleted)
        .bind(filter.game_type_id)
        .bind(page.offset())
        .bind(page.limit())
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(questions)
    }

    async fn save_question(&mut self, question: &Question) -> Result<Question, StoreError> {
        sqlx::query_as::<_, Question>(
            r#"
            UPDATE questions
            SET text = $2, excluded = $3, deleted = $4, author_id = $5,
                game_type_id = $6, game_category_id = $7
            WHERE id = $1
            RETURNING id, text, excluded, deleted, author_id, game_type_id, game_category_id, prev_version_id
            "#,
        )
        .bind(question.id)
        .bind(&question.text)
        .bind(question.excluded)
        .bind(question.deleted)
        .bind(question.author_id)
        .bind(question.game_type_id)
        .bind(question.game_category_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or(StoreError::Missing { table: "questions", id: question.id })
    }

    async fn insert_answer(&mut self, answer: &Answer) -> Result<Answer, StoreError> {
        let answer = sqlx::query_as::<_, Answer>(
            r#"
            INSERT INTO answers
                (text, excluded, deleted, author_id, game_type_id, game_category_id, question_id, prev_version_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, text, excluded, deleted, author_id, game_type_id, game_category_id,
                      question_id, prev_version_id
            "#,
        )
        .bind(&answer.text)
        .bind(answer.excluded)
        .bind(answer.deleted)
        .bind(answer.author_id)
        .bind(answer.game_type_id)
        .bind(answer.game_category_id)
        .bind(answer.question_id)
        .bind(answer.prev_version_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(answer)
    }

    async fn answer_by_id(&mut self, id: i32) -> Result<Option<Answer>, StoreError> {
        let answer = sqlx::query_as::<_, Answer>(
            r#"
            SELECT id, text, excluded, deleted, author_id, game_type_id, game_category_id,
                   question_id, prev_version_id
            FROM answers WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(answer)
    }

    async fn lock_answer(&mut self, id: i32) -> Result<Option<Answer>, StoreError> {
        let answer = sqlx::query_as::<_, Answer>(
            r#"
            SELECT id, text, excluded, deleted, author_id, game_type_id, game_category_id,
                   question_id, prev_version_id
            FROM answers WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(answer)
    }

    async fn answer_successor(&mut self, id: i32) -> Result<Option<i32>, StoreError> {
        let next = sqlx::query_scalar::<_, i32>("SELECT id FROM answers WHERE prev_version_id = $1 LIMIT 1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(next)
    }

    async fn list_answers(&mut self, filter: ContentFilter, page: Page) -> Result<Vec<Answer>, StoreError> {
        let answers = sqlx::query_as::<_, Answer>(
            r#"
            SELECT id, text, excluded, deleted, author_id, game_type_id, game_category_id,
                   question_id, prev_version_id
            FROM answers
            WHERE ($1 OR NOT deleted)
              AND ($2::INT IS NULL OR game_type_id = $2)
            ORDER BY excluded, id
            OFFSET $3 LIMIT $4
            "#,
        )
        .bind(filter.include_deleted)
        .bind(filter.game_type_id)
        .bind(page.offset())
        .bind(page.limit())
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(answers)
    }

    async fn answers_of(&mut self, question_id: i32, include_deleted: bool) -> Result<Vec<Answer>, StoreError> {
        let answers = sqlx::query_as::<_, Answer>(
            r#"
            SELECT id, text, excluded, deleted, author_id, game_type_id, game_category_id,
                   question_id, prev_version_id
            FROM answers
            WHERE question_id = $1 AND ($2 OR NOT deleted)
            ORDER BY excluded, id
            "#,
        )
        .bind(question_id)
        .bind(include_deleted)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(answers)
    }

    async fn save_answer(&mut self, answer: &Answer) -> Result<Answer, StoreError> {
        sqlx::query_as::<_, Answer>(
            r#"
            UPDATE answers
            SET text = $2, excluded = $3, deleted = $4, author_id = $5,
                game_type_id = $6, game_category_id = $7, question_id = $8
            WHERE id = $1
            RETURNING id, text, excluded, deleted, author_id, game_type_id, game_category_id,
                      question_id, prev_version_id
            "#,
        )
        .bind(answer.id)
        .bind(&answer.text)
        .bind(answer.excluded)
        .bind(answer.deleted)
        .bind(answer.author_id)
        .bind(answer.game_type_id)
        .bind(answer.game_category_id)
        .bind(answer.question_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or(StoreError::Missing { table: "answers", id: answer.id })
    }

    async fn relink_answers(&mut self, from: i32, to: i32) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE answers SET question_id = $2 WHERE question_id = $1")
            .bind(from)
            .bind(to)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_answers_of(&mut self, question_id: i32) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE answers SET deleted = true WHERE question_id = $1 AND NOT deleted",
        )
        .bind(question_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn relink_room_questions(&mut self, from: i32, to: i32) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE game_room_questions SET question_id = $2 WHERE question_id = $1")
            .bind(from)
            .bind(to)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_game_room(&mut self, room: &GameRoom) -> Result<GameRoom, StoreError> {
        let mut stored = sqlx::query_as::<_, GameRoom>(
            r#"
            INSERT INTO game_rooms (created_at, rounds, cur_round, game_type_id, game_category_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, created_at, rounds, cur_round, game_type_id, game_category_id
            "#,
        )
        .bind(room.created_at)
        .bind(room.rounds)
        .bind(room.cur_round)
        .bind(room.game_type_id)
        .bind(room.game_category_id)
        .fetch_one(&mut *self.tx)
        .await?;
        stored.question_ids = self.set_room_questions(stored.id, &room.question_ids).await?;
        Ok(stored)
    }

    async fn game_room_by_id(&mut self, id: i32) -> Result<Option<GameRoom>, StoreError> {
        let room = sqlx::query_as::<_, GameRoom>(
            r#"
            SELECT id, created_at, rounds, cur_round, game_type_id, game_category_id
            FROM game_rooms WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        match room {
            Some(mut room) => {
                room.question_ids = self.room_questions(room.id).await?;
                Ok(Some(room))
            }
            None => Ok(None),
        }
    }

    async fn list_game_rooms(&mut self, page: Page) -> Result<Vec<GameRoom>, StoreError> {
        let mut rooms = sqlx::query_as::<_, GameRoom>(
            r#"
            SELECT id, created_at, rounds, cur_round, game_type_id, game_category_id
            FROM game_rooms ORDER BY id OFFSET $1 LIMIT $2
            "#,
        )
        .bind(page.offset())
        .bind(page.limit())
        .fetch_all(&mut *self.tx)
        .await?;
        for room in rooms.iter_mut() {
            room.question_ids = self.room_questions(room.id).await?;
        }
        Ok(rooms)
    }

    async fn save_game_room(&mut self, room: &GameRoom) -> Result<GameRoom, StoreError> {
        let mut stored = sqlx::query_as::<_, GameRoom>(
            r#"
            UPDATE game_rooms SET rounds = $2, cur_round = $3, game_type_id = $4, game_category_id = $5
            WHERE id = $1
            RETURNING id, created_at, rounds, cur_round, game_type_id, game_category_id
            "#,
        )
        .bind(room.id)
        .bind(room.rounds)
        .bind(room.cur_round)
        .bind(room.game_type_id)
        .bind(room.game_category_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or(StoreError::Missing { table: "game_rooms", id: room.id })?;
        stored.question_ids = self.set_room_questions(stored.id, &room.question_ids).await?;
        Ok(stored)
    }

    async fn delete_game_room(&mut self, id: i32) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM game_rooms WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_ranking(&mut self, ranking: &Ranking) -> Result<Ranking, StoreError> {
        let mut stored = sqlx::query_as::<_, Ranking>(
            "INSERT INTO rankings (game_room_id) VALUES ($1) RETURNING id, game_room_id",
        )
        .bind(ranking.game_room_id)
        .fetch_one(&mut *self.tx)
        .await?;
        stored.scores = self.set_ranking_scores(stored.id, &ranking.scores).await?;
        Ok(stored)
    }

    async fn ranking_by_id(&mut self, id: i32) -> Result<Option<Ranking>, StoreError> {
        let ranking = sqlx::query_as::<_, Ranking>(
            "SELECT id, game_room_id FROM rankings WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        match ranking {
            Some(mut ranking) => {
                ranking.scores = self.ranking_scores(ranking.id).await?;
                Ok(Some(ranking))
            }
            None => Ok(None),
        }
    }

    async fn list_rankings(&mut self, page: Page) -> Result<Vec<Ranking>, StoreError> {
        let mut rankings = sqlx::query_as::<_, Ranking>(
            "SELECT id, game_room_id FROM rankings ORDER BY id OFFSET $1 LIMIT $2",
        )
        .bind(page.offset())
        .bind(page.limit())
        .fetch_all(&mut *self.tx)
        .await?;
        for ranking in rankings.iter_mut() {
            ranking.scores = self.ranking_scores(ranking.id).await?;
        }
        Ok(rankings)
    }

    async fn save_ranking(&mut self, ranking: &Ranking) -> Result<Ranking, StoreError> {
        let mut stored = sqlx::query_as::<_, Ranking>(
            "UPDATE rankings SET game_room_id = $2 WHERE id = $1 RETURNING id, game_room_id",
        )
        .bind(ranking.id)
        .bind(ranking.game_room_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or(StoreError::Missing { table: "rankings", id: ranking.id })?;
        stored.scores = self.set_ranking_scores(stored.id, &ranking.scores).await?;
        Ok(stored)
    }

    async fn delete_ranking(&mut self, id: i32) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM rankings WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
