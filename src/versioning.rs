//! Versioned questions and answers.
//!
//! Content is never edited in place. A content edit appends a new row whose
//! `prev_version_id` points at the edited one and moves every link (a question's
//! answers, game room memberships, an answer's parent question) onto the new row.
//! Only the `excluded` flag is toggled in place. Deletion is a soft, terminal flag.

use async_trait::async_trait;

use crate::{
    error::ServiceError,
    models::{
        Answer, AnswerCreate, AnswerUpdate, Question, QuestionCreate, QuestionDetail,
        QuestionUpdate, RefTable,
    },
    policy::Visibility,
    repository::{Repository, require_live_question, require_reference, require_user},
    store::{ContentFilter, Page, Transaction},
};

pub const MAX_TEXT_LEN: usize = 250;

fn check_text(text: &str) -> Result<(), ServiceError> {
    let len = text.chars().count();
    if len == 0 || len > MAX_TEXT_LEN {
        return Err(ServiceError::InvalidInput(format!(
            "text must be between 1 and {MAX_TEXT_LEN} characters"
        )));
    }
    Ok(())
}

fn check_editable(deleted: bool, entity: &'static str, id: i32) -> Result<(), ServiceError> {
    if deleted {
        tracing::info!(entity, id, "edit of deleted version rejected");
        return Err(ServiceError::InvalidInput(format!(
            "{entity} {id} is deleted and cannot be edited"
        )));
    }
    Ok(())
}

fn check_head(successor: Option<i32>, entity: &'static str, id: i32) -> Result<(), ServiceError> {
    if let Some(next) = successor {
        tracing::info!(entity, id, next, "edit of superseded version rejected");
        return Err(ServiceError::InvalidInput(format!(
            "{entity} {id} was replaced by version {next}"
        )));
    }
    Ok(())
}

/// Re-reads the row under a lock. Writers of the same version queue here.
async fn locked_question(tx: &mut dyn Transaction, id: i32) -> Result<Question, ServiceError> {
    tx.lock_question(id)
        .await?
        .ok_or(ServiceError::NotFound { entity: "question", id })
}

async fn locked_answer(tx: &mut dyn Transaction, id: i32) -> Result<Answer, ServiceError> {
    tx.lock_answer(id)
        .await?
        .ok_or(ServiceError::NotFound { entity: "answer", id })
}

/// Validates the relations every piece of content carries.
async fn check_relations(
    tx: &mut dyn Transaction,
    game_type_id: i32,
    game_category_id: i32,
) -> Result<(), ServiceError> {
    require_reference(tx, RefTable::GameTypes, game_type_id).await?;
    require_reference(tx, RefTable::QnaCategories, game_category_id).await?;
    Ok(())
}

fn author_of(author_id: Option<i32>) -> Result<i32, ServiceError> {
    author_id.ok_or_else(|| ServiceError::InvalidInput("author_id is required".to_string()))
}

#[derive(Default)]
pub struct QuestionRepository;

impl QuestionRepository {
    /// Attaches the answers currently linked to `question`.
    pub async fn detail(
        &self,
        tx: &mut dyn Transaction,
        question: Question,
        visibility: Visibility,
    ) -> Result<QuestionDetail, ServiceError> {
        let answers = tx
            .answers_of(question.id, visibility.includes_deleted())
            .await?;
        Ok(QuestionDetail { question, answers })
    }

    /// Questions of one game type, each with its answers. The game type itself is a
    /// direct lookup, so a missing one is a `NotFound`.
    pub async fn by_game_type(
        &self,
        tx: &mut dyn Transaction,
        game_type_id: i32,
        page: Page,
        visibility: Visibility,
    ) -> Result<Vec<QuestionDetail>, ServiceError> {
        if tx.reference_by_id(RefTable::GameTypes, game_type_id).await?.is_none() {
            return Err(ServiceError::NotFound {
                entity: RefTable::GameTypes.entity(),
                id: game_type_id,
            });
        }

        let filter = ContentFilter {
            include_deleted: visibility.includes_deleted(),
            game_type_id: Some(game_type_id),
        };
        let questions = tx.list_questions(filter, page).await?;

        let mut details = Vec::with_capacity(questions.len());
        for question in questions {
            details.push(self.detail(tx, question, visibility).await?);
        }
        Ok(details)
    }
}

#[async_trait]
impl Repository for QuestionRepository {
    type Entity = Question;
    type Create = QuestionCreate;
    type Update = QuestionUpdate;

    const ENTITY: &'static str = "question";

    fn key(entity: &Question) -> i32 {
        entity.id
    }

    async fn find(
        &self,
        tx: &mut dyn Transaction,
        id: i32,
        visibility: Visibility,
    ) -> Result<Option<Question>, ServiceError> {
        Ok(tx
            .question_by_id(id)
            .await?
            .filter(|question| visibility.shows(question.deleted)))
    }

    async fn list(
        &self,
        tx: &mut dyn Transaction,
        page: Page,
        visibility: Visibility,
    ) -> Result<Vec<Question>, ServiceError> {
        let filter = ContentFilter {
            include_deleted: visibility.includes_deleted(),
            ..ContentFilter::default()
        };
        Ok(tx.list_questions(filter, page).await?)
    }

    async fn create(&self, tx: &mut dyn Transaction, payload: QuestionCreate) -> Result<Question, ServiceError> {
        check_text(&payload.text)?;
        let author_id = author_of(payload.author_id)?;
        require_user(tx, author_id).await?;
        check_relations(tx, payload.game_type_id, payload.game_category_id).await?;

        let draft = Question {
            id: 0,
            text: payload.text,
            excluded: payload.excluded.unwrap_or(false),
            deleted: false,
            author_id,
            game_type_id: payload.game_type_id,
            game_category_id: payload.game_category_id,
            prev_version_id: None,
        };
        let question = tx.insert_question(&draft).await?;
        tracing::info!(entity = Self::ENTITY, id = question.id, author_id, "created");
        Ok(question)
    }

    /// update
    ///
    /// Content patches fork a new version and re-point the old version's answers and
    /// game room memberships to it. An `excluded`-only patch is applied in place; an
    /// empty one returns `existing` untouched.
    async fn update(
        &self,
        tx: &mut dyn Transaction,
        existing: Question,
        patch: QuestionUpdate,
    ) -> Result<Question, ServiceError> {
        let existing = locked_question(tx, existing.id).await?;
        check_editable(existing.deleted, Self::ENTITY, existing.id)?;

        if !patch.forks() {
            return match patch.excluded {
                Some(excluded) if excluded != existing.excluded => {
                    let toggled = Question {
                        excluded,
                        ..existing
                    };
                    Ok(tx.save_question(&toggled).await?)
                }
                _ => Ok(existing),
            };
        }

        check_head(tx.question_successor(existing.id).await?, Self::ENTITY, existing.id)?;
        if let Some(text) = &patch.text {
            check_text(text)?;
        }
        let game_type_id = patch.game_type_id.unwrap_or(existing.game_type_id);
        let game_category_id = patch.game_category_id.unwrap_or(existing.game_category_id);
        check_relations(tx, game_type_id, game_category_id).await?;

        let draft = Question {
            id: 0,
            text: patch.text.unwrap_or_else(|| existing.text.clone()),
            excluded: patch.excluded.unwrap_or(existing.excluded),
            deleted: false,
            author_id: patch.author_id.unwrap_or(existing.author_id),
            game_type_id,
            game_category_id,
            prev_version_id: Some(existing.id),
        };
        let next = tx.insert_question(&draft).await?;
        let answers = tx.relink_answers(existing.id, next.id).await?;
        let rooms = tx.relink_room_questions(existing.id, next.id).await?;

        tracing::info!(
            entity = Self::ENTITY,
            id = next.id,
            prev_version_id = existing.id,
            answers,
            rooms,
            "new version"
        );
        Ok(next)
    }

    /// Soft-deletes this version and every answer attached to it. Earlier versions
    /// are left alone.
    async fn delete(&self, tx: &mut dyn Transaction, existing: Question) -> Result<(), ServiceError> {
        let existing = locked_question(tx, existing.id).await?;
        if existing.deleted {
            return Ok(());
        }
        let id = existing.id;
        tx.save_question(&Question {
            deleted: true,
            ..existing
        })
        .await?;
        let answers = tx.delete_answers_of(id).await?;
        tracing::info!(entity = Self::ENTITY, id, answers, "soft deleted");
        Ok(())
    }
}

#[derive(Default)]
pub struct AnswerRepository;

#[async_trait]
impl Repository for AnswerRepository {
    type Entity = Answer;
    type Create = AnswerCreate;
    type Update = AnswerUpdate;

    const ENTITY: &'static str = "answer";

    fn key(entity: &Answer) -> i32 {
        entity.id
    }

    async fn find(
        &self,
        tx: &mut dyn Transaction,
        id: i32,
        visibility: Visibility,
    ) -> Result<Option<Answer>, ServiceError> {
        Ok(tx
            .answer_by_id(id)
            .await?
            .filter(|answer| visibility.shows(answer.deleted)))
    }

    async fn list(
        &self,
        tx: &mut dyn Transaction,
        page: Page,
        visibility: Visibility,
    ) -> Result<Vec<Answer>, ServiceError> {
        let filter = ContentFilter {
            include_deleted: visibility.includes_deleted(),
            ..ContentFilter::default()
        };
        Ok(tx.list_answers(filter, page).await?)
    }

    async fn create(&self, tx: &mut dyn Transaction, payload: AnswerCreate) -> Result<Answer, ServiceError> {
        check_text(&payload.text)?;
        let author_id = author_of(payload.author_id)?;
        require_user(tx, author_id).await?;
        check_relations(tx, payload.game_type_id, payload.game_category_id).await?;
        if let Some(question_id) = payload.question_id {
            require_live_question(tx, question_id).await?;
        }

        let draft = Answer {
            id: 0,
            text: payload.text,
            excluded: payload.excluded.unwrap_or(false),
            deleted: false,
            author_id,
            game_type_id: payload.game_type_id,
            game_category_id: payload.game_category_id,
            question_id: payload.question_id,
            prev_version_id: None,
        };
        let answer = tx.insert_answer(&draft).await?;
        tracing::info!(entity = Self::ENTITY, id = answer.id, author_id, "created");
        Ok(answer)
    }

    /// update
    ///
    /// Same policy as questions. On a fork the parent link moves: the new version
    /// takes the (possibly patched) `question_id` and the old version is detached.
    async fn update(
        &self,
        tx: &mut dyn Transaction,
        existing: Answer,
        patch: AnswerUpdate,
    ) -> Result<Answer, ServiceError> {
        // Parent question first, in the same order question writers take their locks.
        if let Some(question_id) = patch.question_id {
            require_live_question(tx, question_id).await?;
        }
        let existing = locked_answer(tx, existing.id).await?;
        check_editable(existing.deleted, Self::ENTITY, existing.id)?;

        if !patch.forks() {
            return match patch.excluded {
                Some(excluded) if excluded != existing.excluded => {
                    let toggled = Answer {
                        excluded,
                        ..existing
                    };
                    Ok(tx.save_answer(&toggled).await?)
                }
                _ => Ok(existing),
            };
        }

        check_head(tx.answer_successor(existing.id).await?, Self::ENTITY, existing.id)?;
        if let Some(text) = &patch.text {
            check_text(text)?;
        }
        let game_type_id = patch.game_type_id.unwrap_or(existing.game_type_id);
        let game_category_id = patch.game_category_id.unwrap_or(existing.game_category_id);
        check_relations(tx, game_type_id, game_category_id).await?;

        let draft = Answer {
            id: 0,
            text: patch.text.unwrap_or_else(|| existing.text.clone()),
            excluded: patch.excluded.unwrap_or(existing.excluded),
            deleted: false,
            author_id: patch.author_id.unwrap_or(existing.author_id),
            game_type_id,
            game_category_id,
            question_id: patch.question_id.or(existing.question_id),
            prev_version_id: Some(existing.id),
        };
        let next = tx.insert_answer(&draft).await?;

        if existing.question_id.is_some() {
            tx.save_answer(&Answer {
                question_id: None,
                ..existing.clone()
            })
            .await?;
        }

        tracing::info!(
            entity = Self::ENTITY,
            id = next.id,
            prev_version_id = existing.id,
            question_id = ?next.question_id,
            "new version"
        );
        Ok(next)
    }

    async fn delete(&self, tx: &mut dyn Transaction, existing: Answer) -> Result<(), ServiceError> {
        let existing = locked_answer(tx, existing.id).await?;
        if existing.deleted {
            return Ok(());
        }
        let id = existing.id;
        tx.save_answer(&Answer {
            deleted: true,
            ..existing
        })
        .await?;
        tracing::info!(entity = Self::ENTITY, id, "soft deleted");
        Ok(())
    }
}
