//! Authorization gates.
//!
//! Requests are checked in a fixed order: token (extractor), scope, active user,
//! operation gate (staff or self-or-staff), then ownership stamping. Each resource
//! declares its gates as data through [`Resource`].

use async_trait::async_trait;

use crate::{
    auth::{AuthUser, Scope},
    error::{AppError, AuthError},
    models::{
        AnswerCreate, AnswerUpdate, GameCategory, GameType, Player, QnACategory, QuestionCreate,
        QuestionUpdate, User,
    },
    repository::{
        EnumRepository, GameRoomRepository, PlayerRepository, RankingRepository, Repository,
    },
    store::Transaction,
    versioning::{AnswerRepository, QuestionRepository},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Any active user.
    Active,
    /// Active staff only.
    Staff,
}

/// Policy
///
/// The scope an operation needs plus the gate guarding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    pub scope: Scope,
    pub gate: Gate,
}

impl Policy {
    pub const fn active(scope: Scope) -> Self {
        Self {
            scope,
            gate: Gate::Active,
        }
    }

    pub const fn staff(scope: Scope) -> Self {
        Self {
            scope,
            gate: Gate::Staff,
        }
    }

    pub fn enforce(&self, caller: &AuthUser) -> Result<(), AuthError> {
        if !caller.has_scope(self.scope) {
            return Err(AuthError::InsufficientScope(self.scope));
        }
        if !caller.user.is_active {
            return Err(AuthError::Inactive);
        }
        if self.gate == Gate::Staff && !caller.user.is_staff {
            tracing::info!(user_id = caller.user.id, "staff gate rejected caller");
            return Err(AuthError::Forbidden);
        }
        Ok(())
    }
}

/// Full identity match: every field of the stored record must agree, so a record
/// changed since the caller authenticated does not count as "self".
pub fn same_identity(caller: &User, target: &User) -> bool {
    caller.id == target.id
        && caller.username == target.username
        && caller.hashed_password == target.hashed_password
        && caller.is_active == target.is_active
        && caller.is_staff == target.is_staff
}

pub fn require_self_or_staff(caller: &User, target: &User) -> Result<(), AuthError> {
    if caller.is_staff || same_identity(caller, target) {
        Ok(())
    } else {
        tracing::info!(user_id = caller.id, target_id = target.id, "self-or-staff gate rejected caller");
        Err(AuthError::Forbidden)
    }
}

/// What a caller may see of soft-deleted content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Staff,
}

impl Visibility {
    pub fn of(user: &User) -> Self {
        if user.is_staff {
            Visibility::Staff
        } else {
            Visibility::Public
        }
    }

    pub fn includes_deleted(self) -> bool {
        self == Visibility::Staff
    }

    pub fn shows(self, deleted: bool) -> bool {
        !deleted || self.includes_deleted()
    }
}

/// Payloads whose author is set by the server.
pub trait Authored {
    fn set_author(&mut self, author_id: i32);
}

impl Authored for QuestionCreate {
    fn set_author(&mut self, author_id: i32) {
        self.author_id = Some(author_id);
    }
}

impl Authored for QuestionUpdate {
    fn set_author(&mut self, author_id: i32) {
        self.author_id = Some(author_id);
    }
}

impl Authored for AnswerCreate {
    fn set_author(&mut self, author_id: i32) {
        self.author_id = Some(author_id);
    }
}

impl Authored for AnswerUpdate {
    fn set_author(&mut self, author_id: i32) {
        self.author_id = Some(author_id);
    }
}

/// Overwrites whatever author the client sent with the caller.
pub fn stamp_author<T: Authored>(caller: &User, payload: &mut T) {
    payload.set_author(caller.id);
}

/// Resource
///
/// A repository exposed over HTTP, with the gate for each operation.
#[async_trait]
pub trait Resource: Repository {
    const READ: Policy = Policy::active(Scope::Read);
    const CREATE: Policy;
    const UPDATE: Policy;
    const DELETE: Policy;

    fn before_create(&self, _caller: &User, _payload: &mut Self::Create) {}

    fn before_update(&self, _caller: &User, _patch: &mut Self::Update) {}

    /// Per-record gate evaluated after the row has been loaded.
    async fn authorize_update(
        &self,
        _tx: &mut dyn Transaction,
        _caller: &AuthUser,
        _existing: &Self::Entity,
    ) -> Result<(), AppError> {
        Ok(())
    }
}

impl Resource for EnumRepository<GameType> {
    const CREATE: Policy = Policy::staff(Scope::Create);
    const UPDATE: Policy = Policy::staff(Scope::Update);
    const DELETE: Policy = Policy::staff(Scope::Delete);
}

impl Resource for EnumRepository<GameCategory> {
    const CREATE: Policy = Policy::staff(Scope::Create);
    const UPDATE: Policy = Policy::staff(Scope::Update);
    const DELETE: Policy = Policy::staff(Scope::Delete);
}

impl Resource for EnumRepository<QnACategory> {
    const CREATE: Policy = Policy::staff(Scope::Create);
    const UPDATE: Policy = Policy::staff(Scope::Update);
    const DELETE: Policy = Policy::staff(Scope::Delete);
}

#[async_trait]
impl Resource for PlayerRepository {
    const CREATE: Policy = Policy::staff(Scope::Create);
    const UPDATE: Policy = Policy::active(Scope::Update);
    const DELETE: Policy = Policy::staff(Scope::Delete);

    async fn authorize_update(
        &self,
        tx: &mut dyn Transaction,
        caller: &AuthUser,
        existing: &Player,
    ) -> Result<(), AppError> {
        if caller.user.is_staff {
            return Ok(());
        }
        let owner = tx.user_by_id(existing.id).await?.ok_or(AuthError::Forbidden)?;
        require_self_or_staff(&caller.user, &owner)?;
        Ok(())
    }
}

impl Resource for QuestionRepository {
    const CREATE: Policy = Policy::active(Scope::Create);
    const UPDATE: Policy = Policy::active(Scope::Update);
    const DELETE: Policy = Policy::active(Scope::Delete);

    fn before_create(&self, caller: &User, payload: &mut QuestionCreate) {
        stamp_author(caller, payload);
    }

    fn before_update(&self, caller: &User, patch: &mut QuestionUpdate) {
        stamp_author(caller, patch);
    }
}

impl Resource for AnswerRepository {
    const CREATE: Policy = Policy::active(Scope::Create);
    const UPDATE: Policy = Policy::active(Scope::Update);
    const DELETE: Policy = Policy::active(Scope::Delete);

    fn before_create(&self, caller: &User, payload: &mut AnswerCreate) {
        stamp_author(caller, payload);
    }

    fn before_update(&self, caller: &User, patch: &mut AnswerUpdate) {
        stamp_author(caller, patch);
    }
}

impl Resource for GameRoomRepository {
    const CREATE: Policy = Policy::active(Scope::Create);
    const UPDATE: Policy = Policy::active(Scope::Update);
    const DELETE: Policy = Policy::staff(Scope::Delete);
}

impl Resource for RankingRepository {
    const CREATE: Policy = Policy::staff(Scope::Create);
    const UPDATE: Policy = Policy::staff(Scope::Update);
    const DELETE: Policy = Policy::staff(Scope::Delete);
}
