//! User accounts: registration, credential checks, profile changes.
//!
//! Passwords only exist in plaintext inside these functions; they are hashed with
//! bcrypt before reaching the store and are never logged.

use crate::{
    auth::{hash_password, verify_password},
    error::ServiceError,
    models::{Player, User, UserCreate, UserUpdate},
    policy::Visibility,
    store::{Page, Store, Transaction},
};

pub const USERNAME_LEN: std::ops::RangeInclusive<usize> = 3..=32;
pub const PASSWORD_LEN: std::ops::RangeInclusive<usize> = 6..=64;

fn check_username(username: &str) -> Result<(), ServiceError> {
    if !USERNAME_LEN.contains(&username.chars().count()) {
        return Err(ServiceError::InvalidInput(format!(
            "username must be between {} and {} characters",
            USERNAME_LEN.start(),
            USERNAME_LEN.end()
        )));
    }
    if username.chars().any(char::is_whitespace) {
        return Err(ServiceError::InvalidInput(
            "username cannot contain whitespace".to_string(),
        ));
    }
    Ok(())
}

fn check_password(password: &str) -> Result<(), ServiceError> {
    if !PASSWORD_LEN.contains(&password.chars().count()) {
        return Err(ServiceError::InvalidInput(format!(
            "password must be between {} and {} characters",
            PASSWORD_LEN.start(),
            PASSWORD_LEN.end()
        )));
    }
    Ok(())
}

/// NewAccount
///
/// A validated registration whose password is already hashed. Built outside any
/// transaction by [`prepare_account`].
#[derive(Debug, Clone)]
pub struct NewAccount {
    username: String,
    hashed_password: String,
}

impl NewAccount {
    pub fn username(&self) -> &str {
        &self.username
    }
}

pub async fn prepare_account(payload: UserCreate, cost: u32) -> Result<NewAccount, ServiceError> {
    check_username(&payload.username)?;
    check_password(&payload.password)?;
    Ok(NewAccount {
        hashed_password: hash_password(&payload.password, cost).await?,
        username: payload.username,
    })
}

/// register
///
/// Creates an active, non-staff user and its player row. Both writes go through `tx`,
/// so a failed player insert leaves no orphaned user once the transaction is dropped.
pub async fn register(tx: &mut dyn Transaction, account: NewAccount) -> Result<User, ServiceError> {
    if tx.user_by_username(&account.username).await?.is_some() {
        tracing::info!(username = %account.username, "registration with taken username");
        return Err(ServiceError::InvalidInput(format!(
            "user {} already exists",
            account.username
        )));
    }

    let draft = User {
        id: 0,
        username: account.username,
        hashed_password: account.hashed_password,
        is_active: true,
        is_staff: false,
    };
    let user = tx.insert_user(&draft).await?;
    tx.insert_player(&Player {
        id: user.id,
        games_played: 0,
        games_won: 0,
    })
    .await?;

    tracing::info!(user_id = user.id, "user registered");
    Ok(user)
}

/// authenticate
///
/// Returns the user when the password matches, `None` otherwise. The lookup
/// transaction is released before the password is verified.
pub async fn authenticate(
    store: &dyn Store,
    username: &str,
    password: &str,
) -> Result<Option<User>, ServiceError> {
    let mut tx = store.begin().await?;
    let found = tx.user_by_username(username).await?;
    drop(tx);

    let Some(user) = found else {
        return Ok(None);
    };
    if verify_password(password, &user.hashed_password).await {
        Ok(Some(user))
    } else {
        Ok(None)
    }
}

/// Inactive accounts are hidden from non-staff callers.
pub async fn find_user(
    tx: &mut dyn Transaction,
    id: i32,
    visibility: Visibility,
) -> Result<User, ServiceError> {
    match tx.user_by_id(id).await? {
        Some(user) if user.is_active || visibility == Visibility::Staff => Ok(user),
        _ => {
            tracing::warn!(entity = "user", id, "record not found");
            Err(ServiceError::NotFound { entity: "user", id })
        }
    }
}

pub async fn list_users(
    tx: &mut dyn Transaction,
    page: Page,
    visibility: Visibility,
) -> Result<Vec<User>, ServiceError> {
    Ok(tx
        .list_users(visibility == Visibility::Staff, page)
        .await?)
}

/// ProfileChange
///
/// A validated [`UserUpdate`] with any new password already hashed.
#[derive(Debug, Clone, Default)]
pub struct ProfileChange {
    username: Option<String>,
    hashed_password: Option<String>,
    is_active: Option<bool>,
    is_staff: Option<bool>,
}

pub async fn prepare_update(patch: UserUpdate, cost: u32) -> Result<ProfileChange, ServiceError> {
    if let Some(username) = &patch.username {
        check_username(username)?;
    }
    let hashed_password = match &patch.password {
        Some(password) => {
            check_password(password)?;
            Some(hash_password(password, cost).await?)
        }
        None => None,
    };
    Ok(ProfileChange {
        username: patch.username,
        hashed_password,
        is_active: patch.is_active,
        is_staff: patch.is_staff,
    })
}

/// update_user
///
/// Applies a prepared profile change. Privilege flags must have been cleared by the
/// caller's gate before reaching here.
pub async fn update_user(
    tx: &mut dyn Transaction,
    existing: User,
    change: ProfileChange,
) -> Result<User, ServiceError> {
    let user = User {
        username: change.username.unwrap_or(existing.username),
        hashed_password: change.hashed_password.unwrap_or(existing.hashed_password),
        is_active: change.is_active.unwrap_or(existing.is_active),
        is_staff: change.is_staff.unwrap_or(existing.is_staff),
        ..existing
    };

    let user = tx.save_user(&user).await?;
    tracing::info!(user_id = user.id, "user updated");
    Ok(user)
}

/// Soft delete: the account stays, but can no longer pass the active gate.
pub async fn deactivate(tx: &mut dyn Transaction, existing: User) -> Result<User, ServiceError> {
    let user = tx
        .save_user(&User {
            is_active: false,
            ..existing
        })
        .await?;
    tracing::info!(user_id = user.id, "user deactivated");
    Ok(user)
}

/// ensure_staff_account
///
/// Creates the bootstrap staff account, or promotes and reactivates an existing
/// user of that name. The stored password is left unchanged for existing users.
pub async fn ensure_staff_account(
    store: &dyn Store,
    username: &str,
    password: &str,
    cost: u32,
) -> Result<User, ServiceError> {
    let mut tx = store.begin().await?;
    if let Some(existing) = tx.user_by_username(username).await? {
        if existing.is_staff && existing.is_active {
            return Ok(existing);
        }
        let user = tx
            .save_user(&User {
                is_staff: true,
                is_active: true,
                ..existing
            })
            .await?;
        tx.commit().await?;
        tracing::info!(user_id = user.id, "promoted bootstrap staff account");
        return Ok(user);
    }
    drop(tx);

    let account = prepare_account(
        UserCreate {
            username: username.to_string(),
            password: password.to_string(),
        },
        cost,
    )
    .await?;

    let mut tx = store.begin().await?;
    let user = register(tx.as_mut(), account).await?;
    let user = tx
        .save_user(&User {
            is_staff: true,
            ..user
        })
        .await?;
    tx.commit().await?;
    tracing::info!(user_id = user.id, "created bootstrap staff account");
    Ok(user)
}
