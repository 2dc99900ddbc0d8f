use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::{AppError, AuthError, ServiceError},
    models::User,
    store::StoreState,
};

/// Scope
///
/// A permission unit carried by an access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Scope {
    Me,
    Read,
    Create,
    Update,
    Delete,
}

impl Scope {
    pub const ALL: [Scope; 5] = [
        Scope::Me,
        Scope::Read,
        Scope::Create,
        Scope::Update,
        Scope::Delete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Me => "me",
            Scope::Read => "read",
            Scope::Create => "create",
            Scope::Update => "update",
            Scope::Delete => "delete",
        }
    }

    pub fn parse(value: &str) -> Option<Scope> {
        Scope::ALL.into_iter().find(|scope| scope.as_str() == value)
    }

    /// Parses a space separated scope list. An absent or blank list grants every scope.
    pub fn parse_list(raw: Option<&str>) -> Result<Vec<Scope>, ServiceError> {
        let Some(raw) = raw.filter(|raw| !raw.trim().is_empty()) else {
            return Ok(Scope::ALL.to_vec());
        };
        let mut scopes = Vec::new();
        for item in raw.split_whitespace() {
            let scope = Scope::parse(item)
                .ok_or_else(|| ServiceError::InvalidInput(format!("unknown scope {item}")))?;
            if !scopes.contains(&scope) {
                scopes.push(scope);
            }
        }
        Ok(scopes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims
///
/// Payload of every token issued by this service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the username.
    pub sub: String,
    /// Expiration Time (exp).
    pub exp: usize,
    /// Issued At (iat).
    pub iat: usize,
    pub scopes: Vec<Scope>,
    pub token_type: TokenKind,
    /// Unique token id, keeps two tokens issued in the same second distinct.
    pub jti: Uuid,
}

/// Token validation failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed or its signature is invalid")]
    Malformed,
    #[error("token has expired")]
    Expired,
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed => AuthError::MalformedToken,
            TokenError::Expired => AuthError::ExpiredToken,
        }
    }
}

/// issue_token
///
/// Signs an HS256 token for `user` valid for `ttl`.
pub fn issue_token(
    secret: &str,
    user: &User,
    kind: TokenKind,
    ttl: Duration,
    scopes: &[Scope],
) -> Result<String, ServiceError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user.username.clone(),
        iat: now.timestamp().max(0) as usize,
        exp: (now + ttl).timestamp().max(0) as usize,
        scopes: scopes.to_vec(),
        token_type: kind,
        jti: Uuid::new_v4(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| {
        tracing::error!("token signing failed: {:?}", e);
        ServiceError::Internal("could not issue token".to_string())
    })
}

/// verify_token
///
/// Checks signature, expiry and token kind. Expiry is reported separately from every
/// other failure.
pub fn verify_token(secret: &str, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.leeway = 0;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Malformed,
    })?;

    if data.claims.token_type != kind {
        return Err(TokenError::Malformed);
    }
    Ok(data.claims)
}

/// hash_password
///
/// Runs on the blocking pool. Call it before opening a transaction.
pub async fn hash_password(password: &str, cost: u32) -> Result<String, ServiceError> {
    let password = password.to_string();
    task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| ServiceError::Internal(format!("hashing task failed: {e}")))?
        .map_err(|e| {
            tracing::error!("password hashing failed: {:?}", e);
            ServiceError::Internal("could not hash password".to_string())
        })
}

/// Unreadable hashes count as a mismatch.
pub async fn verify_password(password: &str, hashed: &str) -> bool {
    let (password, hashed) = (password.to_string(), hashed.to_string());
    match task::spawn_blocking(move || bcrypt::verify(password, &hashed)).await {
        Ok(Ok(matches)) => matches,
        Ok(Err(e)) => {
            tracing::warn!("stored password hash is unreadable: {:?}", e);
            false
        }
        Err(e) => {
            tracing::error!("password verification task failed: {:?}", e);
            false
        }
    }
}

/// AuthUser
///
/// The resolved identity of an authenticated request together with the scopes its
/// token grants. Gates are applied afterwards by [`crate::policy`]; an inactive user
/// still resolves here.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub scopes: Vec<Scope>,
}

impl AuthUser {
    pub fn has_scope(&self, scope: Scope) -> bool {
        self.scopes.contains(&scope)
    }
}

/// AuthUser Extractor Implementation
///
/// 1. Local bypass: in `Env::Local`, an `x-user-id` header naming an existing user
///    authenticates with every scope.
/// 2. Bearer token extraction and access-token validation.
/// 3. Store lookup of the subject, so tokens of renamed users stop working.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    StoreState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let store = StoreState::from_ref(state);
        let config = AppConfig::from_ref(state);

        if config.env == Env::Local {
            let bypass_id = parts
                .headers
                .get("x-user-id")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<i32>().ok());
            if let Some(user_id) = bypass_id {
                let mut tx = store.begin().await?;
                if let Some(user) = tx.user_by_id(user_id).await? {
                    tracing::debug!(user_id, "authenticated through local bypass");
                    return Ok(AuthUser {
                        user,
                        scopes: Scope::ALL.to_vec(),
                    });
                }
            }
        }

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(AuthError::MissingCredentials)?;

        let claims = verify_token(&config.jwt_secret, token, TokenKind::Access)
            .map_err(AuthError::from)?;

        let mut tx = store.begin().await?;
        let user = tx
            .user_by_username(&claims.sub)
            .await?
            .ok_or(AuthError::UnknownUser)?;

        Ok(AuthUser {
            user,
            scopes: claims.scopes,
        })
    }
}
