use std::env;

pub const DEFAULT_ACCESS_TOKEN_MINUTES: i64 = 15;
pub const DEFAULT_REFRESH_TOKEN_DAYS: i64 = 7;
pub const DEFAULT_PORT: u16 = 8000;

/// AppConfig
///
/// Holds the application's entire configuration state. Loaded once at startup and
/// shared immutably through the application state via `FromRef`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Runtime environment marker. Controls the dev auth bypass and log format.
    pub env: Env,
    /// Postgres connection string. `None` selects the in-memory store (local only).
    pub db_url: Option<String>,
    /// HS256 signing secret for access and refresh tokens.
    pub jwt_secret: String,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
    /// bcrypt work factor.
    pub bcrypt_cost: u32,
    pub port: u16,
    /// Staff account created at startup when both are set.
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
}

/// Env
///
/// Runtime context: `Local` enables development conveniences (header bypass,
/// in-memory store, pretty logs), `Production` disables them.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

impl Env {
    /// Reads `APP_ENV`. Anything other than `production` is `Local`.
    ///
    /// Needed before logging is set up, so unlike [`AppConfig::load`] it never logs.
    pub fn from_env() -> Self {
        match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        }
    }
}

impl Default for AppConfig {
    /// Safe, non-panicking values for test scaffolding. The bcrypt cost is the
    /// library minimum so hashing stays fast.
    fn default() -> Self {
        Self {
            env: Env::Local,
            db_url: None,
            jwt_secret: "super-secure-test-secret-value-local".to_string(),
            access_token_minutes: DEFAULT_ACCESS_TOKEN_MINUTES,
            refresh_token_days: DEFAULT_REFRESH_TOKEN_DAYS,
            bcrypt_cost: 4,
            port: DEFAULT_PORT,
            admin_username: None,
            admin_password: None,
        }
    }
}

fn parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("{key}={raw} is not valid, using default");
            default
        }),
        Err(_) => default,
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from environment variables and fails fast.
    ///
    /// # Panics
    /// Panics in production when `DATABASE_URL` or `JWT_SECRET` is missing.
    pub fn load() -> Self {
        let env = Env::from_env();

        let (db_url, jwt_secret) = match env {
            Env::Production => (
                Some(env::var("DATABASE_URL").expect("FATAL: DATABASE_URL required in prod")),
                env::var("JWT_SECRET").expect("FATAL: JWT_SECRET must be set in production."),
            ),
            Env::Local => (
                env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
                env::var("JWT_SECRET")
                    .unwrap_or_else(|_| "super-secure-test-secret-value-local".to_string()),
            ),
        };

        Self {
            env,
            db_url,
            jwt_secret,
            access_token_minutes: parsed_or("ACCESS_TOKEN_EXPIRE_MINUTES", DEFAULT_ACCESS_TOKEN_MINUTES),
            refresh_token_days: parsed_or("REFRESH_TOKEN_EXPIRE_DAYS", DEFAULT_REFRESH_TOKEN_DAYS),
            bcrypt_cost: parsed_or("BCRYPT_COST", bcrypt::DEFAULT_COST),
            port: parsed_or("API_PORT", DEFAULT_PORT),
            admin_username: env::var("ADMIN_USERNAME").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
        }
    }
}
