use party_qna::{
    AppState,
    config::{AppConfig, Env},
    create_router, seed,
    store::{MemoryStore, PostgresStore, StoreState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Entry point: configuration, logging, store, seeding, then the HTTP server.
#[tokio::main]
async fn main() {
    // 1. Environment Loading
    dotenv::dotenv().ok();
    let env = Env::from_env();

    // 2. Logging Filter Setup
    // RUST_LOG wins over the defaults below.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "party_qna=debug,tower_http=info,axum=trace".into());

    // 3. Initialize Logging based on Environment
    match env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    // 3a. Configuration (Fail-Fast). Parse warnings now reach the subscriber.
    let config = AppConfig::load();
    tracing::info!("Application starting in {:?} mode", config.env);

    // 4. Store Initialization
    // Postgres when DATABASE_URL is set (always in production), in-memory otherwise.
    let store: StoreState = match &config.db_url {
        Some(db_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(db_url)
                .await
                .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .expect("FATAL: Failed to run database migrations.");

            Arc::new(PostgresStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    // 5. Seed reference tables and the optional staff account.
    seed(store.as_ref(), &config)
        .await
        .expect("FATAL: Failed to seed the store.");

    // 6. Unified State Assembly
    let port = config.port;
    let app_state = AppState { store, config };

    // 7. Router and Server Startup
    let app = create_router(app_state);

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .expect("FATAL: Failed to bind the HTTP listener.");

    tracing::info!("Listening on {addr}");
    tracing::info!("API Documentation (Swagger UI) available at: http://localhost:{port}/swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly.");
}
