pub mod models;

use chrono::NaiveDate;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::error::{ApiError, ApiResult};

static DB_POOL: OnceCell<Arc<PgPool>> = OnceCell::const_new();

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/portfolio".to_string()),
            max_connections: std::env::var("DB_POOL_MAX")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            min_connections: std::env::var("DB_POOL_MIN")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1),
            connect_timeout_secs: std::env::var("DB_CONNECT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            idle_timeout_secs: std::env::var("DB_IDLE_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(300),
        }
    }
}

pub async fn init_pool(config: Option<DbConfig>) -> Result<Arc<PgPool>, sqlx::Error> {
    let config = config.unwrap_or_default();

    tracing::info!("Initializing database connection pool...");

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(std::time::Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(std::time::Duration::from_secs(config.idle_timeout_secs))
        .max_lifetime(std::time::Duration::from_secs(1800))
        .test_before_acquire(true)
        .connect(&config.url)
        .await?;

    sqlx::query("SELECT 1").fetch_one(&pool).await?;

    tracing::info!("Database connection pool initialized successfully");

    let pool = Arc::new(pool);
    let _ = DB_POOL.set(pool.clone());

    Ok(pool)
}

pub fn get_pool() -> Option<Arc<PgPool>> {
    DB_POOL.get().cloned()
}

/// Pool for a handler, or 503 when the server runs without a database.
pub fn pool() -> ApiResult<Arc<PgPool>> {
    get_pool().ok_or(ApiError::DatabaseUnavailable)
}

pub async fn health_check() -> Result<std::time::Duration, sqlx::Error> {
    let pool = get_pool()
        .ok_or_else(|| sqlx::Error::Configuration("Database pool not initialized".into()))?;

    let start = std::time::Instant::now();
    sqlx::query("SELECT 1").fetch_one(pool.as_ref()).await?;

    Ok(start.elapsed())
}

/// Marks a calendar day active, creating the row when needed.
pub async fn mark_active(pool: &PgPool, date: NaiveDate) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO activity (date, active)
        VALUES ($1, TRUE)
        ON CONFLICT (date) DO UPDATE SET active = TRUE
        "#,
    )
    .bind(date)
    .execute(pool)
    .await?;
    Ok(())
}

/// Schema statements, applied in order. Each one is idempotent.
const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        email TEXT UNIQUE NOT NULL,
        password_hash TEXT NOT NULL,
        role TEXT NOT NULL DEFAULT 'guest',
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS profile (
        id INTEGER PRIMARY KEY DEFAULT 1 CHECK (id = 1),
        display_name TEXT,
        title TEXT,
        bio TEXT,
        avatar_url TEXT,
        social_links JSONB NOT NULL DEFAULT '{}'::jsonb,
        education TEXT,
        expertise TEXT,
        profile_summary TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cv (
        id INTEGER PRIMARY KEY DEFAULT 1 CHECK (id = 1),
        summary TEXT,
        education JSONB NOT NULL DEFAULT '{}'::jsonb,
        experience JSONB NOT NULL DEFAULT '{}'::jsonb,
        skills JSONB NOT NULL DEFAULT '{}'::jsonb,
        certifications JSONB NOT NULL DEFAULT '{}'::jsonb,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS projects (
        id BIGSERIAL PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT,
        tags TEXT[] NOT NULL DEFAULT '{}',
        repo_url TEXT,
        demo_url TEXT,
        image_url TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS blogs (
        id BIGSERIAL PRIMARY KEY,
        title TEXT NOT NULL,
        slug TEXT UNIQUE NOT NULL,
        content_md TEXT NOT NULL DEFAULT '',
        published BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_blogs_pub_created ON blogs(published, created_at DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS comments (
        id BIGSERIAL PRIMARY KEY,
        blog_id BIGINT NOT NULL REFERENCES blogs(id) ON DELETE CASCADE,
        author_name TEXT NOT NULL DEFAULT 'guest',
        body TEXT NOT NULL,
        image_url TEXT,
        approved BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_comments_blog ON comments(blog_id, created_at)",
    r#"
    CREATE TABLE IF NOT EXISTS comment_reactions (
        comment_id BIGINT NOT NULL REFERENCES comments(id) ON DELETE CASCADE,
        type TEXT NOT NULL,
        count BIGINT NOT NULL DEFAULT 0,
        PRIMARY KEY (comment_id, type)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS events (
        id BIGSERIAL PRIMARY KEY,
        title TEXT NOT NULL,
        start_at TIMESTAMPTZ NOT NULL,
        end_at TIMESTAMPTZ,
        ref_type TEXT,
        ref_id BIGINT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS activity (
        date DATE PRIMARY KEY,
        active BOOLEAN NOT NULL DEFAULT FALSE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS quotes (
        id BIGSERIAL PRIMARY KEY,
        text TEXT NOT NULL UNIQUE,
        author TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS visitors_counter (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        total BIGINT NOT NULL DEFAULT 0
    )
    "#,
];

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("Running database migrations...");

    for statement in MIGRATIONS {
        sqlx::query(statement).execute(pool).await?;
    }

    tracing::info!(
        count = MIGRATIONS.len(),
        "Database migrations completed successfully"
    );

    Ok(())
}
