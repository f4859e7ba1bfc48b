//! Seeds the database: admin account, profile name and starter quotes.
//!
//! Usage: ADMIN_EMAIL=... ADMIN_PASSWORD=... [ADMIN_NAME=...] cargo run --bin seed

use bcrypt::{hash, DEFAULT_COST};
use folio_api::db;
use sqlx::PgPool;

const STARTER_QUOTES: &[(&str, &str)] = &[
    ("The only way to do great work is to love what you do.", "Steve Jobs"),
    ("Simplicity is the soul of efficiency.", "Austin Freeman"),
    ("Programs must be written for people to read.", "Harold Abelson"),
    ("Premature optimization is the root of all evil.", "Donald Knuth"),
    ("Code is like humor. When you have to explain it, it’s bad.", "Cory House"),
    ("Make it work, make it right, make it fast.", "Kent Beck"),
    ("Talk is cheap. Show me the code.", "Linus Torvalds"),
    ("First, solve the problem. Then, write the code.", "John Johnson"),
    ("Experience is the name everyone gives to their mistakes.", "Oscar Wilde"),
    ("Simplicity is the ultimate sophistication.", "Leonardo da Vinci"),
];

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

async fn seed_admin(pool: &PgPool) -> Result<(), Box<dyn std::error::Error>> {
    let (Some(email), Some(password)) = (env_var("ADMIN_EMAIL"), env_var("ADMIN_PASSWORD")) else {
        tracing::warn!("ADMIN_EMAIL and ADMIN_PASSWORD are required to seed admin. Skipping.");
        return Ok(());
    };

    let password_hash = tokio::task::spawn_blocking(move || hash(password, DEFAULT_COST)).await??;

    sqlx::query(
        r#"
        INSERT INTO users (email, password_hash, role)
        VALUES ($1, $2, 'admin')
        ON CONFLICT (email) DO UPDATE SET password_hash = EXCLUDED.password_hash, role = 'admin'
        "#,
    )
    .bind(&email)
    .bind(&password_hash)
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO profile (id, display_name) VALUES (1, $1)
        ON CONFLICT (id) DO UPDATE SET display_name = EXCLUDED.display_name
        "#,
    )
    .bind(env_var("ADMIN_NAME"))
    .execute(pool)
    .await?;

    tracing::info!("Admin user upserted: {}", email);
    Ok(())
}

async fn seed_quotes(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let mut inserted = 0;
    for (text, author) in STARTER_QUOTES {
        inserted += sqlx::query(
            "INSERT INTO quotes (text, author) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(*text)
        .bind(*author)
        .execute(pool)
        .await?
        .rows_affected();
    }
    Ok(inserted)
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if env_var("DATABASE_URL").is_none() {
        eprintln!("DATABASE_URL must be set to seed the database");
        std::process::exit(1);
    }

    let pool = match db::init_pool(None).await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = db::run_migrations(&pool).await {
        eprintln!("Failed to run migrations: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = seed_admin(&pool).await {
        eprintln!("Failed to seed admin: {}", e);
        std::process::exit(1);
    }

    match seed_quotes(&pool).await {
        Ok(n) => tracing::info!("Quotes inserted: {} (duplicates ignored)", n),
        Err(e) => {
            eprintln!("Failed to seed quotes: {}", e);
            std::process::exit(1);
        }
    }

    pool.close().await;
    tracing::info!("Seeding done");
}
