//! Development seed: populates a fresh database with the
//! built-in security tests and a sample repository.
//!
//! Usage: `cargo run --bin seed`
//!
//! Requires the `DATABASE_URL` environment variable (reads .env).

use scanforge::db::{self, PgStore};
use scanforge::models::repository::CreateRepository;
use scanforge::services::{defaults, registration};

const SAMPLE_REPOSITORIES: &[(&str, &[&str])] = &[
    ("https://github.com/globocom/huskyCI.git", &[]),
    ("https://github.com/PyCQA/bandit.git", &["bandit", "safety"]),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let db_url = std::env::var("DATABASE_URL")?;
    let pool = db::create_pool(&db_url, 5).await?;

    // Run migrations first
    sqlx::migrate!("./migrations").run(&pool).await?;

    println!("=== scanforge Seed Script ===");

    let store = PgStore::new(pool.clone());

    let inserted = defaults::ensure_defaults(&store).await?;
    if inserted > 0 {
        println!("[done] Inserted {inserted} default security tests");
    } else {
        println!("[skip] Default security tests already exist");
    }

    for (url, tests) in SAMPLE_REPOSITORIES {
        let input = CreateRepository {
            url: url.to_string(),
            vm: None,
            security_test_names: tests.iter().map(|t| t.to_string()).collect(),
        };
        match registration::register_repository(&store, input).await {
            Ok(repository) => println!(
                "[done] Registered {} with {} security tests",
                repository.url,
                repository.security_tests.len()
            ),
            Err(e) if e.is_conflict() => println!("[skip] {url} already registered"),
            Err(e) => return Err(e.into()),
        }
    }

    pool.close().await;
    println!("\n=== Seed complete! ===");
    Ok(())
}
