use rpg_persistence_sqlite::{create_db_pool, migrations::run_migrations};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let db_path = std::env::var("RPG_DB").expect("RPG_DB env var not set");

    if let Some(parent) = std::path::Path::new(&db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directory for DB");
            println!("Created parent directory for DB at {}", parent.display());
        }
    }

    let pool = create_db_pool(&db_path, 1)
        .await
        .expect("Failed to create DB pool");
    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    println!("Database at {} is up to date", db_path);
}
