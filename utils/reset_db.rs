use anyhow::Context;
use sea_orm::{ConnectionTrait, Database, DbBackend, Statement};
use std::env;

const TABLES: [&str; 4] = ["file_usages", "files", "api_keys", "seaql_migrations"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

    let db = Database::connect(database_url)
        .await
        .context("Failed to connect to database")?;
    let backend = db.get_database_backend();

    for table in TABLES {
        let sql = match backend {
            DbBackend::Postgres => format!("DROP TABLE IF EXISTS \"{table}\" CASCADE;"),
            _ => format!("DROP TABLE IF EXISTS \"{table}\";"),
        };
        db.execute(Statement::from_string(backend, sql))
            .await
            .with_context(|| format!("Failed to drop {table}"))?;
    }

    println!("Database reset successfully");
    Ok(())
}
