use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr};
use std::path::Path;

const READ_CONNECTIONS: u32 = 5;

/// Read pool plus the single connection every write goes through.
///
/// SQLite allows one writer at a time. Funnelling all writes through one
/// connection queues them in the pool instead of letting two transactions
/// collide on the file lock and fail with `SQLITE_BUSY`.
#[derive(Clone)]
pub struct DbPools {
    pub reader: DatabaseConnection,
    pub writer: DatabaseConnection,
}

pub async fn init_pool(db_path: &str) -> Result<DbPools, DbErr> {
    let abs_path = std::fs::canonicalize(db_path)
        .unwrap_or_else(|_| std::path::PathBuf::from(db_path));
    tracing::info!("Database absolute path: {:?}", abs_path);

    // Ensure parent directory exists
    if let Some(parent) = Path::new(db_path).parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let url = format!("sqlite:{}?mode=rwc", db_path);

    let mut writer_opts = ConnectOptions::new(url.clone());
    writer_opts
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let writer = Database::connect(writer_opts).await?;

    // WAL lets readers run while the writer holds its transaction open
    writer
        .execute_unprepared("PRAGMA journal_mode = WAL")
        .await?;
    run_migrations(&writer).await?;

    let mut reader_opts = ConnectOptions::new(url);
    reader_opts
        .max_connections(READ_CONNECTIONS)
        .sqlx_logging(false);
    let reader = Database::connect(reader_opts).await?;

    Ok(DbPools { reader, writer })
}

/// Private in-memory database with the full schema. Capped at one
/// connection, since every sqlite memory connection is its own database, so
/// reads and writes share it.
pub async fn connect_in_memory() -> Result<DbPools, DbErr> {
    let mut opts = ConnectOptions::new("sqlite::memory:");
    opts.max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);

    let db = Database::connect(opts).await?;
    run_migrations(&db).await?;
    Ok(DbPools {
        reader: db.clone(),
        writer: db,
    })
}

async fn run_migrations(db: &DatabaseConnection) -> Result<(), DbErr> {
    sqlx::migrate!("./migrations")
        .run(db.get_sqlite_connection_pool())
        .await
        .map_err(|e| {
            tracing::error!("Database migration failed: {}", e);
            DbErr::Migration(e.to_string())
        })?;

    tracing::info!("Database migrations applied successfully");
    Ok(())
}
