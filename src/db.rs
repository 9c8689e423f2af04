use anyhow::Context;
use once_cell::sync::OnceCell;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::time::Duration;

static DB_POOL: OnceCell<DatabaseConnection> = OnceCell::new();

#[inline(always)]
pub fn get_db_pool() -> &'static DatabaseConnection {
    unsafe { DB_POOL.get_unchecked() }
}

/// Opens the database URL and initializes the DB_POOL static.
///
/// This MUST be called before get_db_pool, which is unsafe code.
pub async fn init_db(database_url: String) -> anyhow::Result<&'static DatabaseConnection> {
    let mut opt = ConnectOptions::new(database_url);
    opt.max_connections(100)
        .min_connections(5)
        .connect_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(8))
        .sqlx_logging(true);

    let pool = Database::connect(opt)
        .await
        .context("database connection was not established")?;
    DB_POOL
        .set(pool)
        .map_err(|_| anyhow::anyhow!("init_db called twice"))?;

    Ok(get_db_pool())
}

/// Initializes logging and the environment, akin to a main() preamble.
pub fn init() {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .init();
}
