use sea_orm::{Database, DatabaseConnection};

pub fn create_redis_pool(url: &str) -> Option<deadpool_redis::Pool> {
    let cfg = deadpool_redis::Config::from_url(url);
    cfg.create_pool(Some(deadpool_redis::Runtime::Tokio1)).ok()
}

pub async fn sqlite_connection(path: &str) -> Option<DatabaseConnection> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() && std::fs::create_dir_all(parent).is_err() {
            log::error!("Failed to create database directory {:?}", parent);
            return None;
        }
    }

    let db_url = format!("sqlite://{path}?mode=rwc");
    let mut db_options = sea_orm::ConnectOptions::new(db_url);
    db_options
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    match Database::connect(db_options).await {
        Ok(db) => Some(db),
        Err(e) => {
            log::error!("Failed to connect to sqlite database: {}", e);
            None
        }
    }
}
