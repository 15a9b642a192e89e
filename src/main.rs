use axum::serve;
use shopping_list::api::routes::create_router;
use shopping_list::config::AppConfig;
use shopping_list::logic::spawn_key_sweeper;
use shopping_list::seed;
use shopping_list::store::PostgresStore;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    // Initialize logging with explicit filter to suppress sqlx debug logs
    use env_logger::Builder;
    use log::LevelFilter;

    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("sqlx", LevelFilter::Warn)
        .parse_default_env()
        .init();

    let config = AppConfig::load()?;
    log::info!(
        "Configuration loaded: server={}:{}",
        config.server.host,
        config.server.port
    );

    log::info!("Connecting to PostgreSQL...");
    let postgres_store = PostgresStore::new(&config.database_url(), config.max_connections()).await?;

    log::info!("Running database migrations...");
    postgres_store.migrate().await?;

    let store = Arc::new(postgres_store);

    // Demo products (optional)
    if std::env::var("LOAD_SEED_DATA").unwrap_or_default() == "true" {
        log::info!("Loading seed data...");
        seed::load_seed_data(&*store).await?;
    }

    let _sweeper = spawn_key_sweeper(
        store.clone(),
        config.sweep_interval(),
        config.key_retention(),
    );

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    log::info!("Shopping list server running on http://{}", bind_address);

    serve(listener, create_router().with_state(store)).await?;

    Ok(())
}
