use transfat_core::Config;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize the application (metadata store, storage, worker, routes)
    let (state, router) = transfat_api::setup::initialize_app(config.clone()).await?;

    // Start the server; returns after shutdown and queue drain
    transfat_api::setup::server::start_server(&config, router, state).await?;

    Ok(())
}
