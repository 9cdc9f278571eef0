use burrow::{config::Config, hub::Hub, state::AppState, store};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = Config::from_env().expect("invalid configuration");
    init_tracing(config.debug);

    let pool = store::connect(&config.database_path)
        .await
        .expect("failed to open database");
    tracing::info!(path = %config.database_path, "database ready");

    let hub = Hub::spawn(pool.clone());
    let state = AppState::new(pool, hub);
    let app = burrow::app(state);

    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .expect("failed to bind port");
    tracing::info!("listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
