use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use suoke_auth_core::services::initialize_background_tasks;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle version flag for container health checks - must be FIRST
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 && args[1] == "--version" {
        println!("suoke-auth-core v{}", env!("CARGO_PKG_VERSION"));
        std::process::exit(0);
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "suoke_auth_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    info!("=== STARTING SUOKE AUTH SERVICE CORE ===");

    let state = match suoke_auth_core::initialize_app_state().await {
        Ok(state) => {
            info!("✓ Service registry initialized");
            state
        }
        Err(e) => {
            error!("✗ Failed to initialize services: {}", e);
            return Err(e);
        }
    };

    // Startup health probe
    let health = suoke_auth_core::health_check(&state).await;
    info!("Startup health: {}", health);

    // Periodic maintenance: session expiry and permission cache sweeps
    initialize_background_tasks(state.clone()).await;

    info!("Auth core running; transport adapters attach via the library API");

    // Run until interrupted, then drain
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, draining...");

    state.redis_pool.shutdown().await;
    info!("Shutdown complete");

    Ok(())
}
