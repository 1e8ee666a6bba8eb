use anyhow::Result;
use std::sync::Arc;

mod ai;
mod auth;
mod cache;
mod config;
mod db;
mod error;
mod http_client;
mod middleware;
mod models;
mod routes;

#[tokio::main]
async fn main() -> Result<()> {
    // Check if interactive setup is needed (no .env and missing required values)
    if config::needs_interactive_setup() {
        let interactive_config = config::run_interactive_setup()?;

        // Set environment variables from interactive config so Config::load() can use them
        std::env::set_var("SUPABASE_URL", &interactive_config.supabase_url);
        std::env::set_var("SUPABASE_ANON_KEY", &interactive_config.supabase_anon_key);
        std::env::set_var("SERVER_PORT", &interactive_config.server_port);
        if !interactive_config.openrouter_api_key.is_empty() {
            std::env::set_var("OPENROUTER_API_KEY", &interactive_config.openrouter_api_key);
        }
    }

    // Load configuration first (for log level)
    let config = config::Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("Agency Gateway starting...");
    tracing::info!(
        "Server configured: {}:{}",
        config.server_host,
        config.server_port
    );

    // Initialize the auth provider client and session manager
    tracing::info!("Initializing session manager...");
    let provider = Arc::new(auth::SupabaseAuthClient::new(
        &config.supabase_url,
        &config.supabase_anon_key,
        config.http_request_timeout,
    )?);

    let store = auth::SessionStore::new(&config.session_db_file);
    let session = Arc::new(auth::SessionManager::new(provider.clone(), Some(store)));

    // The pump applies provider push events for the life of the process
    let _event_pump = session.clone().spawn_event_pump();

    // Restore the persisted session; failure just means signing in again
    session.bootstrap().await;
    match session.snapshot().user() {
        Some(user) => tracing::info!("Session restored for {}", user.email),
        None => tracing::info!("No session restored, sign-in required"),
    }

    // Initialize the database client
    let http_client = Arc::new(http_client::ProviderHttpClient::new(
        session.clone(),
        config.http_max_connections,
        config.http_connect_timeout,
        config.http_request_timeout,
        config.http_max_retries,
    )?);
    let db = Arc::new(db::Database::new(
        http_client,
        session.clone(),
        &config.supabase_url,
        &config.supabase_anon_key,
    ));
    tracing::info!("Database client initialized with connection pooling");

    let cache = cache::ListCache::new(config.reference_cache_ttl);

    let ideas = Arc::new(ai::IdeaGenerator::new(
        config.openrouter_api_key.clone(),
        &config.openrouter_model,
        config.http_request_timeout,
    )?);
    if config.openrouter_api_key.is_some() {
        tracing::info!("Advert idea generation enabled ({})", config.openrouter_model);
    } else {
        tracing::info!("Advert idea generation disabled (no OPENROUTER_API_KEY)");
    }

    let app_state = routes::AppState {
        session: session.clone(),
        db,
        cache,
        ideas,
    };

    // Build the application with routes and middleware
    let app = build_app(app_state);

    // Bind to configured host and port
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    print_startup_banner(&config);

    // Start server with graceful shutdown
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Build the application with all routes and middleware
fn build_app(state: routes::AppState) -> axum::Router {
    use axum::Router;

    // Health check routes (no auth required)
    let health_routes = routes::health_routes();

    // Auth routes (reachable while signed out)
    let auth_routes = routes::auth_routes(state.clone());

    // Dashboard CRUD routes (require the live session)
    let api_routes = routes::api_routes(state);

    Router::new()
        .merge(health_routes)
        .merge(auth_routes)
        .merge(api_routes)
        .layer(middleware::cors_layer())
}

/// Print startup banner
fn print_startup_banner(config: &config::Config) {
    println!();
    println!("  Agency Gateway");
    println!();
    println!("  Version:     {}", env!("CARGO_PKG_VERSION"));
    println!(
        "  Server:      http://{}:{}",
        config.server_host, config.server_port
    );
    println!("  Backend:     {}", config.supabase_url);
    println!(
        "  Idea model:  {}",
        if config.openrouter_api_key.is_some() {
            config.openrouter_model.as_str()
        } else {
            "disabled"
        }
    );
    println!("  Log Level:   {}", config.log_level);
    println!();
}

/// Handle graceful shutdown signal
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown...");
        },
    }
}
