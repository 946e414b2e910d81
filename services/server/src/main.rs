use server::config::Config;
use server::db;
use server::hub::StreamHub;
use server::insights::{InsightsEngine, OpenAiAnalyzer};
use server::ops::OpsMonitor;
use server::ratelimit::RateLimiter;
use server::repo::PgStore;
use server::state::AppState;
use server::store::Store;
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .init();

    let cfg = Config::from_env().unwrap_or_else(|e| {
        eprintln!("configuration error: {e}");
        std::process::exit(2);
    });

    info!("connecting to database...");
    let pool = db::create_pool(&cfg.database_url, cfg.pg_max_conns).await;
    db::run_migrations(&pool).await;
    info!("migrations applied");

    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));
    let hub = StreamHub::new();
    let shutdown = CancellationToken::new();

    let monitor = OpsMonitor::new(Arc::clone(&store), cfg.ops.clone());
    monitor.init().await;
    tokio::spawn(Arc::clone(&monitor).run(shutdown.clone()));

    let insights = match &cfg.openai {
        Some(openai_cfg) => {
            let analyzer = Arc::new(OpenAiAnalyzer::new(openai_cfg.clone()));
            let engine =
                InsightsEngine::new(Arc::clone(&store), analyzer, cfg.insights.clone());
            engine.start(shutdown.clone()).await;
            info!(model = %openai_cfg.model, "insights engine started");
            Some(engine)
        }
        None => {
            info!("OPENAI_API_KEY not set; insights engine disabled");
            None
        }
    };

    tokio::spawn(server::retention::run(
        Arc::clone(&store),
        cfg.retention.clone(),
        shutdown.clone(),
    ));

    let state = AppState::new(
        store,
        hub,
        monitor,
        insights,
        Arc::new(RateLimiter::new(cfg.rate_limit_per_min)),
        &cfg.ingest_api_key,
        cfg.trust_proxy_headers,
    );
    let router = server::build_router(state, &cfg.cors_allow_origin);

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind");
    info!(addr = %bind_addr, "server listening");

    let signal_token = shutdown.clone();
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        signal_token.cancel();
    })
    .await
    .expect("server error");
    info!("server shut down gracefully");
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
