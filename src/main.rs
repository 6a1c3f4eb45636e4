use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use load_balancer::config::Config;
use load_balancer::health::HealthScorer;
use load_balancer::http::HttpServer;
use load_balancer::lifecycle::Shutdown;
use load_balancer::{observability, testserver};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "load_balancer=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    tracing::info!(
        port = config.lb_port,
        ip_hash = config.use_ip_hash,
        sticky_sessions = config.use_sticky_sessions,
        test_servers = config.start_test_servers,
        health_check_interval_secs = config.health_check_interval.as_secs(),
        failure_threshold = config.breaker.failure_threshold,
        cooldown_secs = config.breaker.cooldown_period.as_secs(),
        trial_requests = config.breaker.trial_requests,
        "Configuration loaded"
    );

    if let Some(port) = config.metrics_port {
        observability::init_metrics(([0, 0, 0, 0], port).into());
    }

    if config.start_test_servers {
        testserver::start_default_servers();
    }

    let shutdown = Arc::new(Shutdown::new());
    let server = HttpServer::new(config.clone());

    let scorer = Arc::new(HealthScorer::new(
        server.registry(),
        config.health_check_interval,
    ));
    tokio::spawn(scorer.run(shutdown.subscribe()));
    tokio::spawn(server.breaker().run_sweeper(shutdown.subscribe()));

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown.listen_for_signals().await;
        });
    }

    let listener = TcpListener::bind(("0.0.0.0", config.lb_port)).await?;
    tracing::info!(address = %listener.local_addr()?, "Load balancer listening");

    server.run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
