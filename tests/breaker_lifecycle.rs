//! Circuit breaker lifecycle against the real sweeper task.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use load_balancer::balancer::SmoothWrr;
use load_balancer::breaker::BreakerCoordinator;
use load_balancer::config::BreakerConfig;
use load_balancer::registry::{Backend, BreakerState, Registry};
use load_balancer::Shutdown;

#[tokio::test]
async fn breaker_trips_cools_down_and_closes() {
    let registry = Arc::new(Registry::new(vec![Arc::new(Backend::new(
        "a",
        "localhost",
        9001,
    ))]));
    let breaker = Arc::new(BreakerCoordinator::new(
        registry.clone(),
        BreakerConfig {
            failure_threshold: 2,
            cooldown_period: Duration::from_secs(1),
            trial_requests: 2,
        },
    ));

    let shutdown = Shutdown::new();
    tokio::spawn(breaker.clone().run_sweeper(shutdown.subscribe()));

    let backend = registry.get("a").unwrap();

    // Two consecutive failures trip the breaker.
    breaker.report_failure(&backend);
    breaker.report_failure(&backend);
    assert_eq!(backend.breaker_state(), BreakerState::Open);

    // No selector offers an Open backend.
    let wrr = SmoothWrr::new(registry.clone());
    assert!(wrr.pick(&HashSet::new()).is_none());

    // The sweeper promotes to Half-Open within one sweep after cooldown.
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(backend.breaker_state(), BreakerState::HalfOpen);

    // Trial successes close the breaker and zero both counters.
    breaker.report_success(&backend);
    breaker.report_success(&backend);
    let rec = backend.breaker();
    assert_eq!(rec.state, BreakerState::Closed);
    assert_eq!(rec.failure_count, 0);
    assert_eq!(rec.trial_success_count, 0);

    shutdown.trigger();
}

#[tokio::test]
async fn sweeper_exits_on_shutdown_signal() {
    let registry = Arc::new(Registry::new(vec![]));
    let breaker = Arc::new(BreakerCoordinator::new(
        registry,
        BreakerConfig::default(),
    ));

    let shutdown = Shutdown::new();
    let handle = tokio::spawn(breaker.run_sweeper(shutdown.subscribe()));

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("sweeper did not stop after shutdown")
        .unwrap();
}
