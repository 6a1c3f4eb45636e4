//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! process environment
//!     → Config::from_env (parse, apply defaults)
//!     → shared via Arc to all subsystems
//!
//! POST /api/config
//!     → RuntimeFlags (atomic booleans, read on every dispatch)
//! ```
//!
//! # Design Decisions
//! - Every variable has a default so the balancer runs with a bare env
//! - The two routing toggles are runtime-mutable and therefore live in
//!   RuntimeFlags, not in the immutable Config
//! - Parsing helpers take the raw Option<String> so they are testable
//!   without touching the process environment

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Per-backend seed configuration.
#[derive(Debug, Clone)]
pub struct BackendSeed {
    pub id: String,
    pub host: String,
    pub port: u16,
}

/// Circuit breaker thresholds and timers.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures that trip a Closed breaker.
    pub failure_threshold: u32,
    /// How long an Open breaker waits before Half-Open.
    pub cooldown_period: Duration,
    /// Successful trials required to close a Half-Open breaker.
    pub trial_requests: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_period: Duration::from_secs(10),
            trial_requests: 2,
        }
    }
}

/// Immutable process configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listener port.
    pub lb_port: u16,
    /// Seed backends registered at startup.
    pub backends: Vec<BackendSeed>,
    /// Health scorer tick.
    pub health_check_interval: Duration,
    /// Initial value of the IP-hash toggle.
    pub use_ip_hash: bool,
    /// Initial value of the sticky-session toggle.
    pub use_sticky_sessions: bool,
    /// Launch the synthetic backends on 9001/9002.
    pub start_test_servers: bool,
    /// Circuit breaker settings.
    pub breaker: BreakerConfig,
    /// Prometheus exporter port; None disables the exporter.
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lb_port: 8080,
            backends: vec![
                BackendSeed {
                    id: "server-1".to_string(),
                    host: "localhost".to_string(),
                    port: 9001,
                },
                BackendSeed {
                    id: "server-2".to_string(),
                    host: "localhost".to_string(),
                    port: 9002,
                },
            ],
            health_check_interval: Duration::from_secs(5),
            use_ip_hash: false,
            use_sticky_sessions: true,
            start_test_servers: true,
            breaker: BreakerConfig::default(),
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load configuration from the process environment, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Config::default();

        Self {
            lb_port: parse_port(env_var("LB_PORT"), defaults.lb_port),
            backends: defaults.backends,
            health_check_interval: Duration::from_secs(parse_secs(
                env_var("HEALTH_CHECK_INTERVAL"),
                5,
            )),
            use_ip_hash: parse_bool(env_var("USE_IP_HASH"), false),
            use_sticky_sessions: parse_bool(env_var("USE_STICKY_SESSIONS"), true),
            start_test_servers: parse_bool(env_var("START_TEST_SERVERS"), true),
            breaker: BreakerConfig {
                failure_threshold: parse_count(env_var("FAILURE_THRESHOLD"), 3),
                cooldown_period: Duration::from_secs(parse_secs(env_var("COOLDOWN_PERIOD"), 10)),
                trial_requests: parse_count(env_var("TRIAL_REQUESTS"), 2),
            },
            metrics_port: env_var("METRICS_PORT").and_then(|v| v.parse().ok()),
        }
    }
}

/// Runtime-mutable routing toggles, read on every dispatch.
#[derive(Debug)]
pub struct RuntimeFlags {
    use_ip_hash: AtomicBool,
    use_sticky_sessions: AtomicBool,
}

impl RuntimeFlags {
    pub fn new(use_ip_hash: bool, use_sticky_sessions: bool) -> Self {
        Self {
            use_ip_hash: AtomicBool::new(use_ip_hash),
            use_sticky_sessions: AtomicBool::new(use_sticky_sessions),
        }
    }

    pub fn use_ip_hash(&self) -> bool {
        self.use_ip_hash.load(Ordering::Relaxed)
    }

    pub fn use_sticky_sessions(&self) -> bool {
        self.use_sticky_sessions.load(Ordering::Relaxed)
    }

    pub fn set_use_ip_hash(&self, value: bool) {
        self.use_ip_hash.store(value, Ordering::Relaxed);
    }

    pub fn set_use_sticky_sessions(&self, value: bool) {
        self.use_sticky_sessions.store(value, Ordering::Relaxed);
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_bool(value: Option<String>, default: bool) -> bool {
    match value.as_deref() {
        Some("true") | Some("1") => true,
        Some("false") | Some("0") => false,
        _ => default,
    }
}

fn parse_port(value: Option<String>, default: u16) -> u16 {
    value
        .and_then(|v| v.parse::<u16>().ok())
        .filter(|p| *p != 0)
        .unwrap_or(default)
}

fn parse_secs(value: Option<String>, default: u64) -> u64 {
    value
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|s| *s != 0)
        .unwrap_or(default)
}

fn parse_count(value: Option<String>, default: u32) -> u32 {
    value
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|c| *c != 0)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_parsing_accepts_both_spellings() {
        assert!(parse_bool(Some("true".into()), false));
        assert!(parse_bool(Some("1".into()), false));
        assert!(!parse_bool(Some("false".into()), true));
        assert!(!parse_bool(Some("0".into()), true));
        assert!(parse_bool(Some("yes".into()), true));
        assert!(parse_bool(None, true));
    }

    #[test]
    fn zero_and_garbage_fall_back_to_defaults() {
        assert_eq!(parse_port(Some("0".into()), 8080), 8080);
        assert_eq!(parse_port(Some("abc".into()), 8080), 8080);
        assert_eq!(parse_port(Some("9090".into()), 8080), 9090);
        assert_eq!(parse_secs(Some("0".into()), 10), 10);
        assert_eq!(parse_count(Some("7".into()), 3), 7);
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.lb_port, 8080);
        assert!(!cfg.use_ip_hash);
        assert!(cfg.use_sticky_sessions);
        assert!(cfg.start_test_servers);
        assert_eq!(cfg.breaker.failure_threshold, 3);
        assert_eq!(cfg.breaker.cooldown_period, Duration::from_secs(10));
        assert_eq!(cfg.breaker.trial_requests, 2);
        assert_eq!(cfg.health_check_interval, Duration::from_secs(5));
        assert_eq!(cfg.backends.len(), 2);
    }

    #[test]
    fn runtime_flags_flip_atomically() {
        let flags = RuntimeFlags::new(false, true);
        assert!(!flags.use_ip_hash());
        assert!(flags.use_sticky_sessions());

        flags.set_use_ip_hash(true);
        flags.set_use_sticky_sessions(false);

        assert!(flags.use_ip_hash());
        assert!(!flags.use_sticky_sessions());
    }
}
