//! Application state management
//!
//! Author: hephaex@gmail.com

use crate::auth::action_token::ActionTokenGenerator;
use crate::auth::jwt::JwtConfig;
use crate::auth::password::PasswordConfig;
use crate::email::Mailer;
use portico_core::config::AppConfig;
use portico_core::{AccountStore, EntityStore, MemoryStore, PgStore, TokenStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// Store handles used by the services
#[derive(Clone)]
pub struct Stores {
    pub accounts: Arc<dyn AccountStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub entities: Arc<dyn EntityStore>,
}

impl Stores {
    /// All three traits served by one in-memory store
    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            accounts: store.clone(),
            tokens: store.clone(),
            entities: store,
        }
    }

    /// All three traits served by one PostgreSQL pool
    pub fn postgres(store: PgStore) -> Self {
        let store = Arc::new(store);
        Self {
            accounts: store.clone(),
            tokens: store.clone(),
            entities: store,
        }
    }
}

/// Latency histogram buckets
#[derive(Debug, Default, Clone)]
pub struct LatencyBuckets {
    pub under_10ms: u64,
    pub ms_10_50: u64,
    pub ms_50_100: u64,
    pub ms_100_500: u64,
    pub ms_500_1000: u64,
    pub over_1s: u64,
}

impl LatencyBuckets {
    fn record(&mut self, latency_us: u64) {
        match latency_us {
            0..=9_999 => self.under_10ms += 1,
            10_000..=49_999 => self.ms_10_50 += 1,
            50_000..=99_999 => self.ms_50_100 += 1,
            100_000..=499_999 => self.ms_100_500 += 1,
            500_000..=999_999 => self.ms_500_1000 += 1,
            _ => self.over_1s += 1,
        }
    }
}

/// Per-endpoint request metrics
#[derive(Debug, Default, Clone)]
pub struct EndpointMetrics {
    /// Response count by status code
    pub status_counts: HashMap<u16, u64>,
    pub total_latency_us: u64,
    pub latency_count: u64,
    pub min_latency_us: u64,
    pub max_latency_us: u64,
    pub latency_buckets: LatencyBuckets,
}

impl EndpointMetrics {
    fn record(&mut self, status: u16, latency_us: u64) {
        *self.status_counts.entry(status).or_insert(0) += 1;
        self.min_latency_us = if self.latency_count == 0 {
            latency_us
        } else {
            self.min_latency_us.min(latency_us)
        };
        self.max_latency_us = self.max_latency_us.max(latency_us);
        self.total_latency_us += latency_us;
        self.latency_count += 1;
        self.latency_buckets.record(latency_us);
    }
}

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    pub accounts: Arc<dyn AccountStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub entities: Arc<dyn EntityStore>,
    /// Outbound email
    pub mailer: Arc<dyn Mailer>,
    /// Session token signing settings
    pub jwt: JwtConfig,
    /// Activation and reset token generator
    pub action_tokens: ActionTokenGenerator,
    /// Argon2 cost parameters for new hashes
    pub password: PasswordConfig,
    /// Server start time
    pub start_time: Instant,
    /// Request counter
    pub request_count: AtomicU64,
    /// Ready status
    pub is_ready: AtomicBool,
    /// Request metrics keyed by normalized endpoint
    pub metrics: RwLock<HashMap<String, EndpointMetrics>>,
}

impl AppState {
    /// Create application state from config, stores and a mailer
    pub fn new(config: AppConfig, stores: Stores, mailer: Arc<dyn Mailer>) -> anyhow::Result<Self> {
        let jwt = JwtConfig::from(&config.auth);
        let action_tokens =
            ActionTokenGenerator::new(&config.auth.secret, config.auth.action_token_timeout_secs)
                .map_err(|e| anyhow::anyhow!("Invalid action token key: {e}"))?;

        Ok(Self {
            config,
            accounts: stores.accounts,
            tokens: stores.tokens,
            entities: stores.entities,
            mailer,
            jwt,
            action_tokens,
            password: PasswordConfig::default(),
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
            is_ready: AtomicBool::new(true),
            metrics: RwLock::new(HashMap::new()),
        })
    }

    /// Override the Argon2 parameters used for new hashes
    pub fn with_password_config(mut self, password: PasswordConfig) -> Self {
        self.password = password;
        self
    }

    /// Increment request counter
    pub fn increment_requests(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::SeqCst)
    }

    /// Get total request count
    pub fn get_request_count(&self) -> u64 {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Check if service is ready
    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::SeqCst)
    }

    /// Set ready status
    pub fn set_ready(&self, ready: bool) {
        self.is_ready.store(ready, Ordering::SeqCst);
    }

    /// Record one completed request
    pub async fn record_request(&self, endpoint: String, status: u16, latency_us: u64) {
        self.increment_requests();
        self.metrics
            .write()
            .await
            .entry(endpoint)
            .or_default()
            .record(status, latency_us);
    }

    /// Link embedded in activation emails
    pub fn activation_link(&self, uidb64: &str, token: &str) -> String {
        format!(
            "{}/activate-account/{uidb64}/{token}/",
            self.config.server.public_base_url
        )
    }

    /// Link embedded in password reset emails
    pub fn reset_link(&self, uidb64: &str, token: &str) -> String {
        format!(
            "{}/reset-password/{uidb64}/{token}/",
            self.config.server.public_base_url
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::MemoryMailer;

    fn state() -> AppState {
        AppState::new(
            AppConfig::default(),
            Stores::memory(),
            Arc::new(MemoryMailer::new()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_record_request() {
        let state = state();
        state.record_request("/entities/".to_string(), 200, 5_000).await;
        state.record_request("/entities/".to_string(), 200, 70_000).await;
        state.record_request("/entities/".to_string(), 404, 2_000_000).await;

        assert_eq!(state.get_request_count(), 3);

        let metrics = state.metrics.read().await;
        let entry = &metrics["/entities/"];
        assert_eq!(entry.status_counts[&200], 2);
        assert_eq!(entry.status_counts[&404], 1);
        assert_eq!(entry.min_latency_us, 5_000);
        assert_eq!(entry.max_latency_us, 2_000_000);
        assert_eq!(entry.latency_buckets.under_10ms, 1);
        assert_eq!(entry.latency_buckets.ms_50_100, 1);
        assert_eq!(entry.latency_buckets.over_1s, 1);
    }

    #[test]
    fn test_links_use_public_base_url() {
        let state = state();
        assert_eq!(
            state.activation_link("MQ", "abc-def"),
            "http://localhost:8080/activate-account/MQ/abc-def/"
        );
        assert_eq!(
            state.reset_link("MQ", "abc-def"),
            "http://localhost:8080/reset-password/MQ/abc-def/"
        );
    }

    #[test]
    fn test_ready_flag() {
        let state = state();
        assert!(state.is_ready());
        state.set_ready(false);
        assert!(!state.is_ready());
    }
}
