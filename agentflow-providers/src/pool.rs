//! ABOUTME: Keyed, health-tracked, age-limited pool of chat providers
//! ABOUTME: Clients are reused while healthy, retired on age or repeated failure

use crate::chat::{ChatProvider, ProviderError};
use crate::openai::OpenAiCompatProvider;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How many failures a client tolerates before it is considered unhealthy.
const FAILURE_RETIREMENT_THRESHOLD: u32 = 5;
/// A recent success within this window keeps a failing client alive.
const RECENT_SUCCESS_WINDOW: Duration = Duration::from_secs(60);
/// Clients are recreated after this age regardless of health.
const MAX_CLIENT_AGE: Duration = Duration::from_secs(3600);

/// Connection parameters for one logical endpoint.
#[derive(Debug, Clone)]
pub struct ProviderEndpoint {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl ProviderEndpoint {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout,
        }
    }

    /// Pool cache key: endpoint plus a credential prefix, so rotated keys
    /// get fresh clients without leaking the credential into logs.
    pub fn cache_key(&self) -> String {
        let prefix: String = self.api_key.chars().take(10).collect();
        let prefix = if prefix.is_empty() {
            "none".to_string()
        } else {
            prefix
        };
        format!("{}:{}", self.base_url, prefix)
    }
}

/// Factory producing provider instances for an endpoint.
pub type ProviderFactory =
    Arc<dyn Fn(&ProviderEndpoint) -> Result<Arc<dyn ChatProvider>, ProviderError> + Send + Sync>;

struct ClientHealth {
    created_at: Instant,
    last_success: Instant,
    failure_count: u32,
    request_count: u64,
    success_count: u64,
}

impl ClientHealth {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            created_at: now,
            last_success: now,
            failure_count: 0,
            request_count: 0,
            success_count: 0,
        }
    }

    /// Reuse policy: healthy while failures stay under the threshold or a
    /// success happened recently, and the client is not too old.
    fn is_healthy(&self) -> bool {
        let failing = self.failure_count >= FAILURE_RETIREMENT_THRESHOLD
            && self.last_success.elapsed() >= RECENT_SUCCESS_WINDOW;
        let too_old = self.created_at.elapsed() >= MAX_CLIENT_AGE;
        !failing && !too_old
    }
}

struct PoolEntry {
    provider: Arc<dyn ChatProvider>,
    health: ClientHealth,
}

/// Per-key statistics snapshot.
#[derive(Debug, Clone)]
pub struct ClientStats {
    pub requests: u64,
    pub successes: u64,
    pub failures: u32,
    pub age_seconds: f64,
}

/// Aggregate pool statistics.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    pub active_clients: usize,
    pub total_requests: u64,
    pub total_successes: u64,
    pub clients: HashMap<String, ClientStats>,
}

impl PoolStats {
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.total_successes as f64 / self.total_requests as f64
        }
    }
}

/// Shared pool of chat providers, keyed by endpoint and credential prefix.
///
/// The pool is injected wherever a client is needed; there is no global
/// instance. All internal mutation is serialized under one lock.
pub struct ProviderPool {
    factory: ProviderFactory,
    entries: RwLock<HashMap<String, PoolEntry>>,
}

impl ProviderPool {
    /// Pool that builds real HTTP providers.
    pub fn openai_compat() -> Self {
        Self::with_factory(Arc::new(|endpoint: &ProviderEndpoint| {
            let provider = OpenAiCompatProvider::new(
                endpoint.base_url.clone(),
                endpoint.api_key.clone(),
                endpoint.timeout,
            )?;
            Ok(Arc::new(provider) as Arc<dyn ChatProvider>)
        }))
    }

    /// Pool with a custom provider factory (used by tests for mocks).
    pub fn with_factory(factory: ProviderFactory) -> Self {
        info!("provider pool initialized");
        Self {
            factory,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Get or create a provider for `endpoint`.
    ///
    /// An existing client is reused only while healthy; otherwise it is
    /// removed and recreated.
    pub fn get(&self, endpoint: &ProviderEndpoint) -> Result<Arc<dyn ChatProvider>, ProviderError> {
        let key = endpoint.cache_key();

        {
            let entries = self.entries.read();
            if let Some(entry) = entries.get(&key) {
                if entry.health.is_healthy() {
                    debug!(endpoint = %endpoint.base_url, "reusing pooled client");
                    return Ok(entry.provider.clone());
                }
            }
        }

        let mut entries = self.entries.write();
        // Double-check after taking the write lock.
        if let Some(entry) = entries.get(&key) {
            if entry.health.is_healthy() {
                return Ok(entry.provider.clone());
            }
            warn!(endpoint = %endpoint.base_url, "retiring unhealthy pooled client");
            entries.remove(&key);
        }

        info!(endpoint = %endpoint.base_url, "creating new pooled client");
        let provider = (self.factory)(endpoint)?;
        entries.insert(
            key,
            PoolEntry {
                provider: provider.clone(),
                health: ClientHealth::new(),
            },
        );
        Ok(provider)
    }

    /// Record the outcome of a request made with a pooled client.
    ///
    /// Successes decay the failure count by one; failures increment it.
    pub fn record(&self, endpoint: &ProviderEndpoint, success: bool) {
        let key = endpoint.cache_key();
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get_mut(&key) {
            entry.health.request_count += 1;
            if success {
                entry.health.success_count += 1;
                entry.health.last_success = Instant::now();
                entry.health.failure_count = entry.health.failure_count.saturating_sub(1);
            } else {
                entry.health.failure_count += 1;
            }
        }
    }

    /// Spawn a background task that periodically evicts unhealthy clients.
    ///
    /// Holds only a weak reference; the task exits once the pool is
    /// dropped.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let pool = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(pool) = pool.upgrade() else { break };
                let evicted = pool.sweep();
                debug!(evicted, "pool health check complete");
            }
        })
    }

    /// Evict unhealthy entries; suitable for a periodic background task.
    pub fn sweep(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, entry| {
            let keep = entry.health.is_healthy();
            if !keep {
                info!(key, "sweeping unhealthy pooled client");
            }
            keep
        });
        before - entries.len()
    }

    /// Statistics snapshot across all pooled clients.
    pub fn stats(&self) -> PoolStats {
        let entries = self.entries.read();
        let mut stats = PoolStats {
            active_clients: entries.len(),
            ..PoolStats::default()
        };
        for (key, entry) in entries.iter() {
            stats.total_requests += entry.health.request_count;
            stats.total_successes += entry.health.success_count;
            stats.clients.insert(
                key.clone(),
                ClientStats {
                    requests: entry.health.request_count,
                    successes: entry.health.success_count,
                    failures: entry.health.failure_count,
                    age_seconds: entry.health.created_at.elapsed().as_secs_f64(),
                },
            );
        }
        stats
    }

    /// Drop every pooled client.
    pub fn close_all(&self) {
        let mut entries = self.entries.write();
        info!(count = entries.len(), "closing all pooled clients");
        entries.clear();
    }
}
