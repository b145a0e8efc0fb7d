//! Per-client rate limiting with idle-state eviction.
//!
//! One token bucket per client IP, all behind a single map-wide mutex. A
//! background sweeper wakes once per interval and drops clients that have
//! been idle past the eviction window, bounding memory to active clients.
//! The single lock is a deliberate simplicity/contention tradeoff: the
//! request path and the sweeper can never race on an entry.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::Response,
};
use tokio::sync::broadcast;

use crate::config::LimiterConfig;
use crate::http::errors::ApiError;
use crate::http::server::AppState;
use crate::observability::metrics;

/// A simple token bucket.
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();

        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Per-client state: the bucket plus the activity timestamp the sweeper
/// keys eviction on.
struct ClientState {
    bucket: TokenBucket,
    last_seen: Instant,
}

/// Per-client token-bucket admission control.
pub struct RateLimiter {
    clients: Mutex<HashMap<IpAddr, ClientState>>,
    config: LimiterConfig,
}

impl RateLimiter {
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Decide whether a request from this client is admitted.
    ///
    /// First sight of an identity creates a bucket at full burst. Lookup,
    /// creation, consumption and the last-seen update all happen under one
    /// lock acquisition.
    pub fn admit(&self, ip: IpAddr) -> bool {
        if !self.config.enabled {
            return true;
        }
        let capacity = f64::from(self.config.burst);
        let mut clients = self.clients.lock().expect("rate limiter mutex poisoned");
        let client = clients
            .entry(ip)
            .or_insert_with(|| ClientState {
                bucket: TokenBucket::new(capacity),
                last_seen: Instant::now(),
            });
        client.last_seen = Instant::now();
        client
            .bucket
            .try_acquire(capacity, self.config.requests_per_second)
    }

    /// Evict clients idle past the eviction window. Returns the number of
    /// entries removed.
    pub fn sweep(&self) -> usize {
        let idle_after = Duration::from_secs(self.config.idle_after_secs);
        let mut clients = self.clients.lock().expect("rate limiter mutex poisoned");
        let before = clients.len();
        clients.retain(|_, client| client.last_seen.elapsed() <= idle_after);
        before - clients.len()
    }

    /// Number of client identities currently tracked.
    pub fn tracked(&self) -> usize {
        self.clients.lock().expect("rate limiter mutex poisoned").len()
    }

    /// Background eviction loop. Runs until the shutdown signal arrives;
    /// a sweep in progress always completes.
    pub async fn run_sweeper(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.config.sweep_interval_secs));
        ticker.tick().await; // first tick is immediate; skip it

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = self.sweep();
                    if evicted > 0 {
                        tracing::debug!(evicted, tracked = self.tracked(), "Idle clients evicted");
                        metrics::record_clients_evicted(evicted as u64);
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Rate limiter sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

/// Admission middleware. Runs before authentication; a rejected request
/// never reaches the token store.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    // A missing peer address means the server was wired up wrong, which is
    // an infrastructure failure rather than a limiting decision.
    let addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .ok_or(ApiError::Infrastructure)?;
    let ip = addr.0.ip();

    if state.limiter.admit(ip) {
        metrics::record_request_admitted();
        Ok(next.run(request).await)
    } else {
        tracing::warn!(client = %ip, "Rate limit exceeded");
        metrics::record_rate_limited();
        Err(ApiError::RateLimitExceeded)
    }
}
