//! Per-tenant admission control.
//!
//! Two gates guard every execution: a concurrency ceiling (semaphore permits,
//! released by RAII lease drop) and a token-bucket rate limit. New or
//! recently evicted tenants start under stricter warm-start limits for a
//! cooldown window. Tenant state is bounded by LRU + idle-TTL eviction.
//!
//! Clocks come from `tokio::time` so tests drive cooldown and refill
//! deterministically with paused time.

use keelson_common::config::TenantAdmissionConfig;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{Duration, Instant};

/// Retry hint for concurrency rejections. A slot frees whenever any in-flight
/// query finishes, so there is no formula; this is a polling interval.
pub const CONCURRENCY_RETRY_HINT_SECONDS: f64 = 1.0;

/// Which gate rejected the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    Concurrency,
    Rate,
}

impl LimitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Concurrency => "concurrency",
            Self::Rate => "rate",
        }
    }
}

/// Admission rejection. Both variants carry a retry-after hint; neither
/// consumes a token or holds a slot.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AdmissionError {
    #[error("tenant {tenant_id} is at its concurrency ceiling ({active}/{limit})")]
    ConcurrencyExceeded {
        tenant_id: i64,
        limit: u32,
        active: u32,
        retry_after_seconds: f64,
    },

    #[error(
        "tenant {tenant_id} is rate limited ({tokens_remaining:.2} of {burst_capacity:.0} tokens)"
    )]
    RateExceeded {
        tenant_id: i64,
        burst_capacity: f64,
        tokens_remaining: f64,
        retry_after_seconds: f64,
    },
}

impl AdmissionError {
    pub fn limit_kind(&self) -> LimitKind {
        match self {
            Self::ConcurrencyExceeded { .. } => LimitKind::Concurrency,
            Self::RateExceeded { .. } => LimitKind::Rate,
        }
    }

    pub fn retry_after_seconds(&self) -> f64 {
        match self {
            Self::ConcurrencyExceeded {
                retry_after_seconds,
                ..
            }
            | Self::RateExceeded {
                retry_after_seconds,
                ..
            } => *retry_after_seconds,
        }
    }
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug)]
struct TenantState {
    /// Sized to the steady-state limit; the warm-start ceiling is enforced
    /// on top by the active-count check in `acquire`.
    semaphore: Arc<Semaphore>,
    bucket: Mutex<TokenBucket>,
    created_at: Instant,
    last_activity: Mutex<Instant>,
}

impl TenantState {
    fn new(config: &TenantAdmissionConfig, now: Instant) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(
                config.per_tenant_concurrency_limit as usize,
            )),
            bucket: Mutex::new(TokenBucket {
                tokens: config.rate_burst_capacity,
                last_refill: now,
            }),
            created_at: now,
            last_activity: Mutex::new(now),
        }
    }

    fn active(&self, steady_limit: u32) -> u32 {
        steady_limit.saturating_sub(self.semaphore.available_permits() as u32)
    }

    fn touch(&self, now: Instant) {
        if let Ok(mut last) = self.last_activity.lock() {
            *last = now;
        }
    }

    fn last_activity(&self) -> Instant {
        self.last_activity
            .lock()
            .map(|g| *g)
            .unwrap_or_else(|e| *e.into_inner())
    }
}

/// RAII admission lease: one concurrency slot plus one consumed rate token.
/// Dropping it releases the slot on every exit path, including panics and
/// cancelled futures. Tokens are never refunded.
#[derive(Debug)]
pub struct TenantLease {
    tenant_id: i64,
    limit: u32,
    tokens_remaining: f64,
    state: Arc<TenantState>,
    _permit: OwnedSemaphorePermit,
}

impl TenantLease {
    pub fn tenant_id(&self) -> i64 {
        self.tenant_id
    }

    /// Concurrency ceiling that was in force when the lease was granted.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Bucket level right after this lease consumed its token.
    pub fn tokens_remaining(&self) -> f64 {
        self.tokens_remaining
    }
}

impl Drop for TenantLease {
    fn drop(&mut self) {
        self.state.touch(Instant::now());
    }
}

/// Per-tenant admission controller. All gates are checked under the tenant's
/// bucket lock so warm-start ceilings cannot be raced past.
pub struct AdmissionController {
    config: TenantAdmissionConfig,
    tenants: Mutex<HashMap<i64, Arc<TenantState>>>,
}

impl AdmissionController {
    pub fn new(config: TenantAdmissionConfig) -> Self {
        Self {
            config,
            tenants: Mutex::new(HashMap::new()),
        }
    }

    /// Number of tenants currently tracked (post-eviction).
    pub fn tracked_tenants(&self) -> usize {
        self.tenants
            .lock()
            .map(|g| g.len())
            .unwrap_or_else(|e| e.into_inner().len())
    }

    /// Try to admit one execution for `tenant_id`. Fails fast: no queuing on
    /// either gate. The concurrency gate runs first so a rate rejection never
    /// leaks a held slot.
    pub fn acquire(&self, tenant_id: i64) -> Result<TenantLease, AdmissionError> {
        let state = self.state_for(tenant_id);
        let now = Instant::now();

        let warm = now.duration_since(state.created_at)
            < Duration::from_secs(self.config.warm_start_cooldown_seconds);
        let steady_limit = self.config.per_tenant_concurrency_limit;
        let limit = if warm {
            self.config.warm_start_concurrency_limit.min(steady_limit)
        } else {
            steady_limit
        };

        let mut bucket = state
            .bucket
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        // Concurrency gate.
        let active = state.active(steady_limit);
        if active >= limit {
            state.touch(now);
            tracing::debug!(
                tenant_id,
                active,
                limit,
                warm,
                "admission rejected: concurrency ceiling"
            );
            return Err(AdmissionError::ConcurrencyExceeded {
                tenant_id,
                limit,
                active,
                retry_after_seconds: CONCURRENCY_RETRY_HINT_SECONDS,
            });
        }
        let permit = state
            .semaphore
            .clone()
            .try_acquire_owned()
            .map_err(|_| AdmissionError::ConcurrencyExceeded {
                tenant_id,
                limit,
                active,
                retry_after_seconds: CONCURRENCY_RETRY_HINT_SECONDS,
            })?;

        // Rate gate. Refill is lazy and capped at the effective burst.
        let burst = if warm {
            self.config
                .warm_start_burst_capacity
                .min(self.config.rate_burst_capacity)
        } else {
            self.config.rate_burst_capacity
        };
        let elapsed = now.duration_since(bucket.last_refill);
        bucket.tokens =
            (bucket.tokens + elapsed.as_secs_f64() * self.config.rate_refill_per_sec).min(burst);
        bucket.last_refill = now;

        if bucket.tokens < 1.0 {
            let deficit = 1.0 - bucket.tokens;
            let retry_after_seconds = deficit / self.config.rate_refill_per_sec;
            state.touch(now);
            tracing::debug!(
                tenant_id,
                tokens = bucket.tokens,
                burst,
                warm,
                "admission rejected: rate limit"
            );
            // Dropping `permit` here returns the slot untouched.
            return Err(AdmissionError::RateExceeded {
                tenant_id,
                burst_capacity: burst,
                tokens_remaining: bucket.tokens,
                retry_after_seconds,
            });
        }
        bucket.tokens -= 1.0;
        let tokens_remaining = bucket.tokens;
        drop(bucket);
        state.touch(now);

        Ok(TenantLease {
            tenant_id,
            limit,
            tokens_remaining,
            state,
            _permit: permit,
        })
    }

    /// Get or create the state for a tenant, running evictions first.
    ///
    /// Eviction only ever removes states with zero outstanding permits, so a
    /// held lease keeps its tenant alive.
    fn state_for(&self, tenant_id: i64) -> Arc<TenantState> {
        let mut tenants = self
            .tenants
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        self.evict_idle(&mut tenants, now);

        if let Some(state) = tenants.get(&tenant_id) {
            return Arc::clone(state);
        }

        if tenants.len() >= self.config.max_tracked_tenants {
            self.evict_lru(&mut tenants);
        }

        let state = Arc::new(TenantState::new(&self.config, now));
        tenants.insert(tenant_id, Arc::clone(&state));
        tracing::debug!(tenant_id, tracked = tenants.len(), "tracking new tenant");
        state
    }

    fn evict_idle(&self, tenants: &mut HashMap<i64, Arc<TenantState>>, now: Instant) {
        let ttl = Duration::from_secs(self.config.idle_ttl_seconds);
        let steady_limit = self.config.per_tenant_concurrency_limit;
        let expired: Vec<i64> = tenants
            .iter()
            .filter(|(_, state)| {
                state.active(steady_limit) == 0
                    && now.duration_since(state.last_activity()) > ttl
            })
            .map(|(id, _)| *id)
            .collect();
        for tenant_id in expired {
            tenants.remove(&tenant_id);
            tracing::debug!(tenant_id, "evicted idle tenant state");
        }
    }

    /// Evict the least recently active tenant with no outstanding leases.
    /// If every tracked tenant holds a lease the bound is soft-exceeded.
    fn evict_lru(&self, tenants: &mut HashMap<i64, Arc<TenantState>>) {
        let steady_limit = self.config.per_tenant_concurrency_limit;
        let victim = tenants
            .iter()
            .filter(|(_, state)| state.active(steady_limit) == 0)
            .min_by_key(|(_, state)| state.last_activity())
            .map(|(id, _)| *id);
        match victim {
            Some(tenant_id) => {
                tenants.remove(&tenant_id);
                tracing::debug!(tenant_id, "evicted least recently active tenant");
            }
            None => {
                tracing::warn!(
                    tracked = tenants.len(),
                    max_tracked = self.config.max_tracked_tenants,
                    "all tracked tenants hold leases; exceeding tenant bound"
                );
            }
        }
    }
}
