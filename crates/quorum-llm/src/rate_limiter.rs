//! Per-provider request spacing and rate-limit backoff.

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex, PoisonError};
use std::time::Duration;

use quorum_types::ProviderId;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// RateLimitConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Minimum spacing between two calls to the same provider.
    #[serde(with = "quorum_types::duration_serde")]
    pub min_spacing: Duration,
    /// Cooldown before the first retry after a 429.
    #[serde(with = "quorum_types::duration_serde")]
    pub initial_cooldown: Duration,
    pub multiplier: f64,
    #[serde(with = "quorum_types::duration_serde")]
    pub max_cooldown: Duration,
    /// Upper bound of the uniform jitter added to every computed backoff.
    #[serde(with = "quorum_types::duration_serde")]
    pub max_jitter: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_spacing: Duration::from_millis(2000),
            initial_cooldown: Duration::from_secs(10),
            multiplier: 2.0,
            max_cooldown: Duration::from_secs(60),
            max_jitter: Duration::from_secs(2),
        }
    }
}

// ---------------------------------------------------------------------------
// RateLimiter
// ---------------------------------------------------------------------------

/// Tracks the last call instant per provider.
///
/// The map is read and written under a short-lived lock that is never held
/// across the sleep, so two concurrent callers for the same provider can both
/// pass the spacing check. Spacing is therefore approximate under concurrency.
#[derive(Debug, Default)]
pub struct RateLimiter {
    config: RateLimitConfig,
    last_call: Mutex<HashMap<ProviderId, Instant>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            last_call: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Sleep until `min_spacing` has passed since the last call to `provider`,
    /// then record the current instant as its last call.
    ///
    /// Returns the duration waited.
    pub async fn wait_before_call(&self, provider: ProviderId) -> Duration {
        let wait = self
            .last_call(provider)
            .map(|last| self.config.min_spacing.saturating_sub(last.elapsed()))
            .unwrap_or(Duration::ZERO);

        if !wait.is_zero() {
            tracing::debug!(
                provider = %provider,
                wait_ms = wait.as_millis() as u64,
                "Waiting for provider spacing"
            );
            tokio::time::sleep(wait).await;
        }

        self.last_call
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(provider, Instant::now());

        wait
    }

    /// When `provider` was last released by [`wait_before_call`](Self::wait_before_call).
    pub fn last_call(&self, provider: ProviderId) -> Option<Instant> {
        self.last_call
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&provider)
            .copied()
    }

    /// Exponential cooldown for the given retry (0-indexed), capped, no jitter.
    pub fn backoff_without_jitter(&self, retry_count: u32) -> Duration {
        let initial = self.config.initial_cooldown.as_secs_f64();
        let max = self.config.max_cooldown.as_secs_f64();
        let secs = initial * self.config.multiplier.powi(retry_count.min(i32::MAX as u32) as i32);
        if secs.is_finite() && secs >= 0.0 {
            Duration::from_secs_f64(secs.min(max))
        } else {
            self.config.max_cooldown
        }
    }

    /// Exponential cooldown plus uniform jitter in `0..=max_jitter`.
    pub fn compute_backoff(&self, retry_count: u32) -> Duration {
        let jitter_ms = self.config.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.backoff_without_jitter(retry_count) + Duration::from_millis(jitter)
    }
}

// ---------------------------------------------------------------------------
// Server hints
// ---------------------------------------------------------------------------

static HINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:retry[\s_-]*after|retry[\s_-]*delay|retry[\s_-]*in|try\s+again\s+in|wait|available\s+in|cooldown)\b\D{0,30}?(\d+(?:\.\d+)?)\s*(?:(milliseconds?|ms|minutes?|mins?|m|hours?|hrs?|h|seconds?|secs?|s)\b)?",
    )
    .expect("server hint regex is valid")
});

/// Longest wait a server hint can impose.
pub const MAX_SERVER_HINT: Duration = Duration::from_secs(3600);

/// Scan an error body for a server-provided wait such as "retry after 5
/// seconds", `"retryDelay": "17s"` or "cooldown: 30".
///
/// The earliest match in the body wins. Units `ms`, `s`, `m` and `h` (and
/// their spelled-out forms) are understood; a bare number is seconds.
/// Values are capped at [`MAX_SERVER_HINT`]; unrepresentable ones yield `None`.
pub fn parse_server_hint(body: &str) -> Option<Duration> {
    let caps = HINT_RE.captures(body)?;
    let value: f64 = caps.get(1)?.as_str().parse().ok()?;
    let unit = caps
        .get(2)
        .map(|m| m.as_str().to_ascii_lowercase())
        .unwrap_or_default();

    let secs = if unit.starts_with("ms") || unit.starts_with("milli") {
        value / 1000.0
    } else if unit.starts_with('h') {
        value * 3600.0
    } else if unit.starts_with('m') {
        value * 60.0
    } else {
        value
    };
    Duration::try_from_secs_f64(secs)
        .ok()
        .map(|d| d.min(MAX_SERVER_HINT))
}
