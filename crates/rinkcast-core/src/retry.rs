//! Retry configuration and backoff calculation.
//!
//! Portable, sync-only building blocks for retry logic. The async retry
//! execution lives in `rinkcast-agents` (which has access to tokio); this
//! module contains the math:
//!
//! - [`RetryConfig`]: retry parameters (max retries, backoff, jitter)
//! - [`calculate_backoff_delay`]: exponential backoff with jitter

use serde::{Deserialize, Serialize};

/// Default maximum retries for collaborator calls.
pub const DEFAULT_MAX_RETRIES: u32 = 2;
/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 500;
/// Default maximum delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 8_000;
/// Default jitter factor (0.0–1.0).
pub const DEFAULT_JITTER_FACTOR: f64 = 0.2;

/// Configuration for retry logic.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Maximum number of retry attempts.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay for exponential backoff in ms.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Maximum delay between retries in ms.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Jitter factor 0.0–1.0.
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}
fn default_jitter_factor() -> f64 {
    DEFAULT_JITTER_FACTOR
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

/// Calculate exponential backoff delay with jitter.
///
/// Formula: `min(max_delay, base_delay * 2^attempt) * (1 + (random*2-1) * jitter)`
///
/// `random` should be a value in `[0.0, 1.0)` from a PRNG; the jitter maps
/// it symmetrically to `[-jitter, +jitter]`.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn calculate_backoff_delay(
    attempt: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter_factor: f64,
    random: f64,
) -> u64 {
    let exponential = base_delay_ms.saturating_mul(1u64 << attempt.min(31));
    let capped = exponential.min(max_delay_ms);

    let jitter = 1.0 + (random * 2.0 - 1.0) * jitter_factor;
    let with_jitter = (capped as f64) * jitter;

    with_jitter.round().max(0.0) as u64
}

impl RetryConfig {
    /// Backoff delay for a zero-based attempt index using this config.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32, random: f64) -> u64 {
        calculate_backoff_delay(
            attempt,
            self.base_delay_ms,
            self.max_delay_ms,
            self.jitter_factor,
            random,
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_config_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.base_delay_ms, 500);
        assert_eq!(config.max_delay_ms, 8_000);
        assert!((config.jitter_factor - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn retry_config_serde_defaults() {
        let config: RetryConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.base_delay_ms, 500);
    }

    #[test]
    fn backoff_exponential_growth() {
        // random = 0.5 → jitter factor 1.0, delays are exact powers of 2
        let d0 = calculate_backoff_delay(0, 500, 8_000, 0.2, 0.5);
        let d1 = calculate_backoff_delay(1, 500, 8_000, 0.2, 0.5);
        let d2 = calculate_backoff_delay(2, 500, 8_000, 0.2, 0.5);
        assert_eq!(d0, 500);
        assert_eq!(d1, 1000);
        assert_eq!(d2, 2000);
    }

    #[test]
    fn backoff_caps_at_max() {
        let delay = calculate_backoff_delay(10, 500, 8_000, 0.0, 0.5);
        assert_eq!(delay, 8_000);
    }

    #[test]
    fn backoff_jitter_bounds() {
        // random = 0.0 → 1 - 0.2 = 0.8×; random = 1.0 → 1.2×
        assert_eq!(calculate_backoff_delay(0, 1000, 60_000, 0.2, 0.0), 800);
        assert_eq!(calculate_backoff_delay(0, 1000, 60_000, 0.2, 1.0), 1200);
    }

    #[test]
    fn backoff_high_attempt_no_overflow() {
        let delay = calculate_backoff_delay(100, 500, 8_000, 0.2, 0.5);
        assert!(delay > 0);
        assert!(delay <= 9_600);
    }

    #[test]
    fn delay_for_attempt_uses_config() {
        let config = RetryConfig {
            max_retries: 2,
            base_delay_ms: 100,
            max_delay_ms: 1000,
            jitter_factor: 0.0,
        };
        assert_eq!(config.delay_for_attempt(0, 0.5), 100);
        assert_eq!(config.delay_for_attempt(1, 0.5), 200);
        assert_eq!(config.delay_for_attempt(5, 0.5), 1000);
    }
}
