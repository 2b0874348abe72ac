//! Reconnection backoff calculation.
//!
//! Pure, sync-only math: the channel crate owns the actual timers and the
//! randomness source. Splitting the formula from the RNG keeps the bounds
//! testable without seeding.
//!
//! Formula for attempt `n` (0-indexed): `min(base * 2^n, max)` scaled by a
//! symmetric jitter of ±`jitter_factor`, floored at `floor_ms`. With the
//! defaults that is `min(2^n, 30)` seconds ± 25%, never below 750 ms.

use serde::{Deserialize, Serialize};

/// Default base delay in milliseconds (first retry ≈ 1 s).
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default maximum delay in milliseconds (cap at 30 s).
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
/// Default jitter factor (±25%).
pub const DEFAULT_JITTER_FACTOR: f64 = 0.25;
/// Default delay floor in milliseconds.
pub const DEFAULT_FLOOR_MS: u64 = 750;

/// Reconnection backoff parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconnectPolicy {
    /// Base delay for exponential backoff in ms.
    pub base_delay_ms: u64,
    /// Maximum delay between attempts in ms.
    pub max_delay_ms: u64,
    /// Jitter factor 0.0–1.0, applied symmetrically.
    pub jitter_factor: f64,
    /// Lower bound on any computed delay in ms.
    pub floor_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
            floor_ms: DEFAULT_FLOOR_MS,
        }
    }
}

impl ReconnectPolicy {
    /// Delay for attempt `n` with explicit randomness in `[0.0, 1.0)`.
    #[must_use]
    pub fn delay_ms(&self, attempt: u32, random: f64) -> u64 {
        backoff_delay_ms_with_random(
            attempt,
            self.base_delay_ms,
            self.max_delay_ms,
            self.jitter_factor,
            random,
        )
        .max(self.floor_ms)
    }
}

/// Calculate exponential backoff delay with explicit randomness.
///
/// `random` should be a value in `[0.0, 1.0)` from a PRNG. It maps to a
/// jitter multiplier in `[1 - jitter_factor, 1 + jitter_factor)`.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn backoff_delay_ms_with_random(
    attempt: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter_factor: f64,
    random: f64,
) -> u64 {
    let exponential = base_delay_ms.saturating_mul(1u64 << attempt.min(31));
    let capped = exponential.min(max_delay_ms);

    // Jitter: (1 + (random * 2 - 1) * jitter_factor)
    // Maps random [0,1) to [-jitter, +jitter)
    let jitter = 1.0 + (random * 2.0 - 1.0) * jitter_factor;
    let with_jitter = (capped as f64) * jitter;

    with_jitter.round().max(0.0) as u64
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
