//! Utility functions

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Version information for the CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Options for exponential backoff
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffOptions {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    pub jitter: bool,
}

impl Default for BackoffOptions {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            factor: 2.0,
            jitter: true,
        }
    }
}

/// Calculate exponential backoff delay
pub fn calc_exp_backoff(options: &BackoffOptions, attempt: u32) -> Duration {
    let delay_secs = options.min_delay.as_secs_f64() * options.factor.powi(attempt as i32);
    let capped_delay = delay_secs.min(options.max_delay.as_secs_f64());
    Duration::from_secs_f64(capped_delay)
}

/// Stateful backoff counter
///
/// Each call to [`Backoff::next_delay`] grows the delay by `factor` up to
/// `max_delay`. With jitter the delay is drawn uniformly from
/// `[min_delay, computed]`.
#[derive(Debug, Clone)]
pub struct Backoff {
    options: BackoffOptions,
    attempt: u32,
}

/// Used when the configured minimum is zero
pub const FALLBACK_MIN_DELAY: Duration = Duration::from_millis(100);

/// Used when the configured maximum is zero
pub const FALLBACK_MAX_DELAY: Duration = Duration::from_secs(10);

impl Backoff {
    /// Zero bounds fall back to [`FALLBACK_MIN_DELAY`] and
    /// [`FALLBACK_MAX_DELAY`] so a delay is never zero; a maximum below the
    /// minimum is raised to it.
    pub fn new(options: BackoffOptions) -> Self {
        let mut options = options;
        if options.min_delay.is_zero() {
            options.min_delay = FALLBACK_MIN_DELAY;
        }
        if options.max_delay.is_zero() {
            options.max_delay = FALLBACK_MAX_DELAY;
        }
        if options.max_delay < options.min_delay {
            options.max_delay = options.min_delay;
        }
        if !options.factor.is_finite() || options.factor < 1.0 {
            options.factor = BackoffOptions::default().factor;
        }
        Self { options, attempt: 0 }
    }

    pub fn options(&self) -> &BackoffOptions {
        &self.options
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay for the current attempt; advances the attempt counter
    pub fn next_delay(&mut self) -> Duration {
        let delay = calc_exp_backoff(&self.options, self.attempt);
        self.attempt = self.attempt.saturating_add(1);

        if !self.options.jitter || delay <= self.options.min_delay {
            return delay;
        }

        let min = self.options.min_delay.as_secs_f64();
        let spread = delay.as_secs_f64() - min;
        Duration::from_secs_f64(min + rand::thread_rng().gen::<f64>() * spread)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Random alphanumeric token, used for generated passwords and volume suffixes
pub fn generate_secure_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Shorten `text` to at most `max` characters for single-line output
pub fn truncate(text: &str, max: usize) -> String {
    let single_line = text.replace(['\r', '\n'], " ");
    if single_line.chars().count() <= max {
        return single_line;
    }
    let mut out: String = single_line.chars().take(max.saturating_sub(3)).collect();
    out.push_str("...");
    out
}
