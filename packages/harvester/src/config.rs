//! Configuration constants, environment-driven settings and validation
//! functions for the harvester.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::error::{HarvesterError, Result};

/// Seconds to wait between two status queries of the same request.
pub const POLL_INTERVAL_SECS: u64 = 10;

/// Maximum number of status queries before the poller gives up.
///
/// Together with [`POLL_INTERVAL_SECS`] this caps the wait for one request
/// at roughly five minutes.
pub const MAX_POLL_ATTEMPTS: u32 = 30;

/// Attempts made to download and unpack a single package.
pub const PACKAGE_ATTEMPTS: u32 = 3;

/// Seconds to wait between two attempts on the same package.
pub const PACKAGE_RETRY_DELAY_SECS: u64 = 5;

/// Days covered by the default window when no invoice is stored yet.
pub const DEFAULT_WINDOW_DAYS: i64 = 30;

/// RFC pattern: 3 (legal entity) or 4 (individual) letters, birth/incorporation
/// date as YYMMDD, and a 3-character homoclave.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static RFC_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-ZÑ&]{3,4}\d{6}[A-Z0-9]{3}$").expect("valid regex"));

/// Date pattern: YYYY-MM-DD.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static DATE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid regex"));

/// Timing and retry settings for one synchronization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    pub package_attempts: u32,
    pub package_retry_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(POLL_INTERVAL_SECS),
            max_poll_attempts: MAX_POLL_ATTEMPTS,
            package_attempts: PACKAGE_ATTEMPTS,
            package_retry_delay: Duration::from_secs(PACKAGE_RETRY_DELAY_SECS),
        }
    }
}

impl SyncConfig {
    /// Build a config from `CFDI_*` environment variables.
    ///
    /// Unset or unparsable variables fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let poll_interval = env_u64("CFDI_POLL_INTERVAL_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.poll_interval);
        let max_poll_attempts =
            env_u64("CFDI_MAX_POLL_ATTEMPTS").map_or(defaults.max_poll_attempts, saturate_u32);
        let package_attempts =
            env_u64("CFDI_PACKAGE_ATTEMPTS").map_or(defaults.package_attempts, saturate_u32);
        let package_retry_delay = env_u64("CFDI_PACKAGE_RETRY_DELAY_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.package_retry_delay);

        Self {
            poll_interval,
            max_poll_attempts: max_poll_attempts.max(1),
            package_attempts: package_attempts.max(1),
            package_retry_delay,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Zero is clamped to one attempt.
    pub fn with_max_poll_attempts(mut self, attempts: u32) -> Self {
        self.max_poll_attempts = attempts.max(1);
        self
    }

    /// Zero is clamped to one attempt.
    pub fn with_package_attempts(mut self, attempts: u32) -> Self {
        self.package_attempts = attempts.max(1);
        self
    }

    pub fn with_package_retry_delay(mut self, delay: Duration) -> Self {
        self.package_retry_delay = delay;
        self
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn saturate_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// Validate an RFC (tax identifier).
///
/// # Examples
/// ```
/// use cfdi_harvester::config::validate_rfc;
///
/// assert!(validate_rfc("EKU9003173C9").is_ok());
/// assert!(validate_rfc("VADA800927HS1").is_ok());
/// assert!(validate_rfc("eku9003173c9").is_err());
/// ```
pub fn validate_rfc(rfc: &str) -> Result<()> {
    if RFC_PATTERN.is_match(rfc) {
        Ok(())
    } else {
        Err(HarvesterError::InvalidRfc(rfc.to_string()))
    }
}

/// Validate date format (YYYY-MM-DD) and that it names a real calendar day.
///
/// # Examples
/// ```
/// use cfdi_harvester::config::validate_date;
///
/// assert!(validate_date("2025-01-01").is_ok());
/// assert!(validate_date("invalid").is_err());
/// assert!(validate_date("2025-13-01").is_err());
/// ```
pub fn validate_date(date_str: &str) -> Result<chrono::NaiveDate> {
    if !DATE_PATTERN.is_match(date_str) {
        return Err(HarvesterError::InvalidDate(date_str.to_string()));
    }

    chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .map_err(|_| HarvesterError::InvalidDate(date_str.to_string()))
}
