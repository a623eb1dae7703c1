// Engine configuration loaded from environment variables.
//
// Money bounds are expressed in minor units (cents); the env vars take
// major units to stay readable in .env files.

use chrono::Duration;

/// Runtime configuration for the wagering engine
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,

    /// Platform fee withheld from the winner's pot, in basis points
    pub platform_fee_bps: u64,

    /// Minimum / maximum stake per wager, minor units
    pub min_bet: u64,
    pub max_bet: u64,

    /// Largest single deposit the engine will record, minor units
    pub max_deposit: u64,

    /// How long an active wager waits for a result before expiring
    pub match_timeout_secs: i64,

    /// How long a queue entry may wait before eviction
    pub queue_timeout_secs: i64,

    /// How long a dispute stays open before the default void applies
    pub dispute_timeout_secs: i64,

    /// Background sweep cadence
    pub sweep_interval_secs: u64,

    /// Snapshot file for state persistence
    pub data_file: String,

    /// External result source
    pub result_api_url: String,
    pub result_api_key: String,
    pub result_mock_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            platform_fee_bps: 1000, // 10%
            min_bet: 100,           // 1.00
            max_bet: 10_000,        // 100.00
            max_deposit: 100_000,   // 1000.00
            match_timeout_secs: 10 * 60,
            queue_timeout_secs: 15 * 60,
            dispute_timeout_secs: 24 * 60 * 60,
            sweep_interval_secs: 30,
            data_file: "data/state.json".to_string(),
            result_api_url: "https://api.example-arena.com/v1".to_string(),
            result_api_key: String::new(),
            result_mock_mode: true,
        }
    }
}

impl Config {
    /// Build configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Config::default();

        Self {
            host: env_or("HOST", defaults.host),
            port: env_parsed("PORT", defaults.port),
            platform_fee_bps: env_fee_bps(defaults.platform_fee_bps),
            min_bet: env_money_minor("MIN_BET_AMOUNT", defaults.min_bet),
            max_bet: env_money_minor("MAX_BET_AMOUNT", defaults.max_bet),
            max_deposit: env_money_minor("MAX_DEPOSIT_AMOUNT", defaults.max_deposit),
            match_timeout_secs: env_parsed::<i64>("MATCH_TIMEOUT_MINUTES", 10) * 60,
            queue_timeout_secs: env_parsed::<i64>("QUEUE_TIMEOUT_MINUTES", 15) * 60,
            dispute_timeout_secs: env_parsed::<i64>("DISPUTE_TIMEOUT_MINUTES", 24 * 60) * 60,
            sweep_interval_secs: env_parsed("SWEEP_INTERVAL_SECONDS", defaults.sweep_interval_secs),
            data_file: env_or("DATA_FILE", defaults.data_file),
            result_api_url: env_or("RESULT_API_URL", defaults.result_api_url),
            result_api_key: env_or("RESULT_API_KEY", defaults.result_api_key),
            result_mock_mode: std::env::var("RESULT_MOCK_MODE")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.result_mock_mode),
        }
    }

    pub fn match_timeout(&self) -> Duration {
        Duration::seconds(self.match_timeout_secs)
    }

    pub fn queue_timeout(&self) -> Duration {
        Duration::seconds(self.queue_timeout_secs)
    }

    pub fn dispute_timeout(&self) -> Duration {
        Duration::seconds(self.dispute_timeout_secs)
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// PLATFORM_FEE_PERCENTAGE is a percentage (e.g. "10.0"); stored as bps.
fn env_fee_bps(default_bps: u64) -> u64 {
    std::env::var("PLATFORM_FEE_PERCENTAGE")
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .map(|pct| (pct * 100.0).round() as u64)
        .unwrap_or(default_bps)
}

/// Money env vars are major units (e.g. "100.0"); stored as minor units.
fn env_money_minor(key: &str, default_minor: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .map(|major| (major * 100.0).round() as u64)
        .unwrap_or(default_minor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_bounds() {
        let cfg = Config::default();
        assert_eq!(cfg.platform_fee_bps, 1000);
        assert_eq!(cfg.min_bet, 100);
        assert_eq!(cfg.max_bet, 10_000);
        assert_eq!(cfg.match_timeout_secs, 600);
    }

    #[test]
    fn test_duration_helpers() {
        let cfg = Config::default();
        assert_eq!(cfg.match_timeout().num_minutes(), 10);
        assert_eq!(cfg.dispute_timeout().num_hours(), 24);
    }
}
