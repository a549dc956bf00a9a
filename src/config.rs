use clap::Parser;
use std::time::Duration;

use crate::cricket::StatusVocabulary;
use crate::relay::{PollConfig, RetryPolicy};

/// Cricket live-score relay
#[derive(Parser, Debug, Clone)]
#[command(name = "cricket-relay", version, about)]
pub struct Config {
    /// REST + WebSocket listen address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:3000")]
    pub listen_addr: String,

    /// api-cricket base URL
    #[arg(
        long,
        env = "CRICKET_API_URL",
        default_value = "https://apiv2.api-cricket.com/cricket/"
    )]
    pub api_url: String,

    /// api-cricket API key
    #[arg(long, env = "CRICKET_API_KEY")]
    pub api_key: Option<String>,

    /// Match list refresh interval in seconds
    #[arg(long, env = "LIST_INTERVAL_SECS", default_value = "30")]
    pub list_interval_secs: u64,

    /// Live match detail refresh interval in milliseconds
    #[arg(long, env = "DETAIL_INTERVAL_MS", default_value = "5000")]
    pub detail_interval_ms: u64,

    /// Live scorecard refresh interval in milliseconds
    #[arg(long, env = "SCORECARD_INTERVAL_MS", default_value = "3000")]
    pub scorecard_interval_ms: u64,

    /// Days either side of today included in the match list
    #[arg(long, env = "WINDOW_DAYS", default_value = "14")]
    pub window_days: u64,

    /// Retries for a failed match list fetch
    #[arg(long, env = "LIST_RETRIES", default_value = "3")]
    pub list_retries: u32,

    /// Delay between match list retries in milliseconds
    #[arg(long, env = "LIST_RETRY_DELAY_MS", default_value = "5000")]
    pub list_retry_delay_ms: u64,

    /// Retries for a failed detail/scorecard fetch
    #[arg(long, env = "FETCH_RETRIES", default_value = "2")]
    pub fetch_retries: u32,

    /// Delay between detail/scorecard retries in milliseconds
    #[arg(long, env = "FETCH_RETRY_DELAY_MS", default_value = "3000")]
    pub fetch_retry_delay_ms: u64,

    /// Upper bound on concurrent upstream detail/scorecard requests
    #[arg(long, env = "MAX_CONCURRENT_FETCHES", default_value = "8")]
    pub max_concurrent_fetches: usize,

    /// Provider statuses that mean a match is in play (case-insensitive)
    #[arg(
        long,
        env = "LIVE_STATUSES",
        value_delimiter = ',',
        default_value = "in progress,live"
    )]
    pub live_statuses: Vec<String>,

    /// Provider statuses that mean a match is over (case-insensitive)
    #[arg(
        long,
        env = "FINISHED_STATUSES",
        value_delimiter = ',',
        default_value = "finished,ended,cancelled,abandoned,no result"
    )]
    pub finished_statuses: Vec<String>,

    /// Also require `event_live == "1"` before treating a match as live
    #[arg(long, env = "REQUIRE_LIVE_FLAG", default_value = "false")]
    pub require_live_flag: bool,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.api_key()?;
        if self.list_interval_secs == 0 {
            anyhow::bail!("list_interval_secs must be positive");
        }
        if self.detail_interval_ms == 0 || self.scorecard_interval_ms == 0 {
            anyhow::bail!("detail_interval_ms and scorecard_interval_ms must be positive");
        }
        if self.max_concurrent_fetches == 0 {
            anyhow::bail!("max_concurrent_fetches must be at least 1");
        }
        if self.live_statuses.iter().all(|s| s.trim().is_empty()) {
            anyhow::bail!("live_statuses must name at least one status");
        }
        Ok(())
    }

    pub fn api_key(&self) -> anyhow::Result<&str> {
        match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key),
            _ => anyhow::bail!("CRICKET_API_KEY is required"),
        }
    }

    pub fn vocabulary(&self) -> StatusVocabulary {
        StatusVocabulary::new(
            &self.live_statuses,
            &self.finished_statuses,
            self.require_live_flag,
        )
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            list_interval: Duration::from_secs(self.list_interval_secs),
            detail_interval: Duration::from_millis(self.detail_interval_ms),
            scorecard_interval: Duration::from_millis(self.scorecard_interval_ms),
            window_days: self.window_days,
            list_retry: RetryPolicy {
                retries: self.list_retries,
                delay: Duration::from_millis(self.list_retry_delay_ms),
            },
            fetch_retry: RetryPolicy {
                retries: self.fetch_retries,
                delay: Duration::from_millis(self.fetch_retry_delay_ms),
            },
            max_concurrent_fetches: self.max_concurrent_fetches,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cricket::models::MatchStatus;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["cricket-relay"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults_match_poll_defaults() {
        let cfg = parse(&["--api-key", "k"]);
        cfg.validate().unwrap();
        let poll = cfg.poll_config();
        let defaults = PollConfig::default();
        assert_eq!(poll.list_interval, defaults.list_interval);
        assert_eq!(poll.detail_interval, defaults.detail_interval);
        assert_eq!(poll.scorecard_interval, defaults.scorecard_interval);
        assert_eq!(poll.list_retry, defaults.list_retry);
        assert_eq!(poll.fetch_retry, defaults.fetch_retry);
        assert_eq!(poll.window_days, 14);
    }

    #[test]
    fn test_missing_api_key_is_rejected() {
        let cfg = Config {
            api_key: Some("  ".into()),
            ..parse(&[])
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let cfg = parse(&["--api-key", "k", "--detail-interval-ms", "0"]);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_status_lists_are_comma_separated() {
        let cfg = parse(&["--api-key", "k", "--live-statuses", "Stumps,Innings Break"]);
        let vocab = cfg.vocabulary();
        assert_eq!(vocab.classify("stumps"), MatchStatus::Live);
        assert_eq!(vocab.classify("innings break"), MatchStatus::Live);
        assert_eq!(vocab.classify("in progress"), MatchStatus::Unknown);
        assert_eq!(vocab.classify("Finished"), MatchStatus::Finished);
    }
}
