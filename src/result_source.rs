// ============================================================================
// External Result Source - wagermatch
// ============================================================================
//
// Narrow client for the authoritative game-result provider. The engine
// never computes outcomes itself: for a wager's two external tags and time
// window, the provider reports no result yet, a verified winner tag, or a
// verified draw. One call per settlement attempt.
//
// Mock mode short-circuits to "no result yet" so the engine runs without
// provider credentials in development.
//
// ============================================================================

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::config::Config;
use crate::errors::EngineError;

/// What the provider reported for a wager's time window
#[derive(Debug, Clone, PartialEq)]
pub enum ReportedResult {
    /// No verified outcome yet
    NoResult,
    /// A verified winner, identified by external tag
    Winner { tag: String, event_time: DateTime<Utc> },
    /// A verified draw
    Draw { event_time: DateTime<Utc> },
}

/// HTTP client for the result provider
pub struct ResultClient {
    base_url: String,
    api_key: String,
    mock: bool,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ResultResponse {
    status: String,
    winner_tag: Option<String>,
    event_time: Option<DateTime<Utc>>,
}

impl ResultClient {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.result_api_url.clone(),
            api_key: config.result_api_key.clone(),
            mock: config.result_mock_mode,
            client: reqwest::Client::new(),
        }
    }

    /// Fetch the verified outcome for a tag pair within a time window.
    pub async fn fetch_result(
        &self,
        tag1: &str,
        tag2: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<ReportedResult, EngineError> {
        if self.mock {
            return Ok(ReportedResult::NoResult);
        }

        let url = format!("{}/results", self.base_url);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(&[
                ("players", format!("{},{}", tag1, tag2)),
                ("from", window_start.to_rfc3339()),
                ("to", window_end.to_rfc3339()),
            ])
            .send()
            .await
            .map_err(|e| EngineError::ResultSourceUnavailable { detail: e.to_string() })?;

        if !resp.status().is_success() {
            return Err(EngineError::ResultSourceUnavailable {
                detail: format!("provider returned {}", resp.status()),
            });
        }

        let body: ResultResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::ResultSourceUnavailable { detail: e.to_string() })?;

        match body.status.as_str() {
            "pending" => Ok(ReportedResult::NoResult),
            "winner" => {
                let tag = body.winner_tag.ok_or_else(|| EngineError::VerificationFailed {
                    reason: "provider reported a winner without a tag".to_string(),
                })?;
                let event_time =
                    body.event_time.ok_or_else(|| EngineError::VerificationFailed {
                        reason: "provider reported a winner without an event time".to_string(),
                    })?;
                Ok(ReportedResult::Winner { tag, event_time })
            }
            "draw" => {
                let event_time =
                    body.event_time.ok_or_else(|| EngineError::VerificationFailed {
                        reason: "provider reported a draw without an event time".to_string(),
                    })?;
                Ok(ReportedResult::Draw { event_time })
            }
            other => Err(EngineError::VerificationFailed {
                reason: format!("provider returned unknown status '{}'", other),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_mode_reports_no_result() {
        let config = Config { result_mock_mode: true, ..Config::default() };
        let client = ResultClient::from_config(&config);
        let now = Utc::now();

        let result =
            tokio_test::block_on(client.fetch_result("#A", "#B", now, now)).unwrap();
        assert_eq!(result, ReportedResult::NoResult);
    }
}
