use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::models::{MatchDetail, MatchSummary, Scorecard, StatusVocabulary};
use super::provider::{CricketProvider, ListQuery};
use crate::error::FetchError;

/// Cricket data provider backed by the api-cricket.com v2 REST API.
/// Docs: <https://api-cricket.com/documentation.php>
pub struct ApiCricket {
    http: Client,
    api_key: String,
    base_url: Url,
    vocab: StatusVocabulary,
}

impl ApiCricket {
    pub fn new(base_url: &str, api_key: &str, vocab: StatusVocabulary) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        let base_url = Url::parse(base_url).context("Invalid cricket API base URL")?;
        Ok(ApiCricket {
            http,
            api_key: api_key.to_string(),
            base_url,
            vocab,
        })
    }

    fn method_url(&self, method: &str, params: &[(&str, &str)]) -> Url {
        let mut url = self.base_url.clone();
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("method", method);
            q.append_pair("APIkey", &self.api_key);
            for (k, v) in params {
                q.append_pair(k, v);
            }
        }
        url
    }

    async fn get_json(&self, method: &str, params: &[(&str, &str)]) -> Result<Value, FetchError> {
        let url = self.method_url(method, params);
        debug!("api-cricket {} {:?}", method, params);

        let resp = self.http.get(url).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Upstream {
                status: Some(status.as_u16()),
                message: body,
            });
        }

        let raw: Value = resp
            .json()
            .await
            .map_err(|e| FetchError::Malformed(e.to_string()))?;

        check_success(&raw)?;
        Ok(raw)
    }

    async fn fetch_event(&self, event_key: &str) -> Result<Value, FetchError> {
        let raw = self.get_json("get_event", &[("event_key", event_key)]).await?;
        parse_event(&raw)
    }
}

#[async_trait]
impl CricketProvider for ApiCricket {
    fn name(&self) -> &str {
        "api-cricket"
    }

    async fn fetch_list(&self, query: &ListQuery) -> Result<Vec<MatchSummary>, FetchError> {
        let mut params = vec![
            ("date_start", query.date_start.as_str()),
            ("date_stop", query.date_stop.as_str()),
        ];
        if let Some(league) = query.league_key.as_deref() {
            params.push(("league_key", league));
        }
        if let Some(event) = query.event_key.as_deref() {
            params.push(("event_key", event));
        }
        let raw = self.get_json("get_events", &params).await?;
        parse_event_list(&raw, &self.vocab)
    }

    async fn fetch_detail(&self, event_key: &str) -> Result<MatchDetail, FetchError> {
        let payload = self.fetch_event(event_key).await?;
        Ok(MatchDetail {
            event_key: event_key.to_string(),
            payload,
        })
    }

    async fn fetch_scorecard(&self, event_key: &str) -> Result<Scorecard, FetchError> {
        let payload = self.fetch_event(event_key).await?;
        Ok(Scorecard::from_event(event_key, &payload))
    }

    async fn fetch_h2h(
        &self,
        first_team_key: &str,
        second_team_key: &str,
    ) -> Result<Value, FetchError> {
        self.get_json(
            "get_H2H",
            &[
                ("first_team_key", first_team_key),
                ("second_team_key", second_team_key),
            ],
        )
        .await
    }

    async fn fetch_standings(&self, league_key: &str) -> Result<Value, FetchError> {
        self.get_json("get_standings", &[("league_key", league_key)])
            .await
    }
}

/// api-cricket reports logical failures (bad key, unknown method) with a
/// 200 status and `success: 0`.
fn check_success(raw: &Value) -> Result<(), FetchError> {
    let failed = match &raw["success"] {
        Value::Number(n) => n.as_i64() == Some(0),
        Value::String(s) => s == "0",
        Value::Bool(b) => !b,
        _ => false,
    };
    if !failed {
        return Ok(());
    }
    let message = raw["error"]
        .as_array()
        .and_then(|errs| errs.first())
        .and_then(|e| e["msg"].as_str())
        .or_else(|| raw["error"].as_str())
        .unwrap_or("request rejected")
        .to_string();
    Err(FetchError::Upstream {
        status: None,
        message,
    })
}

fn parse_event_list(raw: &Value, vocab: &StatusVocabulary) -> Result<Vec<MatchSummary>, FetchError> {
    let events = match &raw["result"] {
        Value::Array(a) => a,
        Value::Null => return Ok(vec![]),
        other => {
            return Err(FetchError::Malformed(format!(
                "get_events result is not an array: {}",
                type_name(other)
            )))
        }
    };

    let summaries = events
        .iter()
        .filter_map(|ev| {
            let summary = MatchSummary::from_value(ev.clone(), vocab);
            if summary.is_none() {
                debug!("Skipping get_events entry without event_key");
            }
            summary
        })
        .collect();

    Ok(summaries)
}

fn parse_event(raw: &Value) -> Result<Value, FetchError> {
    match &raw["result"] {
        Value::Array(a) => a
            .first()
            .cloned()
            .ok_or_else(|| FetchError::Malformed("get_event returned an empty result".into())),
        Value::Object(_) => Ok(raw["result"].clone()),
        other => Err(FetchError::Malformed(format!(
            "get_event result has unexpected type: {}",
            type_name(other)
        ))),
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cricket::models::MatchStatus;
    use serde_json::json;

    #[test]
    fn test_method_url_encodes_params() {
        let api = ApiCricket::new(
            "https://apiv2.api-cricket.com/cricket/",
            "k3y",
            StatusVocabulary::default(),
        )
        .unwrap();
        let url = api.method_url(
            "get_events",
            &[("date_start", "2024-01-01"), ("league_key", "a b")],
        );
        assert_eq!(url.path(), "/cricket/");
        assert_eq!(
            url.query(),
            Some("method=get_events&APIkey=k3y&date_start=2024-01-01&league_key=a+b")
        );
    }

    #[test]
    fn test_new_rejects_bad_base_url() {
        assert!(ApiCricket::new("not a url", "k", StatusVocabulary::default()).is_err());
    }

    #[test]
    fn test_parse_event_list() {
        let raw = json!({
            "success": 1,
            "result": [
                {"event_key": "1", "event_status": "Finished", "event_home_team": "India"},
                {"event_key": 2, "event_status": "In Progress", "event_live": "1"},
                {"event_status": "Live"}
            ]
        });
        let list = parse_event_list(&raw, &StatusVocabulary::default()).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].status, MatchStatus::Finished);
        assert_eq!(list[1].event_key, "2");
        assert_eq!(list[1].status, MatchStatus::Live);
        assert!(list[1].event_live);
    }

    #[test]
    fn test_parse_event_list_without_result_is_empty() {
        let list = parse_event_list(&json!({"success": 1}), &StatusVocabulary::default()).unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn test_parse_event_list_rejects_non_array() {
        let err = parse_event_list(&json!({"result": "nope"}), &StatusVocabulary::default())
            .unwrap_err();
        assert!(matches!(err, FetchError::Malformed(_)));
    }

    #[test]
    fn test_parse_event_accepts_array_or_object() {
        let from_array = parse_event(&json!({"result": [{"event_key": "9"}]})).unwrap();
        assert_eq!(from_array["event_key"], "9");
        let from_object = parse_event(&json!({"result": {"event_key": "9"}})).unwrap();
        assert_eq!(from_object["event_key"], "9");
        assert!(matches!(
            parse_event(&json!({"result": []})),
            Err(FetchError::Malformed(_))
        ));
    }

    #[test]
    fn test_check_success() {
        assert!(check_success(&json!({"success": 1, "result": []})).is_ok());
        assert!(check_success(&json!({"result": []})).is_ok());
        let err = check_success(&json!({
            "success": 0,
            "error": [{"param": "APIkey", "msg": "Invalid API Key", "cod": 1002}]
        }))
        .unwrap_err();
        match err {
            FetchError::Upstream { status, message } => {
                assert_eq!(status, None);
                assert_eq!(message, "Invalid API Key");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
