use serde::{Serialize, Serializer};
use serde_json::Value;

/// Lifecycle of a match as far as the relay cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Scheduled,
    Live,
    Finished,
    Unknown,
}

/// Provider status strings mapped onto [`MatchStatus`].
///
/// api-cricket's status vocabulary is free text ("In Progress", "Finished",
/// "Live", sometimes blank) and the `event_live` flag is not always set
/// consistently, so both the word lists and the flag requirement are
/// configuration rather than constants.
#[derive(Debug, Clone)]
pub struct StatusVocabulary {
    live: Vec<String>,
    finished: Vec<String>,
    scheduled: Vec<String>,
    require_live_flag: bool,
}

impl Default for StatusVocabulary {
    fn default() -> Self {
        StatusVocabulary::new(
            &["in progress".to_string(), "live".to_string()],
            &[
                "finished".to_string(),
                "ended".to_string(),
                "cancelled".to_string(),
                "abandoned".to_string(),
                "no result".to_string(),
            ],
            false,
        )
    }
}

impl StatusVocabulary {
    pub fn new(live: &[String], finished: &[String], require_live_flag: bool) -> Self {
        StatusVocabulary {
            live: normalize_words(live),
            finished: normalize_words(finished),
            scheduled: vec![
                String::new(),
                "not started".to_string(),
                "scheduled".to_string(),
            ],
            require_live_flag,
        }
    }

    pub fn classify(&self, raw: &str) -> MatchStatus {
        let s = raw.trim().to_lowercase();
        if self.live.contains(&s) {
            MatchStatus::Live
        } else if self.finished.contains(&s) {
            MatchStatus::Finished
        } else if self.scheduled.contains(&s) {
            MatchStatus::Scheduled
        } else {
            MatchStatus::Unknown
        }
    }

    /// Whether a summary counts towards the live set.
    pub fn is_live(&self, summary: &MatchSummary) -> bool {
        summary.status == MatchStatus::Live && (!self.require_live_flag || summary.event_live)
    }
}

fn normalize_words(words: &[String]) -> Vec<String> {
    words
        .iter()
        .map(|w| w.trim().to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

/// One entry of a `get_events` batch.
///
/// The typed fields are projections used by the relay; `raw` is what
/// clients receive and what change detection compares.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchSummary {
    pub event_key: String,
    pub status: MatchStatus,
    pub status_text: String,
    pub event_live: bool,
    pub home_team: String,
    pub away_team: String,
    pub league_key: Option<String>,
    pub league_name: Option<String>,
    pub raw: Value,
}

impl MatchSummary {
    /// Build a summary from a provider object. Returns `None` when the
    /// entry has no usable `event_key`.
    pub fn from_value(raw: Value, vocab: &StatusVocabulary) -> Option<MatchSummary> {
        let event_key = key_string(&raw["event_key"])?;
        let status_text = raw["event_status"].as_str().unwrap_or("").to_string();
        let status = vocab.classify(&status_text);
        let event_live = flag(&raw["event_live"]);
        let home_team = raw["event_home_team"].as_str().unwrap_or("").to_string();
        let away_team = raw["event_away_team"].as_str().unwrap_or("").to_string();
        let league_key = key_string(&raw["league_key"]);
        let league_name = raw["league_name"].as_str().map(str::to_string);

        Some(MatchSummary {
            event_key,
            status,
            status_text,
            event_live,
            home_team,
            away_team,
            league_key,
            league_name,
            raw,
        })
    }

    /// Canonical serialized form. `serde_json::Value` objects keep their
    /// keys sorted, so equal payloads always produce equal bytes.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(&self.raw).unwrap_or_default()
    }

    /// Byte-for-byte comparison of the canonical forms.
    pub fn same_content(&self, other: &MatchSummary) -> bool {
        self.canonical_bytes() == other.canonical_bytes()
    }
}

impl Serialize for MatchSummary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

/// Full `get_event` payload for one match.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchDetail {
    pub event_key: String,
    pub payload: Value,
}

impl Serialize for MatchDetail {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.payload.serialize(serializer)
    }
}

/// Innings-level breakdown extracted from a `get_event` payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scorecard {
    #[serde(skip)]
    pub event_key: String,
    pub scorecard: Value,
    pub innings: Value,
    pub extra: Value,
    pub batsmen: Vec<Value>,
    pub bowlers: Vec<Value>,
}

impl Scorecard {
    pub fn from_event(event_key: &str, payload: &Value) -> Scorecard {
        Scorecard {
            event_key: event_key.to_string(),
            scorecard: object_or_empty(&payload["scorecard"]),
            innings: object_or_empty(&payload["innings"]),
            extra: object_or_empty(&payload["extra"]),
            batsmen: array_or_empty(&payload["batsmen"]),
            bowlers: array_or_empty(&payload["bowlers"]),
        }
    }
}

/// api-cricket sends keys as strings in some methods and integers in others.
pub fn key_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn flag(v: &Value) -> bool {
    match v {
        Value::String(s) => s.trim() == "1" || s.eq_ignore_ascii_case("true"),
        Value::Number(n) => n.as_i64() == Some(1),
        Value::Bool(b) => *b,
        _ => false,
    }
}

fn object_or_empty(v: &Value) -> Value {
    match v {
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    }
}

fn array_or_empty(v: &Value) -> Vec<Value> {
    v.as_array().cloned().unwrap_or_default()
}
