pub mod api_cricket;
pub mod models;
pub mod provider;

pub use api_cricket::ApiCricket;
pub use models::{MatchDetail, MatchSummary, Scorecard, StatusVocabulary};
pub use provider::{CricketProvider, ListQuery};
