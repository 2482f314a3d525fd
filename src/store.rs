use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::batch::{CommitReceipt, ScoringBatch};
use crate::error::Result;
use crate::model::{Match, Prediction, PredictionPayload, UserAggregate};
use crate::scoring::ScoringRules;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionFilter<'a> {
    All,
    Match(&'a str),
    User(&'a str),
}

impl PredictionFilter<'_> {
    pub fn accepts(&self, prediction: &Prediction) -> bool {
        match self {
            PredictionFilter::All => true,
            PredictionFilter::Match(id) => prediction.match_id == *id,
            PredictionFilter::User(id) => prediction.user_id == *id,
        }
    }
}

/// One committed scoring pass, as recorded alongside the batch it describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringRun {
    pub kind: String,
    pub match_id: Option<String>,
    pub predictions_scored: usize,
    pub aggregates_written: usize,
    pub committed_at: String,
}

/// Storage seam used by both scoring passes.
///
/// Reads are point-in-time snapshots. The only write is [`ScoreStore::commit`],
/// which must apply the whole batch or leave every collection untouched.
/// Callers serialize passes; implementations need not guard against two
/// batches computed from the same snapshot.
pub trait ScoreStore {
    fn load_match(&self, match_id: &str) -> Result<Option<Match>>;

    fn load_matches(&self) -> Result<Vec<Match>>;

    fn load_completed_matches(&self) -> Result<Vec<Match>> {
        Ok(self
            .load_matches()?
            .into_iter()
            .filter(Match::is_completed)
            .collect())
    }

    fn load_predictions(&self, filter: PredictionFilter<'_>) -> Result<Vec<Prediction>>;

    /// Aggregates for the given users. Unknown ids are simply absent from the map.
    fn load_aggregates(&self, user_ids: &[String]) -> Result<HashMap<String, UserAggregate>>;

    fn load_all_aggregates(&self) -> Result<Vec<UserAggregate>>;

    fn load_rules(&self) -> Result<ScoringRules>;

    fn recent_runs(&self, limit: usize) -> Result<Vec<ScoringRun>>;

    fn commit(&mut self, batch: &ScoringBatch) -> Result<CommitReceipt>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFixture {
    pub match_id: String,
    pub team_a: String,
    pub team_b: String,
    pub kickoff_utc: String,
    pub stage_id: String,
}

/// Writes that belong to the surfaces around the engine: sign-up, schedule entry,
/// prediction submission and rule settings. None of them can reach derived fields.
pub trait SubmissionStore {
    /// Creates a zeroed aggregate, or renames an existing one.
    fn register_user(&mut self, user_id: &str, display_name: &str) -> Result<()>;

    /// Inserts an upcoming fixture, or refreshes metadata of an existing one.
    fn add_fixture(&mut self, fixture: &NewFixture) -> Result<()>;

    /// Stores the payload only. Rejected once the match is completed.
    fn submit_prediction(
        &mut self,
        match_id: &str,
        user_id: &str,
        payload: &PredictionPayload,
    ) -> Result<()>;

    fn save_rules(&mut self, rules: &ScoringRules) -> Result<()>;
}

/// Leaderboard order: total points, then perfect count, then user id.
pub fn standings<S: ScoreStore + ?Sized>(store: &S) -> Result<Vec<UserAggregate>> {
    let mut rows = store.load_all_aggregates()?;
    rows.sort_by(|a, b| {
        b.total_points
            .cmp(&a.total_points)
            .then(b.stats.perfect.cmp(&a.stats.perfect))
            .then(a.user_id.cmp(&b.user_id))
    });
    Ok(rows)
}
