use std::collections::{BTreeMap, HashMap};

use chrono::Utc;

use crate::batch::{CommitReceipt, ScoringBatch};
use crate::error::{EngineError, Result};
use crate::model::{Match, MatchStatus, Prediction, PredictionPayload, UserAggregate};
use crate::scoring::ScoringRules;
use crate::store::{NewFixture, PredictionFilter, ScoreStore, ScoringRun, SubmissionStore};

#[derive(Debug, Clone, Default)]
struct Tables {
    matches: BTreeMap<String, Match>,
    predictions: BTreeMap<(String, String), Prediction>,
    aggregates: BTreeMap<String, UserAggregate>,
    rules: ScoringRules,
    runs: Vec<ScoringRun>,
}

/// In-process backend. A commit builds the next state on a copy and swaps it in,
/// so a rejected batch leaves the current tables as they were.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Tables,
    batch_limit: Option<usize>,
    fail_next_commit: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects any batch with more writes than `limit`, like document stores that cap batch size.
    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = Some(limit);
        self
    }

    /// The next commit fails with `reason`; later commits behave normally.
    pub fn fail_next_commit(&mut self, reason: impl Into<String>) {
        self.fail_next_commit = Some(reason.into());
    }

    fn apply(&self, batch: &ScoringBatch) -> Result<Tables> {
        let mut next = self.tables.clone();
        let now = Utc::now().to_rfc3339();

        if let Some(write) = batch.match_result() {
            let Some(fixture) = next.matches.get_mut(&write.match_id) else {
                return Err(EngineError::CommitRejected(format!(
                    "match {} vanished before commit",
                    write.match_id
                )));
            };
            fixture.status = MatchStatus::Completed;
            fixture.result = Some(write.result.clone());
        }

        for write in batch.prediction_scores() {
            let key = (write.match_id.clone(), write.user_id.clone());
            let Some(prediction) = next.predictions.get_mut(&key) else {
                return Err(EngineError::CommitRejected(format!(
                    "prediction {}/{} vanished before commit",
                    write.match_id, write.user_id
                )));
            };
            prediction.score = Some(write.score);
        }

        for agg in batch.aggregates() {
            let Some(current) = next.aggregates.get_mut(&agg.user_id) else {
                return Err(EngineError::CommitRejected(format!(
                    "aggregate {} vanished before commit",
                    agg.user_id
                )));
            };
            current.total_points = agg.total_points;
            current.stats = agg.stats;
        }

        next.runs.push(ScoringRun {
            kind: batch.kind().as_str().to_string(),
            match_id: batch.kind().match_id().map(str::to_string),
            predictions_scored: batch.prediction_scores().len(),
            aggregates_written: batch.aggregate_count(),
            committed_at: now,
        });
        Ok(next)
    }
}

impl ScoreStore for MemoryStore {
    fn load_match(&self, match_id: &str) -> Result<Option<Match>> {
        Ok(self.tables.matches.get(match_id).cloned())
    }

    fn load_matches(&self) -> Result<Vec<Match>> {
        Ok(self.tables.matches.values().cloned().collect())
    }

    fn load_predictions(&self, filter: PredictionFilter<'_>) -> Result<Vec<Prediction>> {
        Ok(self
            .tables
            .predictions
            .values()
            .filter(|p| filter.accepts(p))
            .cloned()
            .collect())
    }

    fn load_aggregates(&self, user_ids: &[String]) -> Result<HashMap<String, UserAggregate>> {
        Ok(user_ids
            .iter()
            .filter_map(|id| {
                self.tables
                    .aggregates
                    .get(id)
                    .map(|agg| (id.clone(), agg.clone()))
            })
            .collect())
    }

    fn load_all_aggregates(&self) -> Result<Vec<UserAggregate>> {
        Ok(self.tables.aggregates.values().cloned().collect())
    }

    fn load_rules(&self) -> Result<ScoringRules> {
        Ok(self.tables.rules)
    }

    fn recent_runs(&self, limit: usize) -> Result<Vec<ScoringRun>> {
        Ok(self.tables.runs.iter().rev().take(limit).cloned().collect())
    }

    fn commit(&mut self, batch: &ScoringBatch) -> Result<CommitReceipt> {
        if let Some(reason) = self.fail_next_commit.take() {
            return Err(EngineError::CommitRejected(reason));
        }
        if let Some(limit) = self.batch_limit
            && batch.write_count() > limit
        {
            return Err(EngineError::CommitRejected(format!(
                "batch of {} writes exceeds limit of {limit}",
                batch.write_count()
            )));
        }
        self.tables = self.apply(batch)?;
        Ok(CommitReceipt {
            writes: batch.write_count(),
        })
    }
}

impl SubmissionStore for MemoryStore {
    fn register_user(&mut self, user_id: &str, display_name: &str) -> Result<()> {
        if user_id.trim().is_empty() {
            return Err(EngineError::InvalidInput("empty user id".to_string()));
        }
        self.tables
            .aggregates
            .entry(user_id.to_string())
            .and_modify(|agg| agg.display_name = display_name.to_string())
            .or_insert_with(|| UserAggregate::zeroed(user_id, display_name));
        Ok(())
    }

    fn add_fixture(&mut self, fixture: &NewFixture) -> Result<()> {
        if fixture.match_id.trim().is_empty() {
            return Err(EngineError::InvalidInput("empty match id".to_string()));
        }
        let entry = self
            .tables
            .matches
            .entry(fixture.match_id.clone())
            .or_insert_with(|| Match {
                match_id: fixture.match_id.clone(),
                team_a: String::new(),
                team_b: String::new(),
                kickoff_utc: String::new(),
                stage_id: String::new(),
                status: MatchStatus::Upcoming,
                result: None,
            });
        entry.team_a = fixture.team_a.clone();
        entry.team_b = fixture.team_b.clone();
        entry.kickoff_utc = fixture.kickoff_utc.clone();
        entry.stage_id = fixture.stage_id.clone();
        Ok(())
    }

    fn submit_prediction(
        &mut self,
        match_id: &str,
        user_id: &str,
        payload: &PredictionPayload,
    ) -> Result<()> {
        let Some(fixture) = self.tables.matches.get(match_id) else {
            return Err(EngineError::MatchNotFound(match_id.to_string()));
        };
        if fixture.is_completed() {
            return Err(EngineError::PredictionLocked(match_id.to_string()));
        }
        if !self.tables.aggregates.contains_key(user_id) {
            return Err(EngineError::UnknownUser(user_id.to_string()));
        }
        self.tables
            .predictions
            .entry((match_id.to_string(), user_id.to_string()))
            .and_modify(|p| p.payload = payload.clone())
            .or_insert_with(|| Prediction {
                match_id: match_id.to_string(),
                user_id: user_id.to_string(),
                payload: payload.clone(),
                score: None,
            });
        Ok(())
    }

    fn save_rules(&mut self, rules: &ScoringRules) -> Result<()> {
        self.tables.rules = *rules;
        Ok(())
    }
}
