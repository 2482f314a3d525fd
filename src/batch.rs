//! The unit of atomic commit.
//!
//! Both scoring passes stage every write here and hand the finished batch to
//! [`crate::store::ScoreStore::commit`]. A store must apply a batch entirely
//! or not at all. Batches can only be built inside this crate, which keeps
//! derived fields (prediction points, aggregate totals) out of reach of any
//! other writer.

use std::collections::BTreeMap;

use crate::model::{MatchResult, UserAggregate};
use crate::scoring::Score;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchKind {
    ResultChange { match_id: String },
    Reconciliation,
}

impl BatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchKind::ResultChange { .. } => "result_change",
            BatchKind::Reconciliation => "reconciliation",
        }
    }

    pub fn match_id(&self) -> Option<&str> {
        match self {
            BatchKind::ResultChange { match_id } => Some(match_id),
            BatchKind::Reconciliation => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResultWrite {
    pub match_id: String,
    pub result: MatchResult,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionScoreWrite {
    pub match_id: String,
    pub user_id: String,
    pub score: Score,
}

#[derive(Debug, Clone)]
pub struct ScoringBatch {
    kind: BatchKind,
    match_result: Option<MatchResultWrite>,
    prediction_scores: Vec<PredictionScoreWrite>,
    aggregates: BTreeMap<String, UserAggregate>,
}

impl ScoringBatch {
    pub(crate) fn new(kind: BatchKind) -> Self {
        Self {
            kind,
            match_result: None,
            prediction_scores: Vec::new(),
            aggregates: BTreeMap::new(),
        }
    }

    pub(crate) fn stage_match_result(&mut self, match_id: &str, result: MatchResult) {
        self.match_result = Some(MatchResultWrite {
            match_id: match_id.to_string(),
            result,
        });
    }

    pub(crate) fn stage_prediction_score(&mut self, match_id: &str, user_id: &str, score: Score) {
        self.prediction_scores.push(PredictionScoreWrite {
            match_id: match_id.to_string(),
            user_id: user_id.to_string(),
            score,
        });
    }

    /// Full overwrite of one aggregate; a later stage for the same user replaces the earlier one.
    pub(crate) fn stage_aggregate(&mut self, aggregate: UserAggregate) {
        self.aggregates
            .insert(aggregate.user_id.clone(), aggregate);
    }

    pub fn kind(&self) -> &BatchKind {
        &self.kind
    }

    pub fn match_result(&self) -> Option<&MatchResultWrite> {
        self.match_result.as_ref()
    }

    pub fn prediction_scores(&self) -> &[PredictionScoreWrite] {
        &self.prediction_scores
    }

    pub fn aggregates(&self) -> impl Iterator<Item = &UserAggregate> {
        self.aggregates.values()
    }

    pub fn aggregate_count(&self) -> usize {
        self.aggregates.len()
    }

    pub fn write_count(&self) -> usize {
        usize::from(self.match_result.is_some())
            + self.prediction_scores.len()
            + self.aggregates.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitReceipt {
    pub writes: usize,
}
