use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::batch::{BatchKind, ScoringBatch};
use crate::error::{EngineError, Result};
use crate::model::MatchResult;
use crate::scoring::{ScoringRules, classify};
use crate::store::{PredictionFilter, ScoreStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultChangeSummary {
    pub match_id: String,
    // True when the match already had a result and this call corrected it.
    pub correction: bool,
    pub predictions_scored: usize,
    pub aggregates_updated: usize,
    pub skipped_users: Vec<String>,
    pub points_delta: i64,
    pub writes: usize,
}

/// Sets or corrects one match result and moves every affected aggregate by the
/// difference between the old and new score of each prediction.
///
/// Everything is read fresh and committed as one batch, so a failed commit can be
/// retried as a whole, and a repeat with the same result is a no-op.
/// Callers must not run this concurrently for the same match or alongside
/// [`crate::reconcile::recalculate_all`].
pub fn apply_result_change<S: ScoreStore + ?Sized>(
    store: &mut S,
    match_id: &str,
    new_result: MatchResult,
    rules: &ScoringRules,
) -> Result<ResultChangeSummary> {
    let Some(fixture) = store.load_match(match_id)? else {
        return Err(EngineError::MatchNotFound(match_id.to_string()));
    };
    let correction = fixture.is_completed();

    let predictions = store.load_predictions(PredictionFilter::Match(match_id))?;
    let user_ids = predictions
        .iter()
        .map(|p| p.user_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>();
    let mut aggregates = store.load_aggregates(&user_ids)?;

    let mut batch = ScoringBatch::new(BatchKind::ResultChange {
        match_id: match_id.to_string(),
    });
    let mut touched = BTreeSet::new();
    let mut skipped = BTreeSet::new();
    let mut points_delta = 0i64;

    for prediction in &predictions {
        // Stored scores only count toward an aggregate once the match is completed.
        let old = if correction { prediction.score } else { None };
        let new = classify(Some(&prediction.payload), Some(&new_result), rules);
        debug!(
            match_id,
            user_id = %prediction.user_id,
            old = ?old.map(|s| s.points),
            new = new.points,
            category = %new.category,
            "staged prediction score"
        );
        batch.stage_prediction_score(match_id, &prediction.user_id, new);
        points_delta += i64::from(new.points) - old.map_or(0, |s| i64::from(s.points));

        let Some(agg) = aggregates.get_mut(&prediction.user_id) else {
            warn!(
                match_id,
                user_id = %prediction.user_id,
                "no aggregate for predicting user, skipping"
            );
            skipped.insert(prediction.user_id.clone());
            continue;
        };
        if let Some(old) = old {
            agg.remove_score(&old);
        }
        agg.add_score(&new);
        touched.insert(prediction.user_id.clone());
    }

    for user_id in &touched {
        if let Some(agg) = aggregates.remove(user_id) {
            batch.stage_aggregate(agg);
        }
    }
    batch.stage_match_result(match_id, new_result);

    let receipt = store.commit(&batch)?;
    info!(
        match_id,
        correction,
        predictions = predictions.len(),
        aggregates = touched.len(),
        points_delta,
        "result change committed"
    );

    Ok(ResultChangeSummary {
        match_id: match_id.to_string(),
        correction,
        predictions_scored: predictions.len(),
        aggregates_updated: touched.len(),
        skipped_users: skipped.into_iter().collect(),
        points_delta,
        writes: receipt.writes,
    })
}
