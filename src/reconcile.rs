use std::collections::{BTreeMap, BTreeSet, HashMap};

use rayon::prelude::*;
use tracing::{info, warn};

use crate::batch::{BatchKind, ScoringBatch};
use crate::error::Result;
use crate::model::Match;
use crate::scoring::{Score, ScoringRules, classify};
use crate::store::{PredictionFilter, ScoreStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub completed_matches: usize,
    pub predictions_scored: usize,
    pub predictions_skipped: usize,
    pub aggregates_written: usize,
    pub orphaned_users: Vec<String>,
    pub writes: usize,
}

/// Rebuilds every aggregate from zero by rescoring all predictions on completed
/// matches under `rules`, and commits the rescored predictions together with the
/// overwritten aggregates. Predictions on matches without a result are left as stored.
pub fn recalculate_all<S: ScoreStore + ?Sized>(
    store: &mut S,
    rules: &ScoringRules,
) -> Result<ReconcileSummary> {
    let mut aggregates = store
        .load_all_aggregates()?
        .into_iter()
        .map(|mut agg| {
            agg.reset();
            (agg.user_id.clone(), agg)
        })
        .collect::<BTreeMap<_, _>>();
    let completed = store
        .load_completed_matches()?
        .into_iter()
        .map(|m| (m.match_id.clone(), m))
        .collect::<HashMap<String, Match>>();
    let predictions = store.load_predictions(PredictionFilter::All)?;

    let scored = predictions
        .par_iter()
        .map(|p| {
            completed
                .get(&p.match_id)
                .map(|m| classify(Some(&p.payload), m.completed_result(), rules))
        })
        .collect::<Vec<Option<Score>>>();

    let mut batch = ScoringBatch::new(BatchKind::Reconciliation);
    let mut predictions_scored = 0usize;
    let mut predictions_skipped = 0usize;
    let mut orphaned = BTreeSet::new();

    for (prediction, score) in predictions.iter().zip(scored) {
        let Some(score) = score else {
            predictions_skipped += 1;
            continue;
        };
        batch.stage_prediction_score(&prediction.match_id, &prediction.user_id, score);
        predictions_scored += 1;
        match aggregates.get_mut(&prediction.user_id) {
            Some(agg) => agg.add_score(&score),
            None => {
                orphaned.insert(prediction.user_id.clone());
            }
        }
    }
    if !orphaned.is_empty() {
        warn!(
            users = orphaned.len(),
            "predictions from users without an aggregate were scored but not totalled"
        );
    }

    let aggregates_written = aggregates.len();
    for agg in aggregates.into_values() {
        batch.stage_aggregate(agg);
    }

    let receipt = store.commit(&batch)?;
    info!(
        completed_matches = completed.len(),
        predictions_scored,
        predictions_skipped,
        aggregates_written,
        "full reconciliation committed"
    );

    Ok(ReconcileSummary {
        completed_matches: completed.len(),
        predictions_scored,
        predictions_skipped,
        aggregates_written,
        orphaned_users: orphaned.into_iter().collect(),
        writes: receipt.writes,
    })
}
