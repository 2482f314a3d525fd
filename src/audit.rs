use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::error::Result;
use crate::model::{Match, Stats, UserAggregate};
use crate::scoring::classify;
use crate::store::{PredictionFilter, ScoreStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Drift {
    pub user_id: String,
    pub stored_total: i64,
    pub expected_total: i64,
    pub stored_stats: Stats,
    pub expected_stats: Stats,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub users_checked: usize,
    pub counted_predictions: usize,
    pub drifts: Vec<Drift>,
    // Predictions on completed matches that were never scored.
    pub unscored: usize,
    // Stored scores that the current rules would score differently.
    pub stale_scores: usize,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        self.drifts.is_empty() && self.unscored == 0
    }
}

/// Read-only check of every aggregate against the stored scores it should mirror.
pub fn audit_aggregates<S: ScoreStore + ?Sized>(store: &S) -> Result<AuditReport> {
    let rules = store.load_rules()?;
    let completed = store
        .load_completed_matches()?
        .into_iter()
        .map(|m| (m.match_id.clone(), m))
        .collect::<HashMap<String, Match>>();

    let mut expected: BTreeMap<String, UserAggregate> = BTreeMap::new();
    let mut report = AuditReport::default();

    for prediction in store.load_predictions(PredictionFilter::All)? {
        let Some(fixture) = completed.get(&prediction.match_id) else {
            continue;
        };
        let Some(stored) = prediction.score else {
            report.unscored += 1;
            continue;
        };
        report.counted_predictions += 1;
        if classify(Some(&prediction.payload), fixture.completed_result(), &rules) != stored {
            report.stale_scores += 1;
        }
        expected
            .entry(prediction.user_id.clone())
            .or_insert_with(|| UserAggregate::zeroed(prediction.user_id.clone(), ""))
            .add_score(&stored);
    }

    for agg in store.load_all_aggregates()? {
        report.users_checked += 1;
        let want = expected
            .remove(&agg.user_id)
            .unwrap_or_else(|| UserAggregate::zeroed(agg.user_id.clone(), ""));
        if want.total_points != agg.total_points || want.stats != agg.stats {
            report.drifts.push(Drift {
                user_id: agg.user_id,
                stored_total: agg.total_points,
                expected_total: want.total_points,
                stored_stats: agg.stats,
                expected_stats: want.stats,
            });
        }
    }
    Ok(report)
}
