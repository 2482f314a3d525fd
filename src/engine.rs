use crate::audit::{AuditReport, audit_aggregates};
use crate::error::Result;
use crate::incremental::{ResultChangeSummary, apply_result_change};
use crate::model::{MatchResult, UserAggregate};
use crate::reconcile::{ReconcileSummary, recalculate_all};
use crate::store::{ScoreStore, standings};

/// Operator-facing entry point. Both write paths take `&mut self`, so one engine
/// never interleaves a result change with a reconciliation. Rules are read from
/// the store at the start of each call.
pub struct ScoringEngine<S> {
    store: S,
}

impl<S: ScoreStore> ScoringEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Access for the submission surfaces (sign-up, fixtures, predictions, rule settings).
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }

    pub fn record_result(
        &mut self,
        match_id: &str,
        result: MatchResult,
    ) -> Result<ResultChangeSummary> {
        let rules = self.store.load_rules()?;
        apply_result_change(&mut self.store, match_id, result, &rules)
    }

    pub fn recalculate_all(&mut self) -> Result<ReconcileSummary> {
        let rules = self.store.load_rules()?;
        recalculate_all(&mut self.store, &rules)
    }

    pub fn audit(&self) -> Result<AuditReport> {
        audit_aggregates(&self.store)
    }

    pub fn standings(&self) -> Result<Vec<UserAggregate>> {
        standings(&self.store)
    }
}
