use tempfile::TempDir;

use wc26_predictor::ScoringEngine;
use wc26_predictor::memory_store::MemoryStore;
use wc26_predictor::model::{MatchResult, MatchStatus, PredictionPayload, UserAggregate};
use wc26_predictor::sqlite_store::SqliteStore;
use wc26_predictor::store::{NewFixture, PredictionFilter, ScoreStore, SubmissionStore};

const REJECT_U2: &str = "
    CREATE TRIGGER reject_u2 BEFORE UPDATE ON user_aggregates
    FOR EACH ROW WHEN NEW.user_id = 'u2'
    BEGIN
        SELECT RAISE(ABORT, 'aggregate write refused');
    END;
";

fn fixture(match_id: &str) -> NewFixture {
    NewFixture {
        match_id: match_id.to_string(),
        team_a: "ESP".to_string(),
        team_b: "POR".to_string(),
        kickoff_utc: "2026-06-15T19:00:00Z".to_string(),
        stage_id: "md1".to_string(),
    }
}

fn result(home: u32, away: u32) -> MatchResult {
    MatchResult {
        home: Some(home),
        away: Some(away),
        penalty_winner: None,
    }
}

fn seed<S: SubmissionStore>(store: &mut S) {
    store.register_user("u1", "Ana").expect("u1");
    store.register_user("u2", "Ben").expect("u2");
    store.add_fixture(&fixture("m1")).expect("m1");
    store.add_fixture(&fixture("m2")).expect("m2");
    store
        .submit_prediction("m1", "u1", &PredictionPayload::score_line(1, 0))
        .expect("u1 m1");
    store
        .submit_prediction("m1", "u2", &PredictionPayload::score_line(2, 0))
        .expect("u2 m1");
    store
        .submit_prediction("m2", "u2", &PredictionPayload::score_line(0, 0))
        .expect("u2 m2");
}

struct Snapshot {
    aggregates: Vec<UserAggregate>,
    m1_status: MatchStatus,
    scored: usize,
    runs: usize,
}

fn snapshot<S: ScoreStore>(store: &S) -> Snapshot {
    Snapshot {
        aggregates: store.load_all_aggregates().expect("aggregates"),
        m1_status: store.load_match("m1").expect("load").expect("m1").status,
        scored: store
            .load_predictions(PredictionFilter::All)
            .expect("predictions")
            .iter()
            .filter(|p| p.score.is_some())
            .count(),
        runs: store.recent_runs(100).expect("runs").len(),
    }
}

fn assert_unchanged<S: ScoreStore>(store: &S, before: &Snapshot) {
    let after = snapshot(store);
    assert_eq!(after.aggregates, before.aggregates);
    assert_eq!(after.m1_status, before.m1_status);
    assert_eq!(after.scored, before.scored);
    assert_eq!(after.runs, before.runs);
}

#[test]
fn rejected_result_change_leaves_sqlite_untouched() {
    let mut store = SqliteStore::open_in_memory().expect("open");
    seed(&mut store);
    let mut engine = ScoringEngine::new(store);
    engine
        .store()
        .connection()
        .execute_batch(REJECT_U2)
        .expect("trigger");
    let before = snapshot(engine.store());

    let err = engine
        .record_result("m1", result(1, 0))
        .expect_err("commit should fail");
    assert!(err.is_commit_failure(), "{err}");
    assert_unchanged(engine.store(), &before);
    assert_eq!(before.m1_status, MatchStatus::Upcoming);

    // The failed pass can simply be rerun once the backend accepts writes again.
    engine
        .store()
        .connection()
        .execute_batch("DROP TRIGGER reject_u2;")
        .expect("drop trigger");
    let summary = engine.record_result("m1", result(1, 0)).expect("retry");
    assert!(!summary.correction);
    assert_eq!(summary.points_delta, 5 + 1);
    assert!(engine.audit().expect("audit").is_consistent());
}

#[test]
fn rejected_reconciliation_keeps_previous_totals() {
    let mut store = SqliteStore::open_in_memory().expect("open");
    seed(&mut store);
    let mut engine = ScoringEngine::new(store);
    engine.record_result("m1", result(1, 0)).expect("m1");
    engine.record_result("m2", result(0, 0)).expect("m2");
    engine
        .store()
        .connection()
        .execute("UPDATE user_aggregates SET total_points = 100 WHERE user_id = 'u1'", [])
        .expect("corrupt");
    engine
        .store()
        .connection()
        .execute_batch(REJECT_U2)
        .expect("trigger");
    let before = snapshot(engine.store());

    let err = engine.recalculate_all().expect_err("commit should fail");
    assert!(err.is_commit_failure());
    assert_unchanged(engine.store(), &before);
    let u1 = engine
        .store()
        .load_aggregates(&["u1".to_string()])
        .expect("load")
        .remove("u1")
        .expect("u1");
    assert_eq!(u1.total_points, 100);
}

#[test]
fn memory_store_failure_is_all_or_nothing() {
    let mut store = MemoryStore::new();
    seed(&mut store);
    let mut engine = ScoringEngine::new(store);
    let before = snapshot(engine.store());

    engine.store_mut().fail_next_commit("backend unavailable");
    let err = engine.record_result("m1", result(3, 3)).expect_err("injected failure");
    assert!(err.is_commit_failure());
    assert_unchanged(engine.store(), &before);

    engine.record_result("m1", result(3, 3)).expect("second attempt");
    let after = snapshot(engine.store());
    assert_eq!(after.m1_status, MatchStatus::Completed);
    assert_eq!(after.scored, 2);
    assert_eq!(after.runs, 1);
}

#[test]
fn oversized_batch_is_rejected_whole() {
    let mut store = MemoryStore::new();
    seed(&mut store);
    let mut engine = ScoringEngine::new(store.with_batch_limit(3));
    let before = snapshot(engine.store());

    // One match write, two prediction scores and two aggregates.
    let err = engine.record_result("m1", result(1, 0)).expect_err("too large");
    assert!(err.is_commit_failure());
    assert_unchanged(engine.store(), &before);

    // m2 has a single prediction: 1 + 1 + 1 writes fit.
    let summary = engine.record_result("m2", result(0, 0)).expect("fits");
    assert_eq!(summary.writes, 3);
    assert!(engine.audit().expect("audit").is_consistent());
}

#[test]
fn committed_state_survives_reopening_the_database() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("league").join("predictor.sqlite");

    {
        let mut store = SqliteStore::open(&path).expect("open");
        seed(&mut store);
        let mut engine = ScoringEngine::new(store);
        engine.record_result("m1", result(1, 0)).expect("m1");
    }

    let reopened = ScoringEngine::new(SqliteStore::open(&path).expect("reopen"));
    let standings = reopened.standings().expect("standings");
    assert_eq!(standings[0].user_id, "u1");
    assert_eq!(standings[0].total_points, 5);
    assert_eq!(standings[1].total_points, 1);
    assert_eq!(
        reopened.store().load_match("m1").expect("load").expect("m1").status,
        MatchStatus::Completed
    );
    assert_eq!(reopened.store().recent_runs(5).expect("runs").len(), 1);
    assert!(reopened.audit().expect("audit").is_consistent());
}
