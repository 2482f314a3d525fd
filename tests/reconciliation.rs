use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use wc26_predictor::ScoringEngine;
use wc26_predictor::demo::{self, DemoConfig};
use wc26_predictor::model::{MatchResult, PredictionPayload};
use wc26_predictor::scoring::{Primary, ScoringRules};
use wc26_predictor::sqlite_store::SqliteStore;
use wc26_predictor::store::{NewFixture, PredictionFilter, ScoreStore, SubmissionStore};

fn fixture(match_id: &str) -> NewFixture {
    NewFixture {
        match_id: match_id.to_string(),
        team_a: "BRA".to_string(),
        team_b: "GER".to_string(),
        kickoff_utc: "2026-06-20T20:00:00Z".to_string(),
        stage_id: "md2".to_string(),
    }
}

fn result(home: u32, away: u32) -> MatchResult {
    MatchResult {
        home: Some(home),
        away: Some(away),
        penalty_winner: None,
    }
}

fn small_league() -> ScoringEngine<SqliteStore> {
    let mut store = SqliteStore::open_in_memory().expect("open store");
    store.register_user("u1", "Ana").expect("u1");
    store.register_user("u2", "Ben").expect("u2");
    for id in ["m1", "m2", "m3"] {
        store.add_fixture(&fixture(id)).expect("fixture");
    }
    let picks = [
        ("m1", "u1", 2, 1),
        ("m1", "u2", 1, 0),
        ("m2", "u1", 0, 0),
        ("m2", "u2", 2, 2),
        ("m3", "u1", 1, 3),
    ];
    for (match_id, user_id, home, away) in picks {
        store
            .submit_prediction(match_id, user_id, &PredictionPayload::score_line(home, away))
            .expect("predict");
    }
    ScoringEngine::new(store)
}

fn seeded_engine(seed: u64) -> (ScoringEngine<SqliteStore>, Vec<String>) {
    let mut store = SqliteStore::open_in_memory().expect("open store");
    let cfg = DemoConfig {
        users: 8,
        matches: 18,
        malformed_rate: 0.05,
    };
    let summary =
        demo::seed_demo(&mut store, &cfg, &mut StdRng::seed_from_u64(seed)).expect("seed");
    (ScoringEngine::new(store), summary.fixtures)
}

#[test]
fn recalculation_repairs_drifted_aggregates() {
    let mut engine = small_league();
    engine.record_result("m1", result(2, 1)).expect("m1");
    engine.record_result("m2", result(1, 1)).expect("m2");
    let healthy = engine.store().load_all_aggregates().expect("aggregates");

    engine
        .store()
        .connection()
        .execute(
            "UPDATE user_aggregates SET total_points = 42, perfect = 9, missed = 0 WHERE user_id = 'u1'",
            [],
        )
        .expect("corrupt aggregate");
    let report = engine.audit().expect("audit");
    assert_eq!(report.drifts.len(), 1);
    assert_eq!(report.drifts[0].user_id, "u1");
    assert_eq!(report.drifts[0].stored_total, 42);

    let summary = engine.recalculate_all().expect("recalculate");
    assert_eq!(summary.completed_matches, 2);
    assert_eq!(summary.predictions_scored, 4);
    assert_eq!(summary.predictions_skipped, 1);
    assert_eq!(summary.aggregates_written, 2);

    assert_eq!(engine.store().load_all_aggregates().expect("aggregates"), healthy);
    assert!(engine.audit().expect("audit").is_consistent());
}

#[test]
fn rule_changes_apply_only_after_recalculation() {
    let mut engine = small_league();
    engine.record_result("m1", result(2, 1)).expect("m1");

    let richer = ScoringRules {
        perfect_score: 10,
        aggregate_score: 4,
        outcome_score: 2,
        penalty_bonus: 1,
    };
    engine.store_mut().save_rules(&richer).expect("save rules");

    let before = engine.audit().expect("audit");
    assert!(before.is_consistent());
    assert_eq!(before.stale_scores, 2);
    assert_eq!(engine.standings().expect("standings")[0].total_points, 5);

    engine.recalculate_all().expect("recalculate");
    let standings = engine.standings().expect("standings");
    assert_eq!(standings[0].user_id, "u1");
    assert_eq!(standings[0].total_points, 10);
    assert_eq!(standings[1].total_points, 4);
    assert_eq!(engine.audit().expect("audit").stale_scores, 0);
}

#[test]
fn predictions_on_unfinished_matches_are_left_alone() {
    let mut engine = small_league();
    engine.record_result("m1", result(2, 1)).expect("m1");
    engine
        .store()
        .connection()
        .execute(
            "UPDATE predictions SET points = 7, score_type = 'Perfect+Bonus' WHERE match_id = 'm3'",
            [],
        )
        .expect("plant stale score");

    engine.recalculate_all().expect("recalculate");

    let m3 = engine
        .store()
        .load_predictions(PredictionFilter::Match("m3"))
        .expect("load");
    let stale = m3[0].score.expect("stale score kept");
    assert_eq!(stale.points, 7);
    assert_eq!(stale.category.primary, Primary::Perfect);

    let u1 = engine
        .store()
        .load_aggregates(&["u1".to_string()])
        .expect("load")
        .remove("u1")
        .expect("u1");
    assert_eq!(u1.total_points, 5);
    assert_eq!(u1.stats.count(), 1);
}

#[test]
fn recalculating_a_consistent_league_is_a_no_op() {
    let (mut engine, fixtures) = seeded_engine(5);
    let mut rng = StdRng::seed_from_u64(55);
    for match_id in fixtures.iter().take(10) {
        engine
            .record_result(match_id, demo::random_result(&mut rng, false))
            .expect("record");
    }
    let before = engine.store().load_all_aggregates().expect("aggregates");
    engine.recalculate_all().expect("recalculate");
    assert_eq!(engine.store().load_all_aggregates().expect("aggregates"), before);
}

#[test]
fn full_rebuild_matches_incremental_replay_in_any_order() {
    for seed in 0..6u64 {
        let (mut incremental, fixtures) = seeded_engine(seed);
        let (mut rebuilt, same_fixtures) = seeded_engine(seed);
        assert_eq!(fixtures, same_fixtures);

        let mut rng = StdRng::seed_from_u64(seed + 100);
        let finals = fixtures
            .iter()
            .map(|id| {
                let knockout = incremental
                    .store()
                    .load_match(id)
                    .expect("load")
                    .is_some_and(|m| demo::is_knockout(&m.stage_id));
                (id.clone(), demo::random_result(&mut rng, knockout))
            })
            .collect::<Vec<_>>();

        // Incremental side: a provisional result, then the corrected final one.
        for (match_id, final_result) in &finals {
            incremental
                .record_result(match_id, demo::random_result(&mut rng, false))
                .expect("provisional");
            incremental
                .record_result(match_id, final_result.clone())
                .expect("final");
        }

        // Rebuild side: finals in shuffled order, corrupted totals, then a full rebuild.
        let mut shuffled = finals.clone();
        shuffled.shuffle(&mut rng);
        for (match_id, final_result) in &shuffled {
            rebuilt
                .record_result(match_id, final_result.clone())
                .expect("final");
        }
        rebuilt
            .store()
            .connection()
            .execute(
                "UPDATE user_aggregates SET total_points = total_points * 3 + 1, outcome = 0",
                [],
            )
            .expect("corrupt");
        rebuilt.recalculate_all().expect("recalculate");

        assert_eq!(
            incremental.store().load_all_aggregates().expect("aggregates"),
            rebuilt.store().load_all_aggregates().expect("aggregates"),
            "seed {seed}"
        );
        assert!(incremental.audit().expect("audit").is_consistent(), "seed {seed}");
        assert!(rebuilt.audit().expect("audit").is_consistent(), "seed {seed}");
    }
}
