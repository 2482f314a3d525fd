use wc26_predictor::ScoringEngine;
use wc26_predictor::import::{apply_import, parse_import_json};
use wc26_predictor::model::MatchResult;
use wc26_predictor::sqlite_store::SqliteStore;
use wc26_predictor::store::{PredictionFilter, ScoreStore};

const LEAGUE_JSON: &str = r#"{
    "users": [
        { "user_id": "u1", "display_name": "Ana" },
        { "user_id": "u2" }
    ],
    "fixtures": [
        { "match_id": "m1", "team_a": "USA", "team_b": "MEX", "kickoff_utc": "2026-06-12T01:00:00Z", "stage_id": "md1" },
        { "match_id": "m2", "team_a": "ARG", "team_b": "BRA", "kickoff_utc": "2026-07-19T19:00:00Z", "stage_id": "final" }
    ],
    "predictions": [
        { "match_id": "m1", "user_id": "u1", "home": 2, "away": 0 },
        { "match_id": "m1", "user_id": "u2", "home": "1", "away": "1" },
        { "match_id": "m2", "user_id": "u1", "home": "1", "away": "1", "penalty_winner": "away" },
        { "match_id": "m2", "user_id": "nobody", "home": "0", "away": "0" },
        { "match_id": "m9", "user_id": "u2", "home": "0", "away": "0" }
    ]
}"#;

fn imported() -> ScoringEngine<SqliteStore> {
    let mut store = SqliteStore::open_in_memory().expect("open");
    let file = parse_import_json(LEAGUE_JSON).expect("parse");
    let summary = apply_import(&mut store, &file).expect("apply");
    assert_eq!(summary.users, 2);
    assert_eq!(summary.fixtures, 2);
    assert_eq!(summary.predictions, 3);
    assert_eq!(summary.rejected.len(), 2);
    ScoringEngine::new(store)
}

#[test]
fn numeric_and_string_goals_are_both_accepted() {
    let engine = imported();
    let m1 = engine
        .store()
        .load_predictions(PredictionFilter::Match("m1"))
        .expect("load");
    assert_eq!(m1.len(), 2);
    let u1 = m1.iter().find(|p| p.user_id == "u1").expect("u1");
    assert_eq!(u1.payload.home.as_deref(), Some("2"));
    assert_eq!(u1.payload.away.as_deref(), Some("0"));

    let names = engine
        .store()
        .load_all_aggregates()
        .expect("aggregates")
        .into_iter()
        .map(|agg| agg.display_name)
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["Ana".to_string(), "u2".to_string()]);
}

#[test]
fn imported_predictions_score_like_typed_ones() {
    let mut engine = imported();
    engine
        .record_result(
            "m2",
            MatchResult {
                home: Some(1),
                away: Some(1),
                penalty_winner: Some(wc26_predictor::model::Side::Away),
            },
        )
        .expect("m2");
    let standings = engine.standings().expect("standings");
    assert_eq!(standings[0].user_id, "u1");
    assert_eq!(standings[0].total_points, 7);
}

#[test]
fn predictions_on_completed_matches_are_rejected_on_import() {
    let mut engine = imported();
    engine
        .record_result(
            "m1",
            MatchResult {
                home: Some(2),
                away: Some(0),
                penalty_winner: None,
            },
        )
        .expect("m1");

    let late = parse_import_json(
        r#"{ "predictions": [ { "match_id": "m1", "user_id": "u2", "home": "2", "away": "0" } ] }"#,
    )
    .expect("parse");
    let summary = apply_import(engine.store_mut(), &late).expect("apply");
    assert_eq!(summary.predictions, 0);
    assert_eq!(summary.rejected.len(), 1);
    assert!(summary.rejected[0].contains("locked"), "{:?}", summary.rejected);

    let u2 = engine
        .store()
        .load_predictions(PredictionFilter::User("u2"))
        .expect("load");
    assert_eq!(u2[0].payload.home.as_deref(), Some("1"));
}

#[test]
fn empty_or_null_input_imports_nothing() {
    for raw in ["", "  ", "null"] {
        let file = parse_import_json(raw).expect("parse");
        assert!(file.users.is_empty());
        assert!(file.fixtures.is_empty());
        assert!(file.predictions.is_empty());
    }
    assert!(parse_import_json("{ not json").is_err());
}

#[test]
fn float_and_padded_goals_read_as_leading_integers() {
    let mut engine = imported();
    let loose = parse_import_json(
        r#"{ "predictions": [
            { "match_id": "m2", "user_id": "u2", "home": 2.0, "away": "1.5" }
        ] }"#,
    )
    .expect("parse");
    let summary = apply_import(engine.store_mut(), &loose).expect("apply");
    assert_eq!(summary.predictions, 1);

    let stored = engine
        .store()
        .load_predictions(PredictionFilter::User("u2"))
        .expect("load")
        .into_iter()
        .find(|p| p.match_id == "m2")
        .expect("u2 m2");
    assert_eq!(stored.payload.home.as_deref(), Some("2"));
    assert_eq!(stored.payload.away.as_deref(), Some("1.5"));

    engine
        .record_result(
            "m2",
            MatchResult {
                home: Some(2),
                away: Some(1),
                penalty_winner: None,
            },
        )
        .expect("m2");
    let scored = engine
        .store()
        .load_predictions(PredictionFilter::Match("m2"))
        .expect("load")
        .into_iter()
        .find(|p| p.user_id == "u2")
        .and_then(|p| p.score)
        .expect("scored");
    assert_eq!(scored.points, 5);
    assert_eq!(scored.category.label(), "Perfect");
}
