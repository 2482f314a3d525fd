use chrono::{Duration as ChronoDuration, NaiveDate};
use rand::Rng;
use rand::seq::SliceRandom;

use crate::error::{EngineError, Result};
use crate::model::{MatchResult, PredictionPayload, Side};
use crate::store::{NewFixture, SubmissionStore};

// (stage id, knockout)
pub const STAGES: &[(&str, bool)] = &[
    ("md1", false),
    ("md2", false),
    ("md3", false),
    ("r32", true),
    ("r16", true),
    ("qf", true),
    ("sf", true),
    ("3rd", true),
    ("final", true),
];

const TEAMS: &[&str] = &[
    "MEX", "CAN", "USA", "ARG", "BRA", "FRA", "ENG", "ESP", "GER", "POR", "NED", "BEL", "CRO",
    "URU", "COL", "JPN", "KOR", "MAR", "SEN", "AUS", "SUI", "ECU", "IRN", "NOR",
];

#[derive(Debug, Clone, Copy)]
pub struct DemoConfig {
    pub users: usize,
    pub matches: usize,
    // Share of predictions left blank or garbled, as real submissions sometimes are.
    pub malformed_rate: f64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            users: 12,
            matches: 24,
            malformed_rate: 0.03,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DemoSummary {
    pub users: usize,
    pub fixtures: Vec<String>,
    pub predictions: usize,
}

pub fn is_knockout(stage_id: &str) -> bool {
    STAGES
        .iter()
        .any(|(id, knockout)| *id == stage_id && *knockout)
}

pub fn seed_demo<S, R>(store: &mut S, cfg: &DemoConfig, rng: &mut R) -> Result<DemoSummary>
where
    S: SubmissionStore + ?Sized,
    R: Rng,
{
    let Some(opening_day) = NaiveDate::from_ymd_opt(2026, 6, 11) else {
        return Err(EngineError::Config("invalid opening day".to_string()));
    };
    let mut summary = DemoSummary::default();

    for idx in 0..cfg.users {
        let user_id = format!("user-{:03}", idx + 1);
        store.register_user(&user_id, &format!("Player {}", idx + 1))?;
        summary.users += 1;
    }

    let mut fixtures = Vec::with_capacity(cfg.matches);
    for idx in 0..cfg.matches {
        let stage_pos = (idx * STAGES.len() / cfg.matches.max(1)).min(STAGES.len() - 1);
        let (stage_id, knockout) = STAGES[stage_pos];
        let mut pair = TEAMS.choose_multiple(rng, 2);
        let (Some(team_a), Some(team_b)) = (pair.next(), pair.next()) else {
            continue;
        };
        let kickoff = opening_day + ChronoDuration::days((idx / 4) as i64);
        let fixture = NewFixture {
            match_id: format!("wc26-{:03}", idx + 1),
            team_a: team_a.to_string(),
            team_b: team_b.to_string(),
            kickoff_utc: format!("{}T{:02}:00:00Z", kickoff.format("%Y-%m-%d"), 16 + (idx % 4) * 2),
            stage_id: stage_id.to_string(),
        };
        store.add_fixture(&fixture)?;
        fixtures.push((fixture.match_id, knockout));
    }

    for (match_id, knockout) in &fixtures {
        for idx in 0..cfg.users {
            // Not everyone predicts every match.
            if rng.gen_bool(0.15) {
                continue;
            }
            let user_id = format!("user-{:03}", idx + 1);
            let payload = random_payload(rng, *knockout, cfg.malformed_rate);
            store.submit_prediction(match_id, &user_id, &payload)?;
            summary.predictions += 1;
        }
    }

    summary.fixtures = fixtures.into_iter().map(|(id, _)| id).collect();
    Ok(summary)
}

pub fn random_result<R: Rng>(rng: &mut R, knockout: bool) -> MatchResult {
    let home = goals(rng);
    let away = goals(rng);
    let penalty_winner = (knockout && home == away).then(|| random_side(rng));
    MatchResult {
        home: Some(home),
        away: Some(away),
        penalty_winner,
    }
}

fn random_payload<R: Rng>(rng: &mut R, knockout: bool, malformed_rate: f64) -> PredictionPayload {
    if rng.gen_bool(malformed_rate.clamp(0.0, 1.0)) {
        return PredictionPayload {
            home: Some(["", "x", "-1"][rng.gen_range(0..3)].to_string()),
            away: None,
            penalty_winner: None,
        };
    }
    let mut payload = PredictionPayload::score_line(goals(rng), goals(rng));
    if knockout && rng.gen_bool(0.5) {
        payload.penalty_winner = Some(random_side(rng));
    }
    payload
}

fn goals<R: Rng>(rng: &mut R) -> u32 {
    // Skewed toward low scores.
    let roll: f64 = rng.gen_range(0.0..1.0);
    match roll {
        r if r < 0.28 => 0,
        r if r < 0.62 => 1,
        r if r < 0.84 => 2,
        r if r < 0.95 => 3,
        _ => rng.gen_range(4..=6),
    }
}

fn random_side<R: Rng>(rng: &mut R) -> Side {
    if rng.gen_bool(0.5) { Side::Home } else { Side::Away }
}
