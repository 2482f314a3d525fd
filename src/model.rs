use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::scoring::{Primary, Score};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Home => "home",
            Side::Away => "away",
        }
    }

    pub fn parse(raw: &str) -> Option<Side> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "home" | "h" => Some(Side::Home),
            "away" | "a" => Some(Side::Away),
            _ => None,
        }
    }
}

/// Official result. Every field may be absent; an all-absent result clears prior points.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    #[serde(default)]
    pub home: Option<u32>,
    #[serde(default)]
    pub away: Option<u32>,
    #[serde(default)]
    pub penalty_winner: Option<Side>,
}

impl MatchResult {
    pub fn is_cleared(&self) -> bool {
        self.home.is_none() && self.away.is_none() && self.penalty_winner.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Upcoming,
    Completed,
}

impl MatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Upcoming => "UPCOMING",
            MatchStatus::Completed => "COMPLETED",
        }
    }

    pub fn parse(raw: &str) -> Option<MatchStatus> {
        match raw {
            "UPCOMING" => Some(MatchStatus::Upcoming),
            "COMPLETED" => Some(MatchStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub match_id: String,
    pub team_a: String,
    pub team_b: String,
    pub kickoff_utc: String,
    pub stage_id: String,
    pub status: MatchStatus,
    // Present iff status is Completed; only the result-setting path writes both.
    pub result: Option<MatchResult>,
}

impl Match {
    pub fn is_completed(&self) -> bool {
        self.status == MatchStatus::Completed
    }

    pub fn completed_result(&self) -> Option<&MatchResult> {
        if self.is_completed() {
            self.result.as_ref()
        } else {
            None
        }
    }
}

/// What the user typed. Goals stay raw so malformed input can be scored as a miss.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionPayload {
    #[serde(default, deserialize_with = "lenient_goals")]
    pub home: Option<String>,
    #[serde(default, deserialize_with = "lenient_goals")]
    pub away: Option<String>,
    #[serde(default)]
    pub penalty_winner: Option<Side>,
}

impl PredictionPayload {
    pub fn score_line(home: u32, away: u32) -> Self {
        Self {
            home: Some(home.to_string()),
            away: Some(away.to_string()),
            penalty_winner: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prediction {
    pub match_id: String,
    pub user_id: String,
    pub payload: PredictionPayload,
    // Last computed score; None until the match is first scored.
    pub score: Option<Score>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub perfect: u32,
    pub aggregate: u32,
    pub outcome: u32,
    pub missed: u32,
}

impl Stats {
    pub fn record(&mut self, primary: Primary) {
        let slot = self.slot(primary);
        *slot = slot.saturating_add(1);
    }

    pub fn unrecord(&mut self, primary: Primary) {
        let slot = self.slot(primary);
        *slot = slot.saturating_sub(1);
    }

    pub fn count(&self) -> u64 {
        u64::from(self.perfect)
            + u64::from(self.aggregate)
            + u64::from(self.outcome)
            + u64::from(self.missed)
    }

    fn slot(&mut self, primary: Primary) -> &mut u32 {
        match primary {
            Primary::Perfect => &mut self.perfect,
            Primary::Aggregate => &mut self.aggregate,
            Primary::Outcome => &mut self.outcome,
            Primary::Miss => &mut self.missed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAggregate {
    pub user_id: String,
    pub display_name: String,
    pub total_points: i64,
    pub stats: Stats,
}

impl UserAggregate {
    pub fn zeroed(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            total_points: 0,
            stats: Stats::default(),
        }
    }

    pub fn reset(&mut self) {
        self.total_points = 0;
        self.stats = Stats::default();
    }

    pub fn add_score(&mut self, score: &Score) {
        self.total_points += i64::from(score.points);
        self.stats.record(score.category.primary);
    }

    pub fn remove_score(&mut self, score: &Score) {
        self.total_points -= i64::from(score.points);
        self.stats.unrecord(score.category.primary);
    }
}

fn lenient_goals<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        // 2.0 arrives as a float but is still two goals.
        Some(Value::Number(n)) => Some(match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() <= f64::from(u32::MAX) => {
                format!("{}", f as i64)
            }
            _ => n.to_string(),
        }),
        Some(other) => Some(other.to_string()),
    })
}
