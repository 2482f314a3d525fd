use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{MatchResult, PredictionPayload};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringRules {
    pub perfect_score: u32,
    pub aggregate_score: u32,
    pub outcome_score: u32,
    pub penalty_bonus: u32,
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            perfect_score: 5,
            aggregate_score: 3,
            outcome_score: 1,
            penalty_bonus: 2,
        }
    }
}

/// Main-score category of a classified prediction. Stat counters are keyed on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Primary {
    Perfect,
    Aggregate,
    Outcome,
    Miss,
}

impl Primary {
    pub fn as_str(self) -> &'static str {
        match self {
            Primary::Perfect => "Perfect",
            Primary::Aggregate => "Aggregate",
            Primary::Outcome => "Outcome",
            Primary::Miss => "Miss",
        }
    }
}

/// Tagged classification; the display label is derived from it, never parsed back for logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Category {
    pub primary: Primary,
    pub bonus: bool,
}

impl Category {
    pub const MISS: Category = Category {
        primary: Primary::Miss,
        bonus: false,
    };

    pub fn label(&self) -> String {
        match (self.primary, self.bonus) {
            (Primary::Miss, true) => "BonusOnly".to_string(),
            (primary, true) => format!("{}+Bonus", primary.as_str()),
            (primary, false) => primary.as_str().to_string(),
        }
    }

    /// Parses a stored label. Accepts the older spaced spellings ("Perfect + Bonus", "Bonus Only").
    pub fn from_label(raw: &str) -> Option<Category> {
        let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.eq_ignore_ascii_case("BonusOnly") {
            return Some(Category {
                primary: Primary::Miss,
                bonus: true,
            });
        }
        let (main, bonus) = match compact.split_once('+') {
            Some((main, suffix)) if suffix.eq_ignore_ascii_case("Bonus") => (main, true),
            Some(_) => return None,
            None => (compact.as_str(), false),
        };
        let primary = [
            Primary::Perfect,
            Primary::Aggregate,
            Primary::Outcome,
            Primary::Miss,
        ]
        .into_iter()
        .find(|p| p.as_str().eq_ignore_ascii_case(main))?;
        if primary == Primary::Miss && bonus {
            return None;
        }
        Some(Category { primary, bonus })
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Score {
    pub points: u32,
    pub category: Category,
}

impl Score {
    pub const ZERO: Score = Score {
        points: 0,
        category: Category::MISS,
    };
}

pub fn classify(
    prediction: Option<&PredictionPayload>,
    result: Option<&MatchResult>,
    rules: &ScoringRules,
) -> Score {
    let (Some(prediction), Some(result)) = (prediction, result) else {
        return Score::ZERO;
    };

    let mut points = 0u32;
    let mut primary = Primary::Miss;

    // Unparseable goals only void the main score; the penalty check below still runs.
    let goals = (
        prediction.home.as_deref().and_then(parse_goals),
        prediction.away.as_deref().and_then(parse_goals),
        result.home.map(i64::from),
        result.away.map(i64::from),
    );
    if let (Some(p_home), Some(p_away), Some(r_home), Some(r_away)) = goals {
        let p_diff = p_home - p_away;
        let r_diff = r_home - r_away;
        let same_outcome = p_diff.signum() == r_diff.signum();

        if p_home == r_home && p_away == r_away {
            points = points.saturating_add(rules.perfect_score);
            primary = Primary::Perfect;
        } else if same_outcome && p_diff == r_diff {
            points = points.saturating_add(rules.aggregate_score);
            primary = Primary::Aggregate;
        } else if same_outcome {
            points = points.saturating_add(rules.outcome_score);
            primary = Primary::Outcome;
        }
    }

    let bonus = match result.penalty_winner {
        Some(winner) => prediction.penalty_winner == Some(winner),
        None => false,
    };
    if bonus {
        points = points.saturating_add(rules.penalty_bonus);
    }

    Score {
        points,
        category: Category { primary, bonus },
    }
}

/// Goals as typed by a user, read like a lenient form field: an optional sign and
/// the leading digits, ignoring whatever follows. No leading digits means malformed.
pub fn parse_goals(raw: &str) -> Option<i64> {
    let trimmed = raw.trim_start();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let magnitude = i64::from(rest[..end].parse::<u32>().ok()?);
    Some(if negative { -magnitude } else { magnitude })
}
