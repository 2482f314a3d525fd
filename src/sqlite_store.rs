use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params, params_from_iter};
use tracing::warn;

use crate::batch::{CommitReceipt, ScoringBatch};
use crate::error::{EngineError, Result};
use crate::model::{
    Match, MatchResult, MatchStatus, Prediction, PredictionPayload, Side, Stats, UserAggregate,
};
use crate::scoring::{Category, Score, ScoringRules};
use crate::store::{NewFixture, PredictionFilter, ScoreStore, ScoringRun, SubmissionStore};

const MATCH_COLUMNS: &str = "match_id, team_a, team_b, kickoff_utc, stage_id, status, \
     result_home, result_away, result_penalty_winner";
const PREDICTION_COLUMNS: &str =
    "match_id, user_id, home, away, penalty_winner, points, score_type";
const AGGREGATE_COLUMNS: &str =
    "user_id, display_name, total_points, perfect, aggregate, outcome, missed";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Raw connection for maintenance and tests. Writes issued here bypass the engine.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;
        CREATE TABLE IF NOT EXISTS matches (
            match_id TEXT PRIMARY KEY,
            team_a TEXT NOT NULL,
            team_b TEXT NOT NULL,
            kickoff_utc TEXT NOT NULL,
            stage_id TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('UPCOMING', 'COMPLETED')),
            result_home INTEGER NULL CHECK (result_home >= 0),
            result_away INTEGER NULL CHECK (result_away >= 0),
            result_penalty_winner TEXT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_matches_status ON matches(status);
        CREATE INDEX IF NOT EXISTS idx_matches_stage ON matches(stage_id);

        CREATE TABLE IF NOT EXISTS user_aggregates (
            user_id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            total_points INTEGER NOT NULL DEFAULT 0,
            perfect INTEGER NOT NULL DEFAULT 0,
            aggregate INTEGER NOT NULL DEFAULT 0,
            outcome INTEGER NOT NULL DEFAULT 0,
            missed INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS predictions (
            match_id TEXT NOT NULL REFERENCES matches(match_id),
            user_id TEXT NOT NULL,
            home TEXT NULL,
            away TEXT NULL,
            penalty_winner TEXT NULL,
            points INTEGER NULL,
            score_type TEXT NULL,
            submitted_at TEXT NOT NULL,
            scored_at TEXT NULL,
            PRIMARY KEY (match_id, user_id)
        );
        CREATE INDEX IF NOT EXISTS idx_predictions_user ON predictions(user_id);

        CREATE TABLE IF NOT EXISTS scoring_rules (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            perfect_score INTEGER NOT NULL CHECK (perfect_score >= 0),
            aggregate_score INTEGER NOT NULL CHECK (aggregate_score >= 0),
            outcome_score INTEGER NOT NULL CHECK (outcome_score >= 0),
            penalty_bonus INTEGER NOT NULL CHECK (penalty_bonus >= 0),
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS scoring_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            match_id TEXT NULL,
            predictions_scored INTEGER NOT NULL,
            aggregates_written INTEGER NOT NULL,
            committed_at TEXT NOT NULL
        );
        "#,
    )?;

    let defaults = ScoringRules::default();
    conn.execute(
        "INSERT OR IGNORE INTO scoring_rules(id, perfect_score, aggregate_score, outcome_score, penalty_bonus, updated_at)
         VALUES (1, ?1, ?2, ?3, ?4, ?5)",
        params![
            defaults.perfect_score,
            defaults.aggregate_score,
            defaults.outcome_score,
            defaults.penalty_bonus,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

impl ScoreStore for SqliteStore {
    fn load_match(&self, match_id: &str) -> Result<Option<Match>> {
        let sql = format!("SELECT {MATCH_COLUMNS} FROM matches WHERE match_id = ?1");
        let row = self
            .conn
            .query_row(&sql, params![match_id], decode_match)
            .optional()?;
        Ok(row)
    }

    fn load_matches(&self) -> Result<Vec<Match>> {
        let sql =
            format!("SELECT {MATCH_COLUMNS} FROM matches ORDER BY kickoff_utc ASC, match_id ASC");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], decode_match)?;
        collect_rows(rows)
    }

    fn load_completed_matches(&self) -> Result<Vec<Match>> {
        let sql = format!(
            "SELECT {MATCH_COLUMNS} FROM matches WHERE status = 'COMPLETED' ORDER BY kickoff_utc ASC, match_id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], decode_match)?;
        collect_rows(rows)
    }

    fn load_predictions(&self, filter: PredictionFilter<'_>) -> Result<Vec<Prediction>> {
        let (clause, arg) = match filter {
            PredictionFilter::All => ("", None),
            PredictionFilter::Match(id) => ("WHERE match_id = ?1", Some(id)),
            PredictionFilter::User(id) => ("WHERE user_id = ?1", Some(id)),
        };
        let sql = format!(
            "SELECT {PREDICTION_COLUMNS} FROM predictions {clause} ORDER BY match_id ASC, user_id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(arg), decode_prediction)?;
        collect_rows(rows)
    }

    fn load_aggregates(&self, user_ids: &[String]) -> Result<HashMap<String, UserAggregate>> {
        let sql = format!("SELECT {AGGREGATE_COLUMNS} FROM user_aggregates WHERE user_id = ?1");
        let mut stmt = self.conn.prepare(&sql)?;
        let mut out = HashMap::new();
        for user_id in user_ids {
            if out.contains_key(user_id) {
                continue;
            }
            if let Some(agg) = stmt
                .query_row(params![user_id], decode_aggregate)
                .optional()?
            {
                out.insert(user_id.clone(), agg);
            }
        }
        Ok(out)
    }

    fn load_all_aggregates(&self) -> Result<Vec<UserAggregate>> {
        let sql = format!("SELECT {AGGREGATE_COLUMNS} FROM user_aggregates ORDER BY user_id ASC");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], decode_aggregate)?;
        collect_rows(rows)
    }

    fn load_rules(&self) -> Result<ScoringRules> {
        let rules = self.conn.query_row(
            "SELECT perfect_score, aggregate_score, outcome_score, penalty_bonus FROM scoring_rules WHERE id = 1",
            [],
            |row| {
                Ok(ScoringRules {
                    perfect_score: row.get(0)?,
                    aggregate_score: row.get(1)?,
                    outcome_score: row.get(2)?,
                    penalty_bonus: row.get(3)?,
                })
            },
        )?;
        Ok(rules)
    }

    fn recent_runs(&self, limit: usize) -> Result<Vec<ScoringRun>> {
        let mut stmt = self.conn.prepare(
            "SELECT kind, match_id, predictions_scored, aggregates_written, committed_at
             FROM scoring_runs ORDER BY run_id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(ScoringRun {
                kind: row.get(0)?,
                match_id: row.get(1)?,
                predictions_scored: row.get::<_, i64>(2)? as usize,
                aggregates_written: row.get::<_, i64>(3)? as usize,
                committed_at: row.get(4)?,
            })
        })?;
        collect_rows(rows)
    }

    fn commit(&mut self, batch: &ScoringBatch) -> Result<CommitReceipt> {
        let tx = self.conn.transaction().map_err(rejected)?;
        apply_batch(&tx, batch)?;
        // Dropping an uncommitted transaction rolls it back, so every early return above is clean.
        tx.commit().map_err(rejected)?;
        Ok(CommitReceipt {
            writes: batch.write_count(),
        })
    }
}

fn apply_batch(tx: &Transaction<'_>, batch: &ScoringBatch) -> Result<()> {
    let now = Utc::now().to_rfc3339();

    if let Some(write) = batch.match_result() {
        let changed = tx
            .execute(
                "UPDATE matches
                 SET status = 'COMPLETED', result_home = ?1, result_away = ?2,
                     result_penalty_winner = ?3, updated_at = ?4
                 WHERE match_id = ?5",
                params![
                    write.result.home,
                    write.result.away,
                    write.result.penalty_winner.map(Side::as_str),
                    now,
                    write.match_id,
                ],
            )
            .map_err(rejected)?;
        if changed != 1 {
            return Err(EngineError::CommitRejected(format!(
                "match {} vanished before commit",
                write.match_id
            )));
        }
    }

    {
        let mut stmt = tx
            .prepare(
                "UPDATE predictions SET points = ?1, score_type = ?2, scored_at = ?3
                 WHERE match_id = ?4 AND user_id = ?5",
            )
            .map_err(rejected)?;
        for write in batch.prediction_scores() {
            let changed = stmt
                .execute(params![
                    write.score.points,
                    write.score.category.label(),
                    now,
                    write.match_id,
                    write.user_id,
                ])
                .map_err(rejected)?;
            if changed != 1 {
                return Err(EngineError::CommitRejected(format!(
                    "prediction {}/{} vanished before commit",
                    write.match_id, write.user_id
                )));
            }
        }
    }

    {
        let mut stmt = tx
            .prepare(
                "UPDATE user_aggregates
                 SET total_points = ?1, perfect = ?2, aggregate = ?3, outcome = ?4, missed = ?5,
                     updated_at = ?6
                 WHERE user_id = ?7",
            )
            .map_err(rejected)?;
        for agg in batch.aggregates() {
            let changed = stmt
                .execute(params![
                    agg.total_points,
                    agg.stats.perfect,
                    agg.stats.aggregate,
                    agg.stats.outcome,
                    agg.stats.missed,
                    now,
                    agg.user_id,
                ])
                .map_err(rejected)?;
            if changed != 1 {
                return Err(EngineError::CommitRejected(format!(
                    "aggregate {} vanished before commit",
                    agg.user_id
                )));
            }
        }
    }

    tx.execute(
        "INSERT INTO scoring_runs(kind, match_id, predictions_scored, aggregates_written, committed_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            batch.kind().as_str(),
            batch.kind().match_id(),
            batch.prediction_scores().len() as i64,
            batch.aggregate_count() as i64,
            now,
        ],
    )
    .map_err(rejected)?;
    Ok(())
}

impl SubmissionStore for SqliteStore {
    fn register_user(&mut self, user_id: &str, display_name: &str) -> Result<()> {
        if user_id.trim().is_empty() {
            return Err(EngineError::InvalidInput("empty user id".to_string()));
        }
        self.conn.execute(
            "INSERT INTO user_aggregates(user_id, display_name, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET display_name = excluded.display_name",
            params![user_id, display_name, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn add_fixture(&mut self, fixture: &NewFixture) -> Result<()> {
        if fixture.match_id.trim().is_empty() {
            return Err(EngineError::InvalidInput("empty match id".to_string()));
        }
        self.conn.execute(
            "INSERT INTO matches(match_id, team_a, team_b, kickoff_utc, stage_id, status, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'UPCOMING', ?6)
             ON CONFLICT(match_id) DO UPDATE SET
                team_a = excluded.team_a,
                team_b = excluded.team_b,
                kickoff_utc = excluded.kickoff_utc,
                stage_id = excluded.stage_id,
                updated_at = excluded.updated_at",
            params![
                fixture.match_id,
                fixture.team_a,
                fixture.team_b,
                fixture.kickoff_utc,
                fixture.stage_id,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn submit_prediction(
        &mut self,
        match_id: &str,
        user_id: &str,
        payload: &PredictionPayload,
    ) -> Result<()> {
        let Some(fixture) = self.load_match(match_id)? else {
            return Err(EngineError::MatchNotFound(match_id.to_string()));
        };
        if fixture.is_completed() {
            return Err(EngineError::PredictionLocked(match_id.to_string()));
        }
        let known_user = self
            .conn
            .query_row(
                "SELECT 1 FROM user_aggregates WHERE user_id = ?1",
                params![user_id],
                |_| Ok(()),
            )
            .optional()?;
        if known_user.is_none() {
            return Err(EngineError::UnknownUser(user_id.to_string()));
        }

        self.conn.execute(
            "INSERT INTO predictions(match_id, user_id, home, away, penalty_winner, submitted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(match_id, user_id) DO UPDATE SET
                home = excluded.home,
                away = excluded.away,
                penalty_winner = excluded.penalty_winner,
                submitted_at = excluded.submitted_at",
            params![
                match_id,
                user_id,
                payload.home,
                payload.away,
                payload.penalty_winner.map(Side::as_str),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn save_rules(&mut self, rules: &ScoringRules) -> Result<()> {
        self.conn.execute(
            "UPDATE scoring_rules
             SET perfect_score = ?1, aggregate_score = ?2, outcome_score = ?3, penalty_bonus = ?4,
                 updated_at = ?5
             WHERE id = 1",
            params![
                rules.perfect_score,
                rules.aggregate_score,
                rules.outcome_score,
                rules.penalty_bonus,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

fn rejected(err: rusqlite::Error) -> EngineError {
    EngineError::CommitRejected(err.to_string())
}

fn collect_rows<T, F>(rows: rusqlite::MappedRows<'_, F>) -> Result<Vec<T>>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn decode_match(row: &Row<'_>) -> rusqlite::Result<Match> {
    let raw_status: String = row.get(5)?;
    let status = MatchStatus::parse(&raw_status).unwrap_or_else(|| {
        warn!(status = %raw_status, "unknown match status, treating as upcoming");
        MatchStatus::Upcoming
    });
    let result = match status {
        MatchStatus::Completed => Some(MatchResult {
            home: row.get(6)?,
            away: row.get(7)?,
            penalty_winner: decode_side(row.get(8)?),
        }),
        MatchStatus::Upcoming => None,
    };
    Ok(Match {
        match_id: row.get(0)?,
        team_a: row.get(1)?,
        team_b: row.get(2)?,
        kickoff_utc: row.get(3)?,
        stage_id: row.get(4)?,
        status,
        result,
    })
}

fn decode_prediction(row: &Row<'_>) -> rusqlite::Result<Prediction> {
    let match_id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let points: Option<u32> = row.get(5)?;
    let label: Option<String> = row.get(6)?;
    let score = match (points, label) {
        (None, None) => None,
        (points, label) => {
            let category = match label.as_deref() {
                Some(raw) => Category::from_label(raw).unwrap_or_else(|| {
                    warn!(
                        %match_id,
                        %user_id,
                        label = raw,
                        "unreadable score label, counting as miss"
                    );
                    Category::MISS
                }),
                None => Category::MISS,
            };
            Some(Score {
                points: points.unwrap_or(0),
                category,
            })
        }
    };
    Ok(Prediction {
        payload: PredictionPayload {
            home: row.get(2)?,
            away: row.get(3)?,
            penalty_winner: decode_side(row.get(4)?),
        },
        match_id,
        user_id,
        score,
    })
}

fn decode_aggregate(row: &Row<'_>) -> rusqlite::Result<UserAggregate> {
    Ok(UserAggregate {
        user_id: row.get(0)?,
        display_name: row.get(1)?,
        total_points: row.get(2)?,
        stats: Stats {
            perfect: row.get(3)?,
            aggregate: row.get(4)?,
            outcome: row.get(5)?,
            missed: row.get(6)?,
        },
    })
}

fn decode_side(raw: Option<String>) -> Option<Side> {
    raw.as_deref().and_then(Side::parse)
}
