use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use wc26_predictor::demo::{self, DemoConfig};
use wc26_predictor::import;
use wc26_predictor::model::{MatchResult, Side};
use wc26_predictor::scoring::ScoringRules;
use wc26_predictor::settings::{DB_ENV, Settings};
use wc26_predictor::sqlite_store::SqliteStore;
use wc26_predictor::store::{ScoreStore, SubmissionStore};
use wc26_predictor::ScoringEngine;

#[derive(Parser, Debug)]
#[command(name = "wc26_predictor")]
#[command(about = "Admin console for the World Cup prediction league scoring engine")]
#[command(version)]
struct Cli {
    /// SQLite database file
    #[arg(long, global = true, env = DB_ENV)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the schema and default scoring rules
    Init,
    /// Load users, fixtures and predictions from a JSON file
    Import { file: PathBuf },
    /// Record or correct a match result and adjust the leaderboard
    SetResult(SetResultArgs),
    /// Reset every user total and rescore all completed matches
    Recalculate {
        /// Confirm the full reset
        #[arg(long)]
        yes: bool,
    },
    /// Show or change the scoring rules
    Rules {
        #[command(subcommand)]
        action: Option<RulesAction>,
    },
    /// Compare stored totals with stored prediction scores
    Audit {
        #[arg(long)]
        json: bool,
    },
    /// Print the leaderboard
    Standings {
        #[arg(long)]
        json: bool,
    },
    /// Show recent committed scoring passes
    Runs {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Seed random users, fixtures and predictions, then score some results
    Demo(DemoArgs),
}

#[derive(Args, Debug)]
struct SetResultArgs {
    match_id: String,
    /// Home goals; omit to clear
    #[arg(long)]
    home: Option<u32>,
    /// Away goals; omit to clear
    #[arg(long)]
    away: Option<u32>,
    /// Shootout winner
    #[arg(long, value_parser = parse_side)]
    penalties: Option<Side>,
}

#[derive(Subcommand, Debug)]
enum RulesAction {
    Show,
    Set {
        #[arg(long)]
        perfect: Option<u32>,
        #[arg(long)]
        aggregate: Option<u32>,
        #[arg(long)]
        outcome: Option<u32>,
        #[arg(long)]
        penalty_bonus: Option<u32>,
    },
}

#[derive(Args, Debug)]
struct DemoArgs {
    #[arg(long, default_value_t = 12)]
    users: usize,
    #[arg(long, default_value_t = 24)]
    matches: usize,
    /// How many of the seeded matches get a result
    #[arg(long, default_value_t = 8)]
    results: usize,
    #[arg(long, default_value_t = 2026)]
    seed: u64,
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let cli = Cli::parse();
    let settings = Settings::resolve(cli.db.as_deref()).context("resolve settings")?;
    init_tracing(&settings.log_filter);

    let store = SqliteStore::open(&settings.db_path)
        .with_context(|| format!("open database {}", settings.db_path.display()))?;
    let mut engine = ScoringEngine::new(store);

    match cli.command {
        Command::Init => {
            println!("Database ready: {}", settings.db_path.display());
        }
        Command::Import { file } => {
            let records = import::load_import_file(&file)
                .with_context(|| format!("read import file {}", file.display()))?;
            let summary = import::apply_import(engine.store_mut(), &records)?;
            println!(
                "Imported users={} fixtures={} predictions={}",
                summary.users, summary.fixtures, summary.predictions
            );
            if !summary.rejected.is_empty() {
                println!("Rejected: {}", summary.rejected.len());
                for line in summary.rejected.iter().take(8) {
                    println!(" - {line}");
                }
            }
        }
        Command::SetResult(args) => {
            let result = MatchResult {
                home: args.home,
                away: args.away,
                penalty_winner: args.penalties,
            };
            let summary = engine
                .record_result(&args.match_id, result)
                .with_context(|| format!("error updating score for {}", args.match_id))?;
            let verb = if summary.correction { "corrected" } else { "recorded" };
            println!(
                "Result {verb} for {}: {} predictions scored, {} users adjusted, net {:+} pts",
                summary.match_id,
                summary.predictions_scored,
                summary.aggregates_updated,
                summary.points_delta
            );
            if !summary.skipped_users.is_empty() {
                println!("Users without a leaderboard entry: {:?}", summary.skipped_users);
            }
        }
        Command::Recalculate { yes } => {
            if !yes {
                return Err(anyhow!(
                    "recalculate resets every user total to 0 and rescores all completed matches; rerun with --yes"
                ));
            }
            let summary = engine.recalculate_all().context("error recalculating")?;
            println!(
                "Leaderboard fully recalculated: {} matches, {} predictions scored, {} skipped, {} users",
                summary.completed_matches,
                summary.predictions_scored,
                summary.predictions_skipped,
                summary.aggregates_written
            );
        }
        Command::Rules { action } => match action.unwrap_or(RulesAction::Show) {
            RulesAction::Show => print_rules(&engine.store().load_rules()?),
            RulesAction::Set {
                perfect,
                aggregate,
                outcome,
                penalty_bonus,
            } => {
                let mut rules = engine.store().load_rules()?;
                rules.perfect_score = perfect.unwrap_or(rules.perfect_score);
                rules.aggregate_score = aggregate.unwrap_or(rules.aggregate_score);
                rules.outcome_score = outcome.unwrap_or(rules.outcome_score);
                rules.penalty_bonus = penalty_bonus.unwrap_or(rules.penalty_bonus);
                engine.store_mut().save_rules(&rules)?;
                print_rules(&rules);
                println!("Existing scores are unchanged until `recalculate --yes` runs.");
            }
        },
        Command::Audit { json } => {
            let report = engine.audit()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "Checked {} users over {} scored predictions",
                    report.users_checked, report.counted_predictions
                );
                println!("Unscored predictions on completed matches: {}", report.unscored);
                println!("Scores stale under current rules: {}", report.stale_scores);
                for drift in &report.drifts {
                    println!(
                        " - {}: stored {} expected {} (stats {:?} vs {:?})",
                        drift.user_id,
                        drift.stored_total,
                        drift.expected_total,
                        drift.stored_stats,
                        drift.expected_stats
                    );
                }
                if report.is_consistent() && report.stale_scores == 0 {
                    println!("Leaderboard is consistent.");
                }
            }
        }
        Command::Standings { json } => {
            let rows = engine.standings()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                println!(
                    "{:>3}  {:<20} {:>4} {:>4} {:>4} {:>4} {:>5}",
                    "#", "Player", "Perf", "Agg", "Out", "Miss", "Pts"
                );
                for (idx, row) in rows.iter().enumerate() {
                    println!(
                        "{:>3}  {:<20} {:>4} {:>4} {:>4} {:>4} {:>5}",
                        idx + 1,
                        row.display_name,
                        row.stats.perfect,
                        row.stats.aggregate,
                        row.stats.outcome,
                        row.stats.missed,
                        row.total_points
                    );
                }
            }
        }
        Command::Runs { limit } => {
            for run in engine.store().recent_runs(limit)? {
                println!(
                    "{} {:<14} match={} predictions={} users={}",
                    run.committed_at,
                    run.kind,
                    run.match_id.as_deref().unwrap_or("-"),
                    run.predictions_scored,
                    run.aggregates_written
                );
            }
        }
        Command::Demo(args) => {
            let mut rng = StdRng::seed_from_u64(args.seed);
            let cfg = DemoConfig {
                users: args.users,
                matches: args.matches,
                ..DemoConfig::default()
            };
            let seeded = demo::seed_demo(engine.store_mut(), &cfg, &mut rng)?;
            println!(
                "Seeded {} users, {} fixtures, {} predictions",
                seeded.users,
                seeded.fixtures.len(),
                seeded.predictions
            );
            for match_id in seeded.fixtures.iter().take(args.results) {
                let knockout = engine
                    .store()
                    .load_match(match_id)?
                    .is_some_and(|m| demo::is_knockout(&m.stage_id));
                let result = demo::random_result(&mut rng, knockout);
                engine.record_result(match_id, result)?;
            }
            println!("Scored {} results", args.results.min(seeded.fixtures.len()));
        }
    }

    Ok(())
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn parse_side(raw: &str) -> std::result::Result<Side, String> {
    Side::parse(raw).ok_or_else(|| format!("expected `home` or `away`, got `{raw}`"))
}

fn print_rules(rules: &ScoringRules) {
    println!("Perfect score:   {}", rules.perfect_score);
    println!("Aggregate score: {}", rules.aggregate_score);
    println!("Outcome score:   {}", rules.outcome_score);
    println!("Penalty bonus:   {}", rules.penalty_bonus);
}
