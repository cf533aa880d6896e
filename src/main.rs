//! SmartAcca: AI-verified daily football accumulator.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the data sources, AI backend and store into a `Pipeline`, and
//! runs the requested job (or the scheduler loop with graceful shutdown).

use anyhow::Result;
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use std::sync::Arc;
use tracing::{info, warn};

use smartacca::config::{AppConfig, FallbackSource, LlmProvider};
use smartacca::data::api_football::ApiFootballClient;
use smartacca::data::espn::EspnScoreboard;
use smartacca::data::football_data::FootballDataClient;
use smartacca::data::ResultSource;
use smartacca::engine::accumulator::AccuracyStats;
use smartacca::engine::analyst::{MatchAnalyst, RetryExecutor, TokioSleeper};
use smartacca::engine::enricher::Enricher;
use smartacca::engine::jobs::{DailyReport, FetchReport, FetchScope, Pipeline};
use smartacca::engine::matcher::TeamNameMatcher;
use smartacca::engine::resolver::{ResultSourceChain, ScoreboardSource};
use smartacca::engine::scheduler;
use smartacca::llm::gemini::GeminiClient;
use smartacca::llm::openrouter::OpenRouterClient;
use smartacca::llm::TextGenerator;
use smartacca::storage::MatchStore;
use smartacca::types::{parse_day, AccaError, MatchStatus};

const BANNER: &str = r#"
  ____                       _      _
 / ___| _ __ ___   __ _ _ __| |_   / \   ___ ___ __ _
 \___ \| '_ ` _ \ / _` | '__| __| / _ \ / __/ __/ _` |
  ___) | | | | | | (_| | |  | |_ / ___ \ (_| (_| (_| |
 |____/|_| |_| |_|\__,_|_|   \__/_/   \_\___\___\__,_|

  AI-verified daily football accumulator
  v0.1.0
"#;

#[derive(Parser)]
#[command(name = "smartacca", version, about = "AI-verified daily football accumulator")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "config.toml", env = "SMARTACCA_CONFIG")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyse a day's fixtures and select the accumulator.
    Generate {
        /// Clear accumulator flags on every previous day first.
        #[arg(long)]
        reset: bool,
        /// Match day (YYYY-MM-DD), default today.
        #[arg(long)]
        date: Option<String>,
    },
    /// Fetch results, settle bets and write post-mortems.
    FetchResults(FetchArgs),
    /// Enter a result by hand.
    SetResult {
        #[arg(long)]
        match_id: i64,
        #[arg(long)]
        home_score: u32,
        #[arg(long)]
        away_score: u32,
        #[arg(long, default_value = "FT")]
        status: String,
    },
    /// Run the daily/hourly scheduler until Ctrl+C.
    Scheduler,
    /// Print accumulator prediction accuracy.
    Stats,
    /// List the generative models available to the Gemini key.
    ListModels,
}

#[derive(Args)]
#[group(multiple = false)]
struct FetchArgs {
    /// Every record of this match day (YYYY-MM-DD).
    #[arg(long)]
    date: Option<String>,
    /// Unfetched records that kicked off within the last N days.
    #[arg(long)]
    days_back: Option<i64>,
    /// A single record by id.
    #[arg(long)]
    match_id: Option<i64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    let cfg = AppConfig::load(&cli.config)?;

    init_logging();

    println!("{BANNER}");
    info!(name = %cfg.app.name, database = %cfg.app.database_url, "SmartAcca starting up");

    match cli.command {
        Command::Generate { reset, date } => {
            let day = day_or_today(date.as_deref())?;
            let pipeline = build_pipeline(&cfg).await?;
            let report = pipeline.generate_daily(day, reset).await?;
            print_daily(&report);
        }
        Command::FetchResults(args) => {
            let scope = if let Some(id) = args.match_id {
                FetchScope::Record(id)
            } else if let Some(date) = args.date.as_deref() {
                FetchScope::Day(parse_day(date)?)
            } else {
                FetchScope::LookBack(args.days_back.unwrap_or(cfg.results.default_days_back))
            };
            let pipeline = build_pipeline(&cfg).await?;
            let report = pipeline.fetch_results(scope).await?;
            print_fetch(&report);
        }
        Command::SetResult {
            match_id,
            home_score,
            away_score,
            status,
        } => {
            let pipeline = build_pipeline(&cfg).await?;
            let status = MatchStatus::from_code(&status);
            let record = pipeline
                .apply_manual_result(match_id, home_score, away_score, status)
                .await?;
            println!("Updated {record}");
            if let Some(outcome) = record.outcome {
                println!("  Outcome: {outcome}");
            }
        }
        Command::Scheduler => {
            let settings = cfg.schedule_settings()?;
            let pipeline = build_pipeline(&cfg).await?;
            scheduler::run(&pipeline, &settings).await?;
            info!("SmartAcca shut down cleanly.");
        }
        Command::Stats => {
            let store = MatchStore::connect(&cfg.app.database_url).await?;
            let members = store.accumulator_members().await?;
            print_accuracy(&AccuracyStats::from_records(&members));
        }
        Command::ListModels => {
            let key = require_key(&cfg.llm.api_key_env)?;
            let gemini = GeminiClient::new(key, cfg.llm.model.clone(), false, cfg.llm.timeout_secs)?;
            for model in gemini.list_models().await?.iter().filter(|m| m.can_generate()) {
                match &model.display_name {
                    Some(display) => println!("{}  ({display})", model.name),
                    None => println!("{}", model.name),
                }
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

fn require_key(env_name: &str) -> Result<secrecy::SecretString, AccaError> {
    AppConfig::resolve_env(env_name)
        .ok_or_else(|| AccaError::Config(format!("Environment variable not set: {env_name}")))
}

fn day_or_today(date: Option<&str>) -> Result<NaiveDate, AccaError> {
    match date {
        Some(d) => parse_day(d),
        None => Ok(Local::now().date_naive()),
    }
}

fn build_generator(cfg: &AppConfig) -> Result<Arc<dyn TextGenerator>> {
    let key = require_key(&cfg.llm.api_key_env)?;
    let generator: Arc<dyn TextGenerator> = match cfg.llm.provider {
        LlmProvider::Gemini => Arc::new(GeminiClient::new(
            key,
            cfg.llm.model.clone(),
            cfg.llm.grounding,
            cfg.llm.timeout_secs,
        )?),
        LlmProvider::OpenRouter => Arc::new(OpenRouterClient::new(
            key,
            cfg.llm.model.clone(),
            cfg.llm.fallback_model.clone(),
            cfg.llm.timeout_secs,
        )?),
    };
    info!(provider = ?cfg.llm.provider, model = generator.model_name(), "AI backend ready");
    Ok(generator)
}

async fn build_pipeline(cfg: &AppConfig) -> Result<Pipeline> {
    let store = MatchStore::connect(&cfg.app.database_url).await?;
    let matcher = TeamNameMatcher::new(cfg.results.match_threshold);

    let leagues = cfg.tracked_leagues();
    if leagues.is_empty() {
        warn!("No leagues configured; every fixture will be filtered out");
    }
    let api_football = Arc::new(ApiFootballClient::new(
        require_key(&cfg.football_api.api_key_env)?,
        cfg.football_api.base_url.clone(),
        leagues,
        cfg.football_api.timeout_secs,
    )?);

    let fd_key = AppConfig::resolve_env(&cfg.football_data.api_key_env);
    if fd_key.is_none() {
        warn!(
            env = %cfg.football_data.api_key_env,
            "football-data.org key not set; standings and form will be unavailable"
        );
    }
    let football_data = Arc::new(FootballDataClient::new(
        fd_key,
        cfg.football_data.base_url.clone(),
        matcher.clone(),
        cfg.football_data.timeout_secs,
    )?);

    let mut sources: Vec<Box<dyn ResultSource>> = Vec::new();
    sources.push(Box::new(api_football.clone()));
    for fallback in &cfg.results.sources {
        match fallback {
            FallbackSource::Espn => sources.push(Box::new(ScoreboardSource::new(
                EspnScoreboard::new(cfg.results.espn_base_url.clone(), cfg.football_api.timeout_secs)?,
                matcher.clone(),
            ))),
            FallbackSource::FootballData => sources.push(Box::new(ScoreboardSource::new(
                football_data.clone(),
                matcher.clone(),
            ))),
        }
    }
    let resolver = ResultSourceChain::new(sources);
    info!(sources = ?resolver.source_names(), "Result source chain ready");

    let enricher = Enricher::new(Some(api_football.clone()), Some(football_data), matcher);
    let sleeper = Arc::new(TokioSleeper);
    let analyst = MatchAnalyst::new(RetryExecutor::new(
        build_generator(cfg)?,
        sleeper.clone(),
        cfg.retry_policy(),
    ));

    Ok(Pipeline::new(
        store,
        api_football,
        Arc::new(enricher),
        analyst,
        resolver,
        sleeper,
        cfg.job_settings(),
    ))
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

fn print_daily(report: &DailyReport) {
    println!(
        "{}: {} fixtures, {} analysed, {} failed",
        report.day, report.fixtures, report.persisted, report.failed
    );
    if report.selected.is_empty() {
        println!("No eligible matches for an accumulator.");
        return;
    }
    println!("Accumulator ({} picks):", report.selected.len());
    for (i, pick) in report.selected.iter().enumerate() {
        println!("  {}. {pick}", i + 1);
    }
}

fn print_fetch(report: &FetchReport) {
    println!(
        "Results: {} considered, {} updated, {} not available",
        report.considered, report.successful, report.failed
    );
    print_accuracy(&report.accuracy);
}

fn print_accuracy(stats: &AccuracyStats) {
    println!("Accuracy: {stats}");
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("smartacca=info"));

    let json_logging = std::env::var("SMARTACCA_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
