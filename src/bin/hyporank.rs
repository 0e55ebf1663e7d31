#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, Level};
use uuid::Uuid;

use hyporank::config::HyporankConfig;
use hyporank::gateway::chat_completions::ChatCompletionsAdapter;
use hyporank::gateway::{GatewayConfig, ProviderGateway, TracingUsageSink};
use hyporank::oracle::ChatOracle;
use hyporank::ranking::{
    rank_directory, rank_file, JsonlTraceSink, PairwiseComparator, RankStore, TraceSink,
    TraceWorker, Tournament,
};
use hyporank::scoring::{self, RankingTable};
use hyporank::telemetry::init_tracing;

#[derive(Parser)]
#[command(name = "hyporank", version, about = "Hypothesis tournament ranking and score aggregation")]
struct Cli {
    /// Emit JSON log lines
    #[arg(long, global = true)]
    log_json: bool,
    /// Default log level when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct OracleArgs {
    /// Judge model id (overrides config and HYPORANK_MODEL)
    #[arg(long)]
    model: Option<String>,
    /// Comparisons in flight per unit
    #[arg(long)]
    concurrency: Option<usize>,
    /// Append one JSON line per comparison to this file
    #[arg(long)]
    trace: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank every pending unit of a directory
    Rank {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        /// Units ranked at the same time
        #[arg(long)]
        unit_concurrency: Option<usize>,
        #[command(flatten)]
        oracle: OracleArgs,
    },
    /// Rank a single unit file
    RankFile {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[command(flatten)]
        oracle: OracleArgs,
    },
    /// Regroup eval_res_ artifacts into per-round score_res_ files
    ConvertRounds {
        #[arg(long)]
        root: PathBuf,
        #[arg(long = "category")]
        categories: Vec<String>,
        #[arg(long)]
        min_eval_files: Option<usize>,
    },
    /// Write per-category composition score tables
    ScoreComposition {
        #[arg(long)]
        root: PathBuf,
        #[arg(long = "category")]
        categories: Vec<String>,
    },
    /// Fold category composition tables into the global table
    AggregateComposition {
        #[arg(long)]
        root: PathBuf,
        #[arg(long = "category")]
        categories: Vec<String>,
    },
    /// Write per-category ranking tables
    ScoreRanking {
        #[arg(long)]
        root: PathBuf,
        #[arg(long)]
        results_dir: Option<String>,
        #[arg(long = "category")]
        categories: Vec<String>,
    },
    /// Fold category ranking tables into the global table
    AggregateRanking {
        #[arg(long)]
        root: PathBuf,
        /// One column per category instead of a count column
        #[arg(long)]
        per_category: bool,
        /// Output file name or path
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long = "category")]
        categories: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let level: Level = cli.log_level.parse()?;
    init_tracing(cli.log_json, level);

    let mut config = HyporankConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Rank {
            input,
            output,
            unit_concurrency,
            oracle,
        } => {
            if let Some(n) = unit_concurrency {
                config.ranking.unit_concurrency = n;
            }
            apply_oracle_args(&mut config, &oracle)?;
            let (tournament, worker) = build_tournament(&config, oracle.trace.as_deref())?;
            let store = RankStore::new(&output);
            let summary = rank_directory(
                &tournament,
                &input,
                &store,
                config.ranking.unit_concurrency,
            )
            .await;
            drop(tournament);
            finish_trace(worker)?;
            let summary = summary?;
            println!(
                "found {} skipped {} ranked {} failed {}",
                summary.found, summary.skipped, summary.ranked, summary.failed
            );
        }
        Commands::RankFile {
            input,
            output,
            oracle,
        } => {
            apply_oracle_args(&mut config, &oracle)?;
            let (tournament, worker) = build_tournament(&config, oracle.trace.as_deref())?;
            let store = RankStore::new(&output);
            let ranked = rank_file(&tournament, &input, &store).await;
            drop(tournament);
            finish_trace(worker)?;
            match ranked? {
                Some((path, outcome)) => {
                    println!("rank {} -> {}", outcome.result.rank, path.display())
                }
                None => println!("skipped: result exists"),
            }
        }
        Commands::ConvertRounds {
            root,
            categories,
            min_eval_files,
        } => {
            let categories = pick_categories(&config, categories);
            let min = min_eval_files.unwrap_or(config.scoring.min_eval_files);
            let summary = scoring::convert_rounds(&root, &categories, min);
            println!(
                "folders {} incomplete {} converted {} existing {} failed {}",
                summary.folders,
                summary.incomplete,
                summary.converted,
                summary.existing,
                summary.failed
            );
        }
        Commands::ScoreComposition { root, categories } => {
            let categories = pick_categories(&config, categories);
            let outputs =
                scoring::score_composition(&root, &categories, &config.scoring.model_suffixes)?;
            for output in outputs {
                println!("{}", output.path.display());
            }
        }
        Commands::AggregateComposition { root, categories } => {
            let categories = pick_categories(&config, categories);
            let (path, _) = scoring::aggregate_composition(&root, &categories)?;
            println!("{}", path.display());
        }
        Commands::ScoreRanking {
            root,
            results_dir,
            categories,
        } => {
            let categories = pick_categories(&config, categories);
            let results_dir = results_dir.unwrap_or_else(|| config.scoring.ranking_results_dir.clone());
            let outputs =
                scoring::score_ranking(&root, &categories, &results_dir, config.ranking.r_max)?;
            for output in outputs {
                println!("{}", output.path.display());
            }
        }
        Commands::AggregateRanking {
            root,
            per_category,
            out,
            categories,
        } => {
            let categories = pick_categories(&config, categories);
            let shape = if per_category {
                RankingTable::PerCategory
            } else {
                RankingTable::Counts
            };
            let (path, _) =
                scoring::aggregate_ranking(&root, &categories, shape, out.as_deref())?;
            println!("{}", path.display());
        }
    }

    Ok(())
}

fn pick_categories(config: &HyporankConfig, requested: Vec<String>) -> Vec<String> {
    if requested.is_empty() {
        config.scoring.categories.clone()
    } else {
        requested
    }
}

fn apply_oracle_args(
    config: &mut HyporankConfig,
    args: &OracleArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(model) = &args.model {
        config.oracle.model = model.clone();
    }
    if let Some(n) = args.concurrency {
        config.ranking.comparison_concurrency = n;
    }
    config.validate()?;
    Ok(())
}

fn build_tournament(
    config: &HyporankConfig,
    trace: Option<&Path>,
) -> Result<(Tournament, Option<TraceWorker>), Box<dyn std::error::Error>> {
    let adapter = ChatCompletionsAdapter::with_config(
        config.oracle.api_key()?,
        config.oracle.base_url.clone(),
        config.oracle.timeout(),
    )?;
    let gateway = ProviderGateway::with_config(
        adapter,
        Arc::new(TracingUsageSink),
        GatewayConfig {
            retry: config.oracle.retry.policy(),
        },
    );
    let oracle = ChatOracle::new(Arc::new(gateway), config.oracle.model.clone())
        .with_sampling(config.oracle.sampling());
    let comparator = PairwiseComparator::new(Arc::new(oracle))
        .with_template(config.ranking.template()?)
        .with_max_attempts(config.ranking.max_verdict_attempts);

    let run_id = Uuid::new_v4();
    info!(
        run_id = %run_id,
        model = %config.oracle.model,
        base_url = %config.oracle.base_url,
        r_max = config.ranking.r_max,
        prompt = %config.ranking.prompt,
        "oracle ready"
    );
    let mut tournament =
        Tournament::new(Arc::new(comparator), config.ranking.tournament())?.with_run_id(run_id);

    let mut worker = None;
    if let Some(path) = trace {
        let (sink, trace_worker) = JsonlTraceSink::new(path)?;
        let sink: Arc<dyn TraceSink> = Arc::new(sink);
        tournament = tournament.with_trace(sink);
        worker = Some(trace_worker);
    }
    Ok((tournament, worker))
}

fn finish_trace(worker: Option<TraceWorker>) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(worker) = worker {
        worker.join()?;
    }
    Ok(())
}
