use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rxcond_analytics::{AnalyticsConfig, AnalyticsPipeline};
use rxcond_core::ReagentKind;
use rxcond_engine::{EngineConfig, PredictRequest, RecommendationEngine};
use rxcond_storage::SnapshotStore;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "rxcond")]
#[command(about = "Reaction condition recommender command-line interface")]
struct Cli {
    /// Overrides RXCOND_DATA_DIR.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Aggregate the raw datasets for a reaction type into a new snapshot.
    Analyze {
        #[arg(long, default_value = "Ullmann")]
        reaction_type: String,
    },
    /// Table scores for one or all reagent classes.
    Recommend {
        #[arg(long)]
        reaction_type: String,
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
        #[arg(long, default_value_t = 5)]
        top_n: usize,
        #[arg(long, default_value_t = 0.3)]
        min_compat: f64,
        #[arg(long)]
        reference: Option<String>,
    },
    /// Export payload for `{"reaction_smiles", "selected_reaction_type"}` given inline or on stdin.
    Predict { request: Option<String> },
    /// Markdown listing of the most recent snapshots.
    Report {
        #[arg(long, default_value = "Ullmann")]
        reaction_type: String,
        #[arg(long, default_value_t = 5)]
        runs: usize,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Ligand,
    Solvent,
    Base,
}

impl From<KindArg> for ReagentKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Ligand => ReagentKind::Ligand,
            KindArg::Solvent => ReagentKind::Solvent,
            KindArg::Base => ReagentKind::Base,
        }
    }
}

fn analytics_config(data_dir: Option<PathBuf>) -> AnalyticsConfig {
    match data_dir {
        Some(dir) => AnalyticsConfig::new(dir),
        None => AnalyticsConfig::from_env(),
    }
}

fn engine(data_dir: Option<PathBuf>) -> Result<RecommendationEngine> {
    let env = EngineConfig::from_env();
    let config = match data_dir {
        Some(dir) => EngineConfig {
            reagents_dir: env.reagents_dir,
            analytics_config: env.analytics_config,
            has_feature_scaling: env.has_feature_scaling,
            ..EngineConfig::new(dir)
        },
        None => env,
    };
    RecommendationEngine::new(config)
}

fn read_request(inline: Option<String>) -> Result<PredictRequest> {
    let text = match inline {
        Some(text) => text,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading predict request from stdin")?;
            buf
        }
    };
    serde_json::from_str(&text).context("parsing predict request")
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Analyze {
        reaction_type: "Ullmann".to_string(),
    });

    match command {
        Commands::Analyze { reaction_type } => {
            let pipeline = AnalyticsPipeline::new(analytics_config(cli.data_dir));
            let report = pipeline.run_once(&reaction_type)?;
            println!(
                "analyze complete: reaction_type={} rows={}/{} files={} snapshot={}",
                report.reaction_type,
                report.analyzed_rows,
                report.total_rows,
                report.files.len(),
                report.version_dir.display()
            );
        }
        Commands::Recommend {
            reaction_type,
            kind,
            top_n,
            min_compat,
            reference,
        } => {
            let engine = engine(cli.data_dir)?;
            let kinds = match kind {
                Some(kind) => vec![ReagentKind::from(kind)],
                None => ReagentKind::ALL.to_vec(),
            };
            let mut out = serde_json::Map::new();
            for kind in kinds {
                let recs = engine.recommend(kind, &reaction_type, top_n, min_compat, reference.as_deref())?;
                out.insert(kind.plural().to_string(), serde_json::to_value(recs)?);
            }
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Commands::Predict { request } => {
            let engine = engine(cli.data_dir)?;
            let request = read_request(request)?;
            let payload = engine.predict(&request, chrono::Utc::now())?;
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        Commands::Report { reaction_type, runs } => {
            let config = analytics_config(cli.data_dir);
            let store = SnapshotStore::new(&config.analytics_dir);
            print!("{}", rxcond_analytics::report_snapshots_markdown(&store, &reaction_type, runs)?);
        }
    }

    Ok(())
}
