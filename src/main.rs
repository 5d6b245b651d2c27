use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tracing::info;

mod aggregate;
mod api;
mod config;
mod dataset;
mod error;
mod interventions;
mod models;
mod report;
mod risk;

use aggregate::{Aggregator, DEFAULT_THRESHOLD};
use config::{ServiceConfig, DEFAULT_DATASET_PATH, DEFAULT_METRICS_PATH};

#[derive(Parser)]
#[command(name = "early-warning")]
#[command(about = "Student dropout early warning service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DatasetArgs {
    /// Student dataset, JSON or CSV
    #[arg(long, env = "EARLY_WARNING_DATASET", default_value = DEFAULT_DATASET_PATH)]
    dataset: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the early warning API
    Serve {
        #[command(flatten)]
        data: DatasetArgs,
        /// Model metrics side file returned by /model/metrics
        #[arg(long, env = "EARLY_WARNING_METRICS", default_value = DEFAULT_METRICS_PATH)]
        metrics: PathBuf,
        #[arg(long, env = "EARLY_WARNING_LISTEN", default_value = "127.0.0.1:3000")]
        listen: SocketAddr,
    },
    /// Print the students at or above a risk threshold
    Score {
        #[command(flatten)]
        data: DatasetArgs,
        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: i64,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        data: DatasetArgs,
        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: i64,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn load_aggregator(data: &DatasetArgs) -> Aggregator {
    let records = dataset::load_or_fallback(&data.dataset);
    Aggregator::derive(records, &mut rand::thread_rng())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "dropout_early_warning=info,tower_http=info".to_string()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            data,
            metrics,
            listen,
        } => {
            let config = ServiceConfig {
                dataset_path: data.dataset,
                metrics_path: metrics,
            };
            let state = api::AppState::bootstrap(&config);
            let app = api::build_router(state);

            let listener = tokio::net::TcpListener::bind(listen)
                .await
                .with_context(|| format!("failed to bind {listen}"))?;
            info!("early warning API listening on {}", listener.local_addr()?);
            axum::serve(listener, app).await?;
        }
        Commands::Score {
            data,
            threshold,
            limit,
        } => {
            let aggregator = load_aggregator(&data);
            let students = aggregator.list_at_risk(threshold);

            if students.is_empty() {
                println!("No students at or above {threshold}%.");
                return Ok(());
            }

            println!("Top students by dropout risk:");
            for student in students.iter().take(limit) {
                println!(
                    "- {} ({}) {} risk at {}%: {}",
                    student.id,
                    student.district,
                    student.risk,
                    student.probability,
                    student.reasons.join("; ")
                );
            }
        }
        Commands::Report {
            data,
            threshold,
            out,
        } => {
            let aggregator = load_aggregator(&data);
            let report = report::build_report(&aggregator, threshold, Utc::now().date_naive());
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
