use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use e2e_dashboard::config::{Config, LoggingConfig};
use e2e_dashboard::metrics::MetricsExporter;
use e2e_dashboard::parser::ServiceKind;
use e2e_dashboard::storage::SnapshotStore;

#[derive(Parser)]
#[command(
    name = "e2e-dashboard",
    about = "Aggregate end-to-end probe logs into dashboard status and Pushgateway metrics",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (defaults to $E2E_DASHBOARD_CONFIG, then ./e2e-dashboard.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan every service log and update the status snapshot
    Aggregate,

    /// Push the outcome of a single probe run
    Push {
        /// Service name used in the grouping key
        #[arg(long)]
        service: String,

        /// The run succeeded
        #[arg(long, conflicts_with = "failure", required_unless_present = "failure")]
        success: bool,

        /// The run failed
        #[arg(long)]
        failure: bool,

        /// Run duration in seconds
        #[arg(long, default_value = "0")]
        duration: f64,

        /// Environment tag (overrides config / E2E_ENV)
        #[arg(long)]
        env: Option<String>,
    },

    /// Push windowed success/failure counts computed from a probe log
    PushSummary {
        /// Service name used in the grouping key
        #[arg(long)]
        service: String,

        /// Log grammar (defaults to the configured service's kind)
        #[arg(long)]
        kind: Option<ServiceKind>,

        /// Log file (defaults to the configured service's log)
        #[arg(long)]
        log: Option<PathBuf>,

        /// Window size in minutes (at most one year)
        #[arg(
            long,
            default_value = "60",
            value_parser = clap::value_parser!(i64).range(1..=525_600)
        )]
        window_minutes: i64,

        /// Environment tag (overrides config / E2E_ENV)
        #[arg(long)]
        env: Option<String>,
    },

    /// Show the persisted status snapshot
    Status {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },
}

/// Stderr subscriber used while the config (and its logging section) loads.
fn bootstrap_subscriber() -> impl tracing::Subscriber + Send + Sync {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish()
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = tracing::subscriber::with_default(bootstrap_subscriber(), || {
        Config::resolve(cli.config.as_deref())
    })?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Aggregate => {
            let reports = e2e_dashboard::aggregate(&config)?;
            for report in &reports {
                println!(
                    "{:<15} {:<8} {:<20} parsed={} skipped={} history={}{}",
                    report.service,
                    report.latest_status.as_token(),
                    report.latest_timestamp.as_str(),
                    report.parsed,
                    report.skipped,
                    report.history_len,
                    if report.found { "" } else { " (log missing)" }
                );
            }
        }
        Commands::Push {
            service,
            success,
            failure: _,
            duration,
            env,
        } => {
            let env = env.unwrap_or_else(|| config.metrics.env.clone());
            tracing::info!(%service, %env, success, duration, "pushing probe outcome");
            match MetricsExporter::new(config.metrics.clone()) {
                Ok(exporter) => {
                    if let Err(e) = exporter.push(&service, &env, success, duration).await {
                        tracing::warn!(%service, error = %e, "metrics push failed");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "could not build metrics client"),
            }
        }
        Commands::PushSummary {
            service,
            kind,
            log,
            window_minutes,
            env,
        } => {
            let configured = config.service(&service);
            let kind = kind
                .or_else(|| configured.map(|s| s.kind))
                .with_context(|| format!("unknown service {service:?}; pass --kind"))?;
            let log = log
                .or_else(|| configured.map(|s| config.log_path(s)))
                .with_context(|| format!("unknown service {service:?}; pass --log"))?;
            let env = env.unwrap_or_else(|| config.metrics.env.clone());

            let now = chrono::Local::now().naive_local();
            let summary = e2e_dashboard::summarize_log(
                &log,
                kind,
                now,
                chrono::Duration::minutes(window_minutes),
            )?;
            tracing::info!(
                %service,
                success = summary.success_count,
                failure = summary.failure_count,
                ratio = summary.availability_ratio(),
                "log summary computed"
            );

            match MetricsExporter::new(config.metrics.clone()) {
                Ok(exporter) => {
                    if let Err(e) = exporter
                        .push_summary(&service, &env, &summary, window_minutes)
                        .await
                    {
                        tracing::warn!(%service, error = %e, "metrics push failed");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "could not build metrics client"),
            }
        }
        Commands::Status { json } => {
            let snapshot = SnapshotStore::new(&config.paths.output).load();
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                println!("{:<15} | {:<8} | {:<20} | History", "Service", "Status", "Last run");
                println!("{:-<15}-|-{:-<8}-|-{:-<20}-|-{:-<7}", "", "", "", "");
                for (name, record) in snapshot.iter() {
                    println!(
                        "{:<15} | {:<8} | {:<20} | {}",
                        name,
                        record.status,
                        record.timestamp,
                        record.history.len()
                    );
                }
            }
        }
    }

    Ok(())
}
