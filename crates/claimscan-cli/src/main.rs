//! ClaimScan
//!
//! Command-line healthcare claims scanner: applies declarative fraud and
//! billing-discrepancy rules to a claims file.

use anyhow::Result;
use clap::Parser;
use claimscan_cli::{AppConfig, Cli, Commands, LogFormat};
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::info;

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.log_format);

    match &cli.command {
        Commands::Run(args) => {
            let config = AppConfig::load(&cli.config, Some(args))?;
            info!(config = %cli.config, "Configuration loaded");

            let handle = match &args.metrics {
                Some(_) => Some(init_metrics()?),
                None => None,
            };

            let outcome = claimscan_cli::run(&config, args, handle.as_ref())?;

            println!(
                "{} violations across {} claims ({} rules matched, {} failed)",
                outcome.violations.len(),
                outcome.statistics.unique_claims,
                outcome.metrics.rules_matched,
                outcome.metrics.rules_failed
            );
        }
        Commands::CheckRules { rules } => {
            let config = AppConfig::load(&cli.config, None)?;
            let checks = claimscan_cli::check_rules(&config, rules)?;

            let mut failed = 0;
            for check in &checks {
                match &check.result {
                    Ok(summary) => println!("ok    {} [{}] {}", check.id, check.level, summary),
                    Err(failure) => {
                        failed += 1;
                        println!("FAIL  {} [{}] {}", check.id, check.level, failure);
                    }
                }
            }
            println!("{} rules checked, {} failed", checks.len(), failed);

            if failed > 0 {
                anyhow::bail!("{} of {} rules failed the check", failed, checks.len());
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool, format: LogFormat) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("claimscan=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("claimscan=info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

/// Install the Prometheus recorder and return a handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    claimscan_telemetry::describe_metrics();
    Ok(handle)
}
