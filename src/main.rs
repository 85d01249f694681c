mod archive;
mod config;
mod http;
mod lookup;
mod metrics;
mod models;
mod operator;
mod pipeline;
mod spapi;
mod tables;
#[cfg(test)]
mod testing;
mod throttle;

use archive::DirectoryLabelSink;
use chrono::Local;
use clap::Parser;
use config::{PipelineConfig, RunPaths};
use eyre::WrapErr;
use models::Warehouse;
use operator::{AutoApprove, ConsoleOperator, Operator};
use pipeline::report::{CsvReportSink, ReportSink};
use pipeline::{Pipeline, RunInputs};
use spapi::{LwaCredentials, SpApiClient, get_access_token_from_refresh};
use std::{path::PathBuf, process::ExitCode, sync::Arc};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};
use uuid::Uuid;

/// Quote and buy Merchant Fulfillment labels for one day's released orders.
#[derive(Debug, Parser)]
#[command(name = "mfn-labels", version)]
struct Cli {
    /// Feed date used in the input file names, e.g. 10.19.26
    feed_date: String,
    /// Warehouse the labels ship from
    #[arg(long, value_enum)]
    warehouse: Warehouse,
    #[arg(long, default_value = "./application/INPUT")]
    input_dir: PathBuf,
    #[arg(long, default_value = "./application/OUTPUT")]
    output_dir: PathBuf,
    /// Standalone dimension table used instead of the release feed's dimensions
    #[arg(long)]
    dims_file: Option<PathBuf>,
    /// Approve every checkpoint without prompting
    #[arg(long)]
    yes: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    init_tracing();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(target = "mfn.cli", "run failed: {err:?}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> eyre::Result<()> {
    let paths = RunPaths::new(
        &cli.input_dir,
        &cli.output_dir,
        &cli.feed_date,
        cli.warehouse,
        Local::now(),
    );
    let inputs = RunInputs::load(&paths, cli.dims_file.as_deref())
        .wrap_err("failed to load input feeds")?;

    let credentials = LwaCredentials::from_env().wrap_err("SP-API credentials")?;
    let access_token = get_access_token_from_refresh(&credentials)
        .await
        .wrap_err("LWA token exchange failed")?;

    let config = PipelineConfig::from_env();
    let api = SpApiClient::new(
        spapi::config::ROOT.as_str(),
        access_token,
        config.shipment.clone(),
    );
    let operator: Arc<dyn Operator> = if cli.yes {
        Arc::new(AutoApprove)
    } else {
        Arc::new(ConsoleOperator)
    };
    let labels = Arc::new(DirectoryLabelSink::new(paths.label_dir()));
    info!(target = "mfn.cli", feed_date = %paths.feed_date, labels = %labels.dir().display(), "run_configured");
    let pipeline = Pipeline::new(config, Arc::new(api), labels, operator);

    let run_id = Uuid::new_v4();
    let report = pipeline
        .run(inputs, run_id, &paths.run_stamp)
        .await
        .wrap_err("pipeline stopped")?;

    let sink = CsvReportSink {
        rates: paths.rates_report(),
        tracking: paths.tracking_report(),
        failures: paths.failures_report(),
    };
    sink.write(&report).wrap_err("failed to write reports")?;
    info!(
        target = "mfn.cli",
        run_id = %report.run_id,
        rates = %sink.rates.display(),
        tracking = %sink.tracking.display(),
        failures = report.failures.len(),
        "reports_written"
    );
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
