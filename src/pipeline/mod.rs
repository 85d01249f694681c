pub mod build;
pub mod purchase;
pub mod quote;
pub mod report;

use crate::archive::LabelSink;
use crate::config::{PipelineConfig, RunPaths};
use crate::lookup::ReferenceTables;
use crate::models::{OrderRow, StageReport, Warehouse};
use crate::operator::{Checkpoint, Operator, rate_checkpoint, substitution_checkpoint};
use crate::spapi::MerchantFulfillment;
use crate::tables::{self, TableError};
use crate::throttle::Throttle;
use build::{BuildOutput, LineCounter, build_requests};
use purchase::{Purchaser, purchase_labels};
use quote::shop_rates;
use report::{ResultAggregator, RunReport};
use serde_json::{Value, json};
use std::{future::Future, path::Path, sync::Arc, time::Instant};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

/// Everything read from disk before the first external call.
#[derive(Debug, Clone)]
pub struct RunInputs {
    pub orders: Vec<OrderRow>,
    pub tables: ReferenceTables,
    pub warehouse: Warehouse,
}

impl RunInputs {
    /// Orders and the release feed are required; the substitution feed is optional.
    /// `dims_file` replaces the release feed's dimensions when given.
    pub fn load(paths: &RunPaths, dims_file: Option<&Path>) -> Result<Self, PipelineError> {
        const STAGE: &str = "load_inputs";
        let required = |stem: String| {
            tables::locate(&paths.input_dir, &stem).ok_or_else(|| {
                PipelineError::input_missing(
                    STAGE,
                    format!("{stem}.xlsx not found in {}", paths.input_dir.display()),
                )
            })
        };

        let orders_table = tables::load_table(&required(paths.orders_stem())?).map_err(table_error)?;
        let orders = tables::order_rows(&orders_table).map_err(table_error)?;

        let release_table = tables::load_table(&required(paths.release_stem())?).map_err(table_error)?;
        let released = tables::released_orders(&release_table).map_err(table_error)?;
        let dimensions = match dims_file {
            Some(path) => tables::dimension_rows(&tables::load_table(path).map_err(table_error)?),
            None => tables::dimension_rows(&release_table),
        }
        .map_err(table_error)?;

        let substitutions = match tables::locate(&paths.input_dir, &paths.substitutions_stem()) {
            Some(path) => {
                let table = tables::load_table(&path).map_err(table_error)?;
                tables::substitution_rows(&table).map_err(table_error)?
            }
            None => Vec::new(),
        };

        let tables = ReferenceTables::new(dimensions, substitutions, released);
        info!(
            target = "mfn.pipeline",
            orders = orders.len(),
            released = tables.released_count(),
            substitutions = tables.substitutions().len(),
            "inputs_loaded"
        );
        Ok(Self {
            orders,
            tables,
            warehouse: paths.warehouse,
        })
    }
}

fn table_error(err: TableError) -> PipelineError {
    match err {
        TableError::NotFound(_) => PipelineError::input_missing("load_inputs", err.to_string()),
        other => PipelineError::invalid_input("load_inputs", other.to_string()),
    }
}

#[derive(Clone)]
pub struct Pipeline {
    pub config: Arc<PipelineConfig>,
    api: Arc<dyn MerchantFulfillment>,
    throttle: Throttle,
    labels: Arc<dyn LabelSink>,
    operator: Arc<dyn Operator>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        api: Arc<dyn MerchantFulfillment>,
        labels: Arc<dyn LabelSink>,
        operator: Arc<dyn Operator>,
    ) -> Self {
        let throttle = Throttle::new(config.throttle);
        Self {
            config: Arc::new(config),
            api,
            throttle,
            labels,
            operator,
        }
    }

    /// Build, quote, confirm, purchase. Item failures are recorded in the
    /// report; only missing input or a declined checkpoint ends the run early.
    pub async fn run(
        &self,
        inputs: RunInputs,
        run_id: Uuid,
        stamp: &str,
    ) -> Result<RunReport, PipelineError> {
        let mut stages = Vec::new();
        let mut aggregator = ResultAggregator::new(run_id, inputs.warehouse);
        let gate = self.throttle.config();
        info!(
            target = "mfn.pipeline",
            run_id = %run_id,
            warehouse = %inputs.warehouse,
            max_concurrent = gate.max_concurrent,
            min_time_ms = gate.min_time.as_millis() as u64,
            "run_started"
        );

        self.checkpoint(substitution_checkpoint(inputs.tables.substitutions()), &mut stages)
            .await?;

        let built = self
            .capture_stage("build_requests", &mut stages, async {
                let mut counter = LineCounter::new();
                let output = build_requests(&inputs.orders, &inputs.tables, inputs.warehouse, &mut counter);
                let summary = json!({
                    "requests": output.requests.len(),
                    "skipped": output.skips.len(),
                    "last_line": counter.last(),
                });
                Ok(StageOutcome::new(output, summary))
            })
            .await?;
        let BuildOutput { requests, skips } = built;
        skips.iter().for_each(|skip| aggregator.record_skip(skip));
        aggregator.record_requests(requests.len());
        info!(target = "mfn.pipeline", shipments = requests.len(), warehouse = %inputs.warehouse, "shipments_to_process");
        if requests.is_empty() {
            return Ok(aggregator.finish(stages));
        }

        let quoted = self
            .capture_stage("shop_rates", &mut stages, async {
                let results = shop_rates(
                    self.api.clone(),
                    self.throttle.clone(),
                    requests,
                    Arc::from(self.config.allowed_carrier.as_str()),
                )
                .await;
                let mut quoted = Vec::with_capacity(results.len());
                let mut failures = Vec::new();
                for result in results {
                    match result {
                        Ok(q) => quoted.push(q),
                        Err(failure) => failures.push(failure),
                    }
                }
                let summary = json!({
                    "quoted": quoted.len(),
                    "available": quoted.iter().filter(|q| q.rate.is_available()).count(),
                    "failed": failures.len(),
                });
                Ok(StageOutcome::new((quoted, failures), summary))
            })
            .await?;
        let (mut quoted, failures) = quoted;
        quoted.iter().for_each(|q| aggregator.record_quote(q));
        failures.iter().for_each(|f| aggregator.record_failure(f));
        quoted.sort_by_key(|q| q.request.line);

        if !quoted.iter().any(|q| q.rate.is_available()) {
            info!(target = "mfn.pipeline", "no_available_rates");
            return Ok(aggregator.finish(stages));
        }
        self.checkpoint(rate_checkpoint(&quoted), &mut stages).await?;

        let results = self
            .capture_stage("purchase_labels", &mut stages, async {
                let purchaser = Purchaser {
                    api: self.api.clone(),
                    throttle: self.throttle.clone(),
                    labels: self.labels.clone(),
                    stamp: Arc::from(stamp),
                };
                let results = purchase_labels(purchaser, quoted).await;
                let completed = results.iter().filter(|r| r.is_ok()).count();
                let summary = json!({
                    "completed": completed,
                    "failed": results.len() - completed,
                });
                Ok(StageOutcome::new(results, summary))
            })
            .await?;
        for result in &results {
            match result {
                Ok(outcome) => aggregator.record_outcome(outcome),
                Err(failure) => aggregator.record_failure(failure),
            }
        }

        let report = aggregator.finish(stages);
        info!(
            target = "mfn.pipeline",
            run_id = %run_id,
            purchased = report.summary.purchased,
            reconciled = report.summary.reconciled,
            unavailable = report.summary.unavailable,
            failed = report.summary.failed,
            "run_finished"
        );
        Ok(report)
    }

    async fn checkpoint(
        &self,
        checkpoint: Checkpoint,
        stages: &mut Vec<StageReport>,
    ) -> Result<(), PipelineError> {
        let name = checkpoint.name;
        self.capture_stage(name, stages, async {
            let approved = self
                .operator
                .confirm(&checkpoint)
                .await
                .map_err(|err| PipelineError::internal(name, err.to_string()))?;
            if !approved {
                return Err(PipelineError::operator_abort(name, "declined by operator"));
            }
            Ok(StageOutcome::new((), json!({ "approved": true })))
        })
        .await
    }

    async fn capture_stage<T, Fut>(
        &self,
        name: &'static str,
        stages: &mut Vec<StageReport>,
        fut: Fut,
    ) -> Result<T, PipelineError>
    where
        Fut: Future<Output = Result<StageOutcome<T>, PipelineError>>,
    {
        let started = Instant::now();
        let outcome = fut.await?;
        let elapsed_ms = started.elapsed().as_millis();
        crate::metrics::stage_elapsed(name, elapsed_ms);
        stages.push(StageReport::new(name, elapsed_ms, outcome.output));
        Ok(outcome.value)
    }
}

#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct PipelineError {
    stage: &'static str,
    message: String,
    kind: PipelineErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorKind {
    InputMissing,
    InvalidInput,
    OperatorAbort,
    Internal,
}

impl PipelineError {
    pub fn input_missing(stage: &'static str, message: impl Into<String>) -> Self {
        Self::with_kind(stage, message, PipelineErrorKind::InputMissing)
    }

    pub fn invalid_input(stage: &'static str, message: impl Into<String>) -> Self {
        Self::with_kind(stage, message, PipelineErrorKind::InvalidInput)
    }

    pub fn operator_abort(stage: &'static str, message: impl Into<String>) -> Self {
        Self::with_kind(stage, message, PipelineErrorKind::OperatorAbort)
    }

    pub fn internal(stage: &'static str, message: impl Into<String>) -> Self {
        Self::with_kind(stage, message, PipelineErrorKind::Internal)
    }

    fn with_kind(stage: &'static str, message: impl Into<String>, kind: PipelineErrorKind) -> Self {
        Self {
            stage,
            message: message.into(),
            kind,
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> PipelineErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}

#[derive(Debug)]
pub struct StageOutcome<T> {
    pub value: T,
    pub output: Value,
}

impl<T> StageOutcome<T> {
    fn new(value: T, output: Value) -> Self {
        Self { value, output }
    }
}
