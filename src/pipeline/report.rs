use crate::models::{ItemFailure, OutcomeKind, QuotedShipment, ShipmentOutcome, StageReport, Warehouse};
use crate::pipeline::build::BuildSkip;
use csv::WriterBuilder;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

const RATE_HEADERS: [&str; 7] = [
    "whCode",
    "lineNum",
    "AmazonOrderId",
    "subSKU",
    "carrierName",
    "shippingServiceId",
    "rate",
];
const TRACKING_HEADERS: [&str; 9] = [
    "wh-code",
    "line-no",
    "order-id",
    "order-item-id",
    "shipment-id",
    "origin-sku",
    "sub-sku",
    "trackingNumber",
    "outcome",
];
const FAILURE_HEADERS: [&str; 6] = ["wh-code", "line-no", "order-id", "order-item-id", "stage", "error"];

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write {path}: {message}")]
    Write { path: PathBuf, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateRow {
    pub wh_code: Warehouse,
    pub line: u64,
    pub order_id: String,
    pub sub_sku: String,
    pub carrier_name: String,
    pub shipping_service_id: String,
    pub rate: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackingRow {
    pub wh_code: Warehouse,
    pub line: u64,
    pub order_id: String,
    pub order_item_id: String,
    pub shipment_id: String,
    pub origin_sku: String,
    pub sub_sku: String,
    pub tracking: String,
    pub outcome: OutcomeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRow {
    pub wh_code: Warehouse,
    pub line: Option<u64>,
    pub order_id: String,
    pub order_item_id: String,
    pub stage: String,
    pub error: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub requests: usize,
    pub available: usize,
    pub unavailable: usize,
    pub purchased: usize,
    pub reconciled: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub warehouse: Warehouse,
    pub rates: Vec<RateRow>,
    pub tracking: Vec<TrackingRow>,
    pub failures: Vec<FailureRow>,
    pub stages: Vec<StageReport>,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn rates_by_line(&self) -> Vec<RateRow> {
        let mut rows = self.rates.clone();
        rows.sort_by_key(|row| row.line);
        rows
    }

    pub fn tracking_by_line(&self) -> Vec<TrackingRow> {
        let mut rows = self.tracking.clone();
        rows.sort_by_key(|row| row.line);
        rows
    }
}

/// Collects stage results as they arrive. Rows keep arrival order.
#[derive(Debug)]
pub struct ResultAggregator {
    run_id: Uuid,
    warehouse: Warehouse,
    rates: Vec<RateRow>,
    tracking: Vec<TrackingRow>,
    failures: Vec<FailureRow>,
    summary: RunSummary,
}

impl ResultAggregator {
    pub fn new(run_id: Uuid, warehouse: Warehouse) -> Self {
        Self {
            run_id,
            warehouse,
            rates: Vec::new(),
            tracking: Vec::new(),
            failures: Vec::new(),
            summary: RunSummary::default(),
        }
    }

    pub fn record_requests(&mut self, count: usize) {
        self.summary.requests += count;
    }

    pub fn record_skip(&mut self, skip: &BuildSkip) {
        self.summary.skipped += 1;
        self.failures.push(FailureRow {
            wh_code: self.warehouse,
            line: None,
            order_id: skip.order_id.clone(),
            order_item_id: skip.order_item_id.clone(),
            stage: "build".into(),
            error: skip.reason.clone(),
        });
    }

    pub fn record_quote(&mut self, quoted: &QuotedShipment) {
        if quoted.rate.is_available() {
            self.summary.available += 1;
        } else {
            self.summary.unavailable += 1;
        }
        self.rates.push(RateRow {
            wh_code: self.warehouse,
            line: quoted.request.line,
            order_id: quoted.request.order_id.clone(),
            sub_sku: quoted.request.sku.clone(),
            carrier_name: quoted.rate.carrier_label(),
            shipping_service_id: quoted.rate.service_label(),
            rate: quoted.rate.price_label(),
        });
    }

    pub fn record_outcome(&mut self, outcome: &ShipmentOutcome) {
        match outcome.kind {
            OutcomeKind::Purchased => self.summary.purchased += 1,
            OutcomeKind::Reconciled => self.summary.reconciled += 1,
        }
        self.tracking.push(TrackingRow {
            wh_code: self.warehouse,
            line: outcome.request.line,
            order_id: outcome.request.order_id.clone(),
            order_item_id: outcome.request.order_item_id.clone(),
            shipment_id: outcome.shipment_id.clone(),
            origin_sku: outcome.request.origin_sku.clone(),
            sub_sku: outcome.request.sku.clone(),
            tracking: outcome.tracking.clone(),
            outcome: outcome.kind,
        });
    }

    pub fn record_failure(&mut self, failure: &ItemFailure) {
        self.summary.failed += 1;
        self.failures.push(FailureRow {
            wh_code: self.warehouse,
            line: Some(failure.line),
            order_id: failure.order_id.clone(),
            order_item_id: failure.order_item_id.clone(),
            stage: failure.stage.into(),
            error: failure.message.clone(),
        });
    }

    pub fn finish(self, stages: Vec<StageReport>) -> RunReport {
        RunReport {
            run_id: self.run_id,
            warehouse: self.warehouse,
            rates: self.rates,
            tracking: self.tracking,
            failures: self.failures,
            stages,
            summary: self.summary,
        }
    }
}

pub trait ReportSink {
    fn write(&self, report: &RunReport) -> Result<(), ReportError>;
}

/// Writes the rate, tracking and failure datasets as three CSV files, ordered by line.
#[derive(Debug, Clone)]
pub struct CsvReportSink {
    pub rates: PathBuf,
    pub tracking: PathBuf,
    pub failures: PathBuf,
}

impl ReportSink for CsvReportSink {
    fn write(&self, report: &RunReport) -> Result<(), ReportError> {
        write_rows(&self.rates, &RATE_HEADERS, &report.rates_by_line())?;
        write_rows(&self.tracking, &TRACKING_HEADERS, &report.tracking_by_line())?;
        write_rows(&self.failures, &FAILURE_HEADERS, &report.failures)
    }
}

fn write_rows<T: Serialize>(path: &Path, headers: &[&str], rows: &[T]) -> Result<(), ReportError> {
    let write_err = |message: String| ReportError::Write {
        path: path.to_path_buf(),
        message,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| write_err(err.to_string()))?;
    }
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|err| write_err(err.to_string()))?;
    writer
        .write_record(headers)
        .map_err(|err| write_err(err.to_string()))?;
    for row in rows {
        writer
            .serialize(row)
            .map_err(|err| write_err(err.to_string()))?;
    }
    writer.flush().map_err(|err| write_err(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SelectedRate;
    use crate::testing::{offer, request};
    use tempfile::TempDir;

    fn outcome(line: u64, kind: OutcomeKind, tracking: &str) -> ShipmentOutcome {
        ShipmentOutcome {
            shipment_id: format!("SHP-{line}"),
            tracking: tracking.into(),
            kind,
            labels: vec![],
            request: request(line, "111-1"),
        }
    }

    fn sample() -> RunReport {
        let mut agg = ResultAggregator::new(Uuid::new_v4(), Warehouse::Sl);
        agg.record_requests(3);
        agg.record_quote(&QuotedShipment {
            request: request(3, "333-3"),
            rate: SelectedRate::Unavailable,
        });
        agg.record_quote(&QuotedShipment {
            request: request(1, "111-1"),
            rate: SelectedRate::Available(offer("FEDEX", "FEDEX_PTP_HOME", 9.5)),
        });
        agg.record_outcome(&outcome(1, OutcomeKind::Reconciled, "7946,7947"));
        agg.record_failure(&ItemFailure::new(&request(2, "222-2"), "quote", "service error"));
        agg.finish(vec![])
    }

    #[test]
    fn summary_counts_each_terminal_state() {
        let report = sample();
        assert_eq!(
            report.summary,
            RunSummary {
                requests: 3,
                available: 1,
                unavailable: 1,
                purchased: 0,
                reconciled: 1,
                failed: 1,
                skipped: 0,
            }
        );
        assert_eq!(report.rates[0].line, 3);
        assert_eq!(report.rates_by_line()[0].line, 1);
    }

    #[test]
    fn csv_reports_use_feed_headers_and_line_order() {
        let dir = TempDir::new().unwrap();
        let sink = CsvReportSink {
            rates: dir.path().join("run/rates.csv"),
            tracking: dir.path().join("run/tracking.csv"),
            failures: dir.path().join("run/failures.csv"),
        };
        sink.write(&sample()).unwrap();

        let rates = std::fs::read_to_string(&sink.rates).unwrap();
        let lines: Vec<&str> = rates.lines().collect();
        assert_eq!(lines[0], "whCode,lineNum,AmazonOrderId,subSKU,carrierName,shippingServiceId,rate");
        assert_eq!(lines[1], "SL,1,111-1,MAT-12,FEDEX,FEDEX_PTP_HOME,9.50");
        assert_eq!(lines[2], "SL,3,333-3,MAT-12,N/A,N/A,N/A");

        let tracking = std::fs::read_to_string(&sink.tracking).unwrap();
        assert!(tracking.contains("SL,1,111-1,00012345678901,SHP-1,MAT-12,MAT-12,\"7946,7947\",reconciled"));

        let failures = std::fs::read_to_string(&sink.failures).unwrap();
        assert!(failures.starts_with("wh-code,line-no,order-id,order-item-id,stage,error\n"));
        assert!(failures.contains("SL,2,222-2,00012345678901,quote,service error"));
    }

    #[test]
    fn empty_datasets_still_get_headers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tracking.csv");
        write_rows::<TrackingRow>(&path, &TRACKING_HEADERS, &[]).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "wh-code,line-no,order-id,order-item-id,shipment-id,origin-sku,sub-sku,trackingNumber,outcome\n"
        );
    }
}
