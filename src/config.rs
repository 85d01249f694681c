use crate::models::Warehouse;
use crate::spapi::ShipmentOptions;
use crate::throttle::ThrottleConfig;
use chrono::{DateTime, Local};
use std::env;
use std::path::PathBuf;

pub const DEFAULT_ALLOWED_CARRIER: &str = "FEDEX";
const DATE_STAMP_FORMAT: &str = "%m.%d.%y";
const RUN_STAMP_FORMAT: &str = "%m.%d.%y__%H.%M";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub allowed_carrier: String,
    pub throttle: ThrottleConfig,
    pub shipment: ShipmentOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            allowed_carrier: DEFAULT_ALLOWED_CARRIER.into(),
            throttle: ThrottleConfig::default(),
            shipment: ShipmentOptions::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let defaults = ShipmentOptions::default();
        let allowed_carrier = env::var("MFN_ALLOWED_CARRIER")
            .ok()
            .map(|v| v.trim().to_uppercase())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_ALLOWED_CARRIER.into());
        let delivery_experience = env::var("MFN_DELIVERY_EXPERIENCE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.delivery_experience);
        Self {
            allowed_carrier,
            throttle: ThrottleConfig::from_env(),
            shipment: ShipmentOptions {
                delivery_experience,
                carrier_will_pick_up: parse_env_bool("MFN_CARRIER_WILL_PICK_UP"),
                standard_id_for_label: defaults.standard_id_for_label,
            },
        }
    }
}

fn parse_env_bool(key: &str) -> bool {
    env::var(key)
        .ok()
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

/// Input and output locations of one run, derived from the feed date and warehouse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub feed_date: String,
    pub warehouse: Warehouse,
    pub date_stamp: String,
    pub run_stamp: String,
}

impl RunPaths {
    pub fn new(
        input_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        feed_date: &str,
        warehouse: Warehouse,
        now: DateTime<Local>,
    ) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            feed_date: feed_date.trim().to_string(),
            warehouse,
            date_stamp: now.format(DATE_STAMP_FORMAT).to_string(),
            run_stamp: now.format(RUN_STAMP_FORMAT).to_string(),
        }
    }

    pub fn orders_stem(&self) -> String {
        self.feed_date.clone()
    }

    pub fn release_stem(&self) -> String {
        format!("{}_REL_{}", self.feed_date, self.warehouse.code())
    }

    pub fn substitutions_stem(&self) -> String {
        format!("{}_SUBS", self.feed_date)
    }

    pub fn run_dir(&self) -> PathBuf {
        self.output_dir.join(&self.feed_date)
    }

    fn prefix(&self) -> String {
        format!("{}__{}", self.date_stamp, self.warehouse.code())
    }

    pub fn rates_report(&self) -> PathBuf {
        self.run_dir().join(format!("{}__rates.csv", self.prefix()))
    }

    pub fn tracking_report(&self) -> PathBuf {
        self.run_dir().join(format!("{}__tracking.csv", self.prefix()))
    }

    pub fn failures_report(&self) -> PathBuf {
        self.run_dir().join(format!("{}__failures.csv", self.prefix()))
    }

    pub fn label_dir(&self) -> PathBuf {
        self.run_dir().join(format!("{}__gzip", self.prefix()))
    }
}
