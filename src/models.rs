use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
pub enum Warehouse {
    #[serde(rename = "CHS1")]
    #[value(name = "CHS1")]
    Chs1,
    #[serde(rename = "SL")]
    #[value(name = "SL")]
    Sl,
}

impl Warehouse {
    pub fn code(&self) -> &'static str {
        match self {
            Warehouse::Chs1 => "CHS1",
            Warehouse::Sl => "SL",
        }
    }

    pub fn from_code(input: &str) -> Option<Self> {
        match input.trim().to_uppercase().as_str() {
            "CHS1" => Some(Warehouse::Chs1),
            "SL" => Some(Warehouse::Sl),
            _ => None,
        }
    }

    pub fn ship_from(&self) -> &'static ShipFromAddress {
        match self {
            Warehouse::Chs1 => &CHS1_ADDRESS,
            Warehouse::Sl => &SL_ADDRESS,
        }
    }
}

impl fmt::Display for Warehouse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShipFromAddress {
    pub name: &'static str,
    pub address_line1: &'static str,
    pub city: &'static str,
    pub state_or_province_code: &'static str,
    pub postal_code: &'static str,
    pub country_code: &'static str,
    pub email: &'static str,
    pub phone: &'static str,
}

const SL_ADDRESS: ShipFromAddress = ShipFromAddress {
    name: "Zinus, Inc",
    address_line1: "1951A Fairway Drive",
    city: "San Leandro",
    state_or_province_code: "CA",
    postal_code: "94577",
    country_code: "US",
    email: "customerservice@zinusinc.com",
    phone: "8006131225",
};

const CHS1_ADDRESS: ShipFromAddress = ShipFromAddress {
    name: "Zinus, Inc",
    address_line1: "1125 Newton Way",
    city: "Summerville",
    state_or_province_code: "SC",
    postal_code: "29483",
    country_code: "US",
    email: "customerservice@zinusinc.com",
    phone: "8006131225",
};

/// One row of the marketplace order feed.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRow {
    pub order_id: String,
    pub order_item_id: String,
    pub quantity: u32,
    pub latest_ship_date: String,
    pub sku: String,
    pub warehouse: Option<Warehouse>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dimensions {
    pub sku: String,
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub unit: &'static str,
    pub weight: u32,
    pub weight_unit: &'static str,
}

/// A single-unit shipment to be quoted and purchased.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShipmentRequest {
    pub line: u64,
    pub order_id: String,
    pub order_item_id: String,
    pub item_line: u32,
    pub latest_ship_date: String,
    pub origin_sku: String,
    pub sku: String,
    pub dimensions: Dimensions,
    pub warehouse: Warehouse,
}

impl ShipmentRequest {
    pub fn ship_from(&self) -> &'static ShipFromAddress {
        self.warehouse.ship_from()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CarrierOffer {
    pub carrier_name: String,
    pub service_id: String,
    pub price: f64,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SelectedRate {
    Available(CarrierOffer),
    Unavailable,
}

impl SelectedRate {
    pub fn offer(&self) -> Option<&CarrierOffer> {
        match self {
            SelectedRate::Available(offer) => Some(offer),
            SelectedRate::Unavailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.offer().is_some()
    }

    pub fn carrier_label(&self) -> String {
        self.offer()
            .map(|offer| offer.carrier_name.clone())
            .unwrap_or_else(|| NOT_AVAILABLE.into())
    }

    pub fn service_label(&self) -> String {
        self.offer()
            .map(|offer| offer.service_id.clone())
            .unwrap_or_else(|| NOT_AVAILABLE.into())
    }

    pub fn price_label(&self) -> String {
        self.offer()
            .map(|offer| format!("{:.2}", offer.price))
            .unwrap_or_else(|| NOT_AVAILABLE.into())
    }
}

/// A request paired with the rate chosen for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotedShipment {
    pub request: ShipmentRequest,
    pub rate: SelectedRate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Purchased,
    Reconciled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShipmentOutcome {
    pub shipment_id: String,
    pub tracking: String,
    pub kind: OutcomeKind,
    pub labels: Vec<String>,
    pub request: ShipmentRequest,
}

/// Failure of a single shipment; never aborts the batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemFailure {
    pub line: u64,
    pub order_id: String,
    pub order_item_id: String,
    pub stage: &'static str,
    pub message: String,
}

impl ItemFailure {
    pub fn new(request: &ShipmentRequest, stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            line: request.line,
            order_id: request.order_id.clone(),
            order_item_id: request.order_item_id.clone(),
            stage,
            message: message.into(),
        }
    }
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} failed for order {}: {}",
            self.line, self.stage, self.order_id, self.message
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StageReport {
    pub name: String,
    pub elapsed_ms: u128,
    pub timestamp: DateTime<Utc>,
    pub output: Value,
}

impl StageReport {
    pub fn new(name: &str, elapsed_ms: u128, output: Value) -> Self {
        Self {
            name: name.to_string(),
            elapsed_ms,
            timestamp: Utc::now(),
            output,
        }
    }
}
