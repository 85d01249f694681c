pub mod auth;
pub mod client;
pub mod config;
pub mod models;

use crate::models::{CarrierOffer, ShipmentRequest};
use async_trait::async_trait;
use thiserror::Error;

pub use auth::{LwaCredentials, get_access_token_from_refresh};
pub use client::{ShipmentOptions, SpApiClient};

pub const RESOURCE_NOT_FOUND: &str = "ResourceNotFound";
pub const SHIPMENT_ALREADY_EXISTS: &str = "ShipmentAlreadyExists";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FulfillmentError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("shipment already exists: {}", shipment_ids.join(","))]
    ShipmentAlreadyExists { shipment_ids: Vec<String> },
    #[error("service error {code}: {message}")]
    Service { code: String, message: String },
    #[error("request failed: {0}")]
    Request(String),
}

/// Shipment as returned by purchase and lookup. `label_contents` is the
/// base64 text of the gzip-compressed label file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchasedShipment {
    pub shipment_id: String,
    pub amazon_order_id: Option<String>,
    pub tracking_id: String,
    pub label_contents: Option<String>,
}

#[async_trait]
pub trait MerchantFulfillment: Send + Sync {
    async fn eligible_shipping_services(
        &self,
        request: &ShipmentRequest,
    ) -> Result<Vec<CarrierOffer>, FulfillmentError>;

    async fn create_shipment(
        &self,
        request: &ShipmentRequest,
        shipping_service_id: &str,
    ) -> Result<PurchasedShipment, FulfillmentError>;

    async fn get_shipment(&self, shipment_id: &str)
    -> Result<PurchasedShipment, FulfillmentError>;
}

/// Prior shipment ids carried by a duplicate-shipment error message. The
/// message is either the bare comma-separated list or prose ending in it.
pub fn parse_shipment_ids(message: &str) -> Vec<String> {
    let list = message.rsplit(':').next().unwrap_or(message);
    list.split(',')
        .map(|id| id.trim().trim_end_matches('.'))
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shipment_ids_from_bare_list() {
        assert_eq!(parse_shipment_ids("S1,S2"), vec!["S1", "S2"]);
        assert_eq!(parse_shipment_ids(" S1 "), vec!["S1"]);
    }

    #[test]
    fn shipment_ids_from_prose_message() {
        assert_eq!(
            parse_shipment_ids("Shipment already exists for this item: S1, S2."),
            vec!["S1", "S2"]
        );
        assert!(parse_shipment_ids("").is_empty());
    }
}
