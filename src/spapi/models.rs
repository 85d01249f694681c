//! Wire shapes of the Merchant Fulfillment v0 operations.

use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, PickFirst, serde_as};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetEligibleShippingServicesRequest {
    pub shipment_request_details: ShipmentRequestDetails,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateShipmentRequest {
    pub shipment_request_details: ShipmentRequestDetails,
    pub shipping_service_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ShipmentRequestDetails {
    pub amazon_order_id: String,
    pub item_list: Vec<Item>,
    pub ship_from_address: Address,
    pub package_dimensions: PackageDimensions,
    pub weight: Weight,
    pub shipping_service_options: ShippingServiceOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_customization: Option<LabelCustomization>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Item {
    pub order_item_id: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Address {
    pub name: String,
    pub address_line1: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_line2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_line3: Option<String>,
    pub email: String,
    pub city: String,
    pub state_or_province_code: String,
    pub postal_code: String,
    pub country_code: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PackageDimensions {
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Weight {
    pub value: u32,
    pub unit: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ShippingServiceOptions {
    pub delivery_experience: String,
    pub carrier_will_pick_up: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LabelCustomization {
    pub standard_id_for_label: String,
}

#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub payload: Option<T>,
    #[serde(default)]
    pub errors: Vec<ApiErrorEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorEntry {
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub details: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EligibleShippingServicesPayload {
    #[serde(default)]
    pub shipping_service_list: Vec<ShippingService>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ShippingService {
    pub carrier_name: String,
    pub shipping_service_id: String,
    pub rate: CurrencyAmount,
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CurrencyAmount {
    #[serde(default)]
    pub currency_code: Option<String>,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub amount: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ShipmentPayload {
    pub shipment_id: String,
    #[serde(default)]
    pub amazon_order_id: Option<String>,
    #[serde(default)]
    pub tracking_id: Option<String>,
    #[serde(default)]
    pub label: Option<Label>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Label {
    pub file_contents: FileContents,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileContents {
    pub contents: String,
}
