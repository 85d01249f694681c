use crate::http::build_client;
use crate::models::{CarrierOffer, ShipmentRequest};
use crate::spapi::models::{
    Address, ApiErrorEntry, CreateShipmentRequest, EligibleShippingServicesPayload, Envelope,
    GetEligibleShippingServicesRequest, Item, LabelCustomization, PackageDimensions,
    ShipmentPayload, ShipmentRequestDetails, ShippingServiceOptions, Weight,
};
use crate::spapi::{
    FulfillmentError, MerchantFulfillment, PurchasedShipment, RESOURCE_NOT_FOUND,
    SHIPMENT_ALREADY_EXISTS, parse_shipment_ids,
};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use urlencoding::encode;

const ACCESS_TOKEN_HEADER: &str = "x-amz-access-token";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipmentOptions {
    pub delivery_experience: String,
    pub carrier_will_pick_up: bool,
    pub standard_id_for_label: String,
}

impl Default for ShipmentOptions {
    fn default() -> Self {
        Self {
            delivery_experience: "DeliveryConfirmationWithoutSignature".into(),
            carrier_will_pick_up: false,
            standard_id_for_label: "AmazonOrderId".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpApiClient {
    base_url: String,
    access_token: String,
    options: ShipmentOptions,
    http: Client,
}

impl SpApiClient {
    pub fn new(
        base_url: impl Into<String>,
        access_token: impl Into<String>,
        options: ShipmentOptions,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            options,
            http: build_client(),
        }
    }

    fn details(&self, request: &ShipmentRequest, for_purchase: bool) -> ShipmentRequestDetails {
        let from = request.ship_from();
        // Purchased labels print the order id and SKU in the sender block.
        let (address_line2, address_line3, label_customization) = if for_purchase {
            (
                Some(request.order_id.clone()),
                Some(request.sku.clone()),
                Some(LabelCustomization {
                    standard_id_for_label: self.options.standard_id_for_label.clone(),
                }),
            )
        } else {
            (None, None, None)
        };
        ShipmentRequestDetails {
            amazon_order_id: request.order_id.clone(),
            item_list: vec![Item {
                order_item_id: request.order_item_id.clone(),
                quantity: 1,
            }],
            ship_from_address: Address {
                name: from.name.to_string(),
                address_line1: from.address_line1.to_string(),
                address_line2,
                address_line3,
                email: from.email.to_string(),
                city: from.city.to_string(),
                state_or_province_code: from.state_or_province_code.to_string(),
                postal_code: from.postal_code.to_string(),
                country_code: from.country_code.to_string(),
                phone: from.phone.to_string(),
            },
            package_dimensions: PackageDimensions {
                length: request.dimensions.length,
                width: request.dimensions.width,
                height: request.dimensions.height,
                unit: request.dimensions.unit.to_string(),
            },
            weight: Weight {
                value: request.dimensions.weight,
                unit: request.dimensions.weight_unit.to_string(),
            },
            shipping_service_options: ShippingServiceOptions {
                delivery_experience: self.options.delivery_experience.clone(),
                carrier_will_pick_up: self.options.carrier_will_pick_up,
            },
            label_customization,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        builder: RequestBuilder,
    ) -> Result<T, FulfillmentError> {
        crate::metrics::inc_calls(operation);
        let response = builder
            .header(ACCESS_TOKEN_HEADER, &self.access_token)
            .send()
            .await
            .map_err(|err| FulfillmentError::Request(err.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| FulfillmentError::Request(err.to_string()))?;
        debug!(target = "mfn.spapi", operation, status = status.as_u16(), "response");

        if status.is_success() {
            let envelope: Envelope<T> = serde_json::from_str(&body)
                .map_err(|err| FulfillmentError::Request(format!("{operation}: {err}")))?;
            if let Some(payload) = envelope.payload {
                return Ok(payload);
            }
            return Err(classify(status, envelope.errors.first()).unwrap_or_else(|| {
                FulfillmentError::Request(format!("{operation}: response without payload"))
            }));
        }

        let errors = serde_json::from_str::<Envelope<serde_json::Value>>(&body)
            .map(|envelope| envelope.errors)
            .unwrap_or_default();
        Err(classify(status, errors.first())
            .unwrap_or_else(|| FulfillmentError::Request(format!("HTTP {status}"))))
    }
}

fn classify(status: StatusCode, entry: Option<&ApiErrorEntry>) -> Option<FulfillmentError> {
    let Some(entry) = entry else {
        return (status == StatusCode::NOT_FOUND)
            .then(|| FulfillmentError::NotFound(format!("HTTP {status}")));
    };
    let error = match entry.code.as_str() {
        RESOURCE_NOT_FOUND | "NotFound" => FulfillmentError::NotFound(entry.message.clone()),
        SHIPMENT_ALREADY_EXISTS => {
            let mut shipment_ids = parse_shipment_ids(&entry.message);
            if shipment_ids.is_empty() {
                shipment_ids = entry
                    .details
                    .as_deref()
                    .map(parse_shipment_ids)
                    .unwrap_or_default();
            }
            FulfillmentError::ShipmentAlreadyExists { shipment_ids }
        }
        _ if status == StatusCode::NOT_FOUND => FulfillmentError::NotFound(entry.message.clone()),
        code => FulfillmentError::Service {
            code: code.to_string(),
            message: entry.message.clone(),
        },
    };
    Some(error)
}

fn into_purchased(payload: ShipmentPayload) -> PurchasedShipment {
    PurchasedShipment {
        shipment_id: payload.shipment_id,
        amazon_order_id: payload.amazon_order_id,
        tracking_id: payload.tracking_id.unwrap_or_default(),
        label_contents: payload.label.map(|label| label.file_contents.contents),
    }
}

#[async_trait]
impl MerchantFulfillment for SpApiClient {
    async fn eligible_shipping_services(
        &self,
        request: &ShipmentRequest,
    ) -> Result<Vec<CarrierOffer>, FulfillmentError> {
        let url = format!("{}/mfn/v0/eligibleShippingServices", self.base_url);
        let body = GetEligibleShippingServicesRequest {
            shipment_request_details: self.details(request, false),
        };
        let payload: EligibleShippingServicesPayload = self
            .send("getEligibleShipmentServices", self.http.post(url).json(&body))
            .await?;
        Ok(payload
            .shipping_service_list
            .into_iter()
            .map(|service| CarrierOffer {
                carrier_name: service.carrier_name,
                service_id: service.shipping_service_id,
                price: service.rate.amount,
                currency: service.rate.currency_code,
            })
            .collect())
    }

    async fn create_shipment(
        &self,
        request: &ShipmentRequest,
        shipping_service_id: &str,
    ) -> Result<PurchasedShipment, FulfillmentError> {
        let url = format!("{}/mfn/v0/shipments", self.base_url);
        let body = CreateShipmentRequest {
            shipment_request_details: self.details(request, true),
            shipping_service_id: shipping_service_id.to_string(),
        };
        let payload: ShipmentPayload = self
            .send("createShipment", self.http.post(url).json(&body))
            .await?;
        Ok(into_purchased(payload))
    }

    async fn get_shipment(
        &self,
        shipment_id: &str,
    ) -> Result<PurchasedShipment, FulfillmentError> {
        let url = format!("{}/mfn/v0/shipments/{}", self.base_url, encode(shipment_id));
        let payload: ShipmentPayload = self.send("getShipment", self.http.get(url)).await?;
        Ok(into_purchased(payload))
    }
}
