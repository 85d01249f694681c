//! In-memory collaborators for stage and pipeline tests.

use crate::archive::{ArchiveError, LabelKey, LabelSink};
use crate::models::{CarrierOffer, Dimensions, ShipmentRequest, Warehouse};
use crate::operator::{Checkpoint, Operator, OperatorError};
use crate::spapi::{FulfillmentError, MerchantFulfillment, PurchasedShipment};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const LABEL_B64: &str = "H4sIAA==";

pub fn offer(carrier: &str, service: &str, price: f64) -> CarrierOffer {
    CarrierOffer {
        carrier_name: carrier.into(),
        service_id: service.into(),
        price,
        currency: Some("USD".into()),
    }
}

pub fn request(line: u64, order_id: &str) -> ShipmentRequest {
    ShipmentRequest {
        line,
        order_id: order_id.into(),
        order_item_id: "00012345678901".into(),
        item_line: 1,
        latest_ship_date: "2026-10-21".into(),
        origin_sku: "MAT-12".into(),
        sku: "MAT-12".into(),
        dimensions: Dimensions {
            sku: "MAT-12".into(),
            length: 40.0,
            width: 20.0,
            height: 8.0,
            unit: "inches",
            weight: 484,
            weight_unit: "oz",
        },
        warehouse: Warehouse::Sl,
    }
}

/// Fulfillment service double. Quotes are scripted per order id; purchases
/// remember what was bought per order line and answer repeats with
/// `ShipmentAlreadyExists`, as the real service does.
#[derive(Default)]
pub struct FakeFulfillment {
    quotes: HashMap<String, Result<Vec<CarrierOffer>, FulfillmentError>>,
    purchase_errors: HashMap<String, FulfillmentError>,
    failing_lookups: HashSet<String>,
    label_contents: Option<String>,
    latency: Duration,
    state: Mutex<FakeState>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[derive(Default)]
struct FakeState {
    next_id: u64,
    shipments: HashMap<String, PurchasedShipment>,
    purchased: HashMap<String, Vec<String>>,
    calls: Vec<String>,
}

impl FakeFulfillment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quote(mut self, order_id: &str, offers: Vec<CarrierOffer>) -> Self {
        self.quotes.insert(order_id.into(), Ok(offers));
        self
    }

    pub fn with_quote_error(mut self, order_id: &str, err: FulfillmentError) -> Self {
        self.quotes.insert(order_id.into(), Err(err));
        self
    }

    pub fn with_purchase_error(mut self, order_id: &str, err: FulfillmentError) -> Self {
        self.purchase_errors.insert(order_id.into(), err);
        self
    }

    pub fn with_failing_lookup(mut self, shipment_id: &str) -> Self {
        self.failing_lookups.insert(shipment_id.into());
        self
    }

    /// Label text returned by new purchases instead of `LABEL_B64`.
    pub fn with_label_contents(mut self, contents: &str) -> Self {
        self.label_contents = Some(contents.into());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Registers a shipment bought in an earlier run.
    pub fn with_existing(self, shipment_id: &str, tracking: &str) -> Self {
        self.state.lock().unwrap().shipments.insert(
            shipment_id.into(),
            PurchasedShipment {
                shipment_id: shipment_id.into(),
                amazon_order_id: None,
                tracking_id: tracking.into(),
                label_contents: Some(LABEL_B64.into()),
            },
        );
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn enter(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn purchase_key(request: &ShipmentRequest) -> String {
        format!("{}/{}/{}", request.order_id, request.order_item_id, request.line)
    }
}

#[async_trait]
impl MerchantFulfillment for FakeFulfillment {
    async fn eligible_shipping_services(
        &self,
        request: &ShipmentRequest,
    ) -> Result<Vec<CarrierOffer>, FulfillmentError> {
        self.enter(format!("quote:{}", request.line)).await;
        let result = self
            .quotes
            .get(&request.order_id)
            .cloned()
            .unwrap_or_else(|| Err(FulfillmentError::NotFound(request.order_id.clone())));
        self.leave();
        result
    }

    async fn create_shipment(
        &self,
        request: &ShipmentRequest,
        shipping_service_id: &str,
    ) -> Result<PurchasedShipment, FulfillmentError> {
        self.enter(format!("purchase:{}:{}", request.line, shipping_service_id))
            .await;
        let result = if let Some(err) = self.purchase_errors.get(&request.order_id) {
            Err(err.clone())
        } else {
            let mut state = self.state.lock().unwrap();
            let key = Self::purchase_key(request);
            if let Some(ids) = state.purchased.get(&key) {
                Err(FulfillmentError::ShipmentAlreadyExists {
                    shipment_ids: ids.clone(),
                })
            } else {
                state.next_id += 1;
                let shipment = PurchasedShipment {
                    shipment_id: format!("SHP-{}", state.next_id),
                    amazon_order_id: Some(request.order_id.clone()),
                    tracking_id: format!("TRK-{}", state.next_id),
                    label_contents: Some(
                        self.label_contents.clone().unwrap_or_else(|| LABEL_B64.into()),
                    ),
                };
                state.purchased.insert(key, vec![shipment.shipment_id.clone()]);
                state
                    .shipments
                    .insert(shipment.shipment_id.clone(), shipment.clone());
                Ok(shipment)
            }
        };
        self.leave();
        result
    }

    async fn get_shipment(
        &self,
        shipment_id: &str,
    ) -> Result<PurchasedShipment, FulfillmentError> {
        self.enter(format!("lookup:{shipment_id}")).await;
        let result = if self.failing_lookups.contains(shipment_id) {
            Err(FulfillmentError::Service {
                code: "InternalFailure".into(),
                message: "lookup failed".into(),
            })
        } else {
            self.state
                .lock()
                .unwrap()
                .shipments
                .get(shipment_id)
                .cloned()
                .ok_or_else(|| FulfillmentError::NotFound(shipment_id.into()))
        };
        self.leave();
        result
    }
}

#[derive(Default)]
pub struct MemoryLabelSink {
    stored: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemoryLabelSink {
    pub fn keys(&self) -> Vec<String> {
        self.stored
            .lock()
            .unwrap()
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }
}

#[async_trait]
impl LabelSink for MemoryLabelSink {
    async fn store(&self, key: &LabelKey, bytes: Vec<u8>) -> Result<(), ArchiveError> {
        self.stored.lock().unwrap().push((key.to_string(), bytes));
        Ok(())
    }
}

/// Label sink whose every write fails.
pub struct FailingLabelSink;

#[async_trait]
impl LabelSink for FailingLabelSink {
    async fn store(&self, key: &LabelKey, _bytes: Vec<u8>) -> Result<(), ArchiveError> {
        Err(ArchiveError::Write {
            path: key.file_name().into(),
            message: "disk full".into(),
        })
    }
}

/// Answers checkpoints from a script; an exhausted script declines.
#[derive(Default)]
pub struct ScriptedOperator {
    answers: Mutex<VecDeque<bool>>,
    asked: Mutex<Vec<&'static str>>,
}

impl ScriptedOperator {
    pub fn answering(answers: &[bool]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            asked: Mutex::default(),
        }
    }

    pub fn asked(&self) -> Vec<&'static str> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl Operator for ScriptedOperator {
    async fn confirm(&self, checkpoint: &Checkpoint) -> Result<bool, OperatorError> {
        self.asked.lock().unwrap().push(checkpoint.name);
        Ok(self.answers.lock().unwrap().pop_front().unwrap_or(false))
    }
}

/// Formatted log output of the current thread, kept while the guard lives.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn capture() -> (Self, tracing::subscriber::DefaultGuard) {
        let buffer = Self::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(move || writer.clone())
            .finish();
        (buffer, tracing::subscriber::set_default(subscriber))
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
