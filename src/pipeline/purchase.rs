use crate::archive::{LabelKey, LabelSink, decode_label};
use crate::models::{ItemFailure, OutcomeKind, QuotedShipment, ShipmentOutcome, ShipmentRequest};
use crate::spapi::{FulfillmentError, MerchantFulfillment, PurchasedShipment};
use crate::throttle::Throttle;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

pub const STAGE: &str = "purchase";

/// Collaborators shared by every purchase task of a run.
#[derive(Clone)]
pub struct Purchaser {
    pub api: Arc<dyn MerchantFulfillment>,
    pub throttle: Throttle,
    pub labels: Arc<dyn LabelSink>,
    pub stamp: Arc<str>,
}

impl Purchaser {
    /// Buy the label for one quoted shipment. A duplicate-shipment answer is
    /// resolved against the prior shipments instead of failing the item.
    pub async fn purchase(&self, quoted: QuotedShipment) -> Result<ShipmentOutcome, ItemFailure> {
        let QuotedShipment { request, rate } = quoted;
        let Some(offer) = rate.offer() else {
            return Err(ItemFailure::new(&request, STAGE, "no available rate"));
        };
        info!(target = "mfn.purchase", line = request.line, order_id = %request.order_id, service = %offer.service_id, "purchasing");

        // The permit is released once the purchase call returns, before any lookups.
        let response = self
            .throttle
            .schedule(self.api.create_shipment(&request, &offer.service_id))
            .await
            .map_err(|err| ItemFailure::new(&request, STAGE, err.to_string()))?;

        match response {
            Ok(shipment) => Ok(self.purchased(request, shipment).await),
            Err(FulfillmentError::ShipmentAlreadyExists { shipment_ids }) if !shipment_ids.is_empty() => {
                Ok(self.reconcile(request, shipment_ids).await)
            }
            Err(err) => Err(ItemFailure::new(&request, STAGE, err.to_string())),
        }
    }

    async fn purchased(&self, request: ShipmentRequest, shipment: PurchasedShipment) -> ShipmentOutcome {
        let key = LabelKey::purchased(request.line, &self.stamp);
        let labels = self
            .store_label(&request, key, shipment.label_contents.as_deref())
            .await
            .into_iter()
            .collect();
        info!(target = "mfn.purchase", line = request.line, order_id = %request.order_id, tracking = %shipment.tracking_id, "label_purchased");
        ShipmentOutcome {
            shipment_id: shipment.shipment_id,
            tracking: shipment.tracking_id,
            kind: OutcomeKind::Purchased,
            labels,
            request,
        }
    }

    /// Look up each prior shipment through the gate and join the trackings in
    /// id order. Failed lookups are left out.
    pub async fn reconcile(&self, request: ShipmentRequest, shipment_ids: Vec<String>) -> ShipmentOutcome {
        warn!(target = "mfn.purchase", line = request.line, order_id = %request.order_id, shipment_ids = %shipment_ids.join(","), "shipment_already_exists");
        let lookups: Vec<_> = shipment_ids
            .iter()
            .map(|id| {
                let api = self.api.clone();
                let id = id.clone();
                self.throttle
                    .submit(async move { api.get_shipment(&id).await })
            })
            .collect();

        let mut trackings = Vec::with_capacity(lookups.len());
        let mut labels = Vec::new();
        for (id, handle) in shipment_ids.iter().zip(lookups) {
            let shipment = match handle.await {
                Ok(Ok(Ok(shipment))) => shipment,
                Ok(Ok(Err(err))) => {
                    warn!(target = "mfn.purchase", line = request.line, shipment_id = %id, error = %err, "prior_shipment_lookup_failed");
                    continue;
                }
                Ok(Err(err)) => {
                    warn!(target = "mfn.purchase", line = request.line, shipment_id = %id, error = %err, "prior_shipment_lookup_failed");
                    continue;
                }
                Err(err) => {
                    warn!(target = "mfn.purchase", line = request.line, shipment_id = %id, error = %err, "prior_shipment_lookup_aborted");
                    continue;
                }
            };
            debug!(target = "mfn.purchase", line = request.line, shipment_id = %id, amazon_order_id = ?shipment.amazon_order_id, tracking = %shipment.tracking_id, "prior_shipment_resolved");
            let key = LabelKey::reconciled(request.line, id, &self.stamp);
            if let Some(stored) = self
                .store_label(&request, key, shipment.label_contents.as_deref())
                .await
            {
                labels.push(stored);
            }
            trackings.push(shipment.tracking_id);
        }

        let tracking = trackings.join(",");
        info!(target = "mfn.purchase", line = request.line, order_id = %request.order_id, tracking = %tracking, "shipment_reconciled");
        ShipmentOutcome {
            shipment_id: shipment_ids.join(","),
            tracking,
            kind: OutcomeKind::Reconciled,
            labels,
            request,
        }
    }

    /// Returns the stored key; label problems are logged and never fail the item.
    async fn store_label(&self, request: &ShipmentRequest, key: LabelKey, contents: Option<&str>) -> Option<String> {
        let Some(contents) = contents else {
            warn!(target = "mfn.archive", line = request.line, key = %key, "label_missing");
            return None;
        };
        let stored = match decode_label(contents) {
            Ok(bytes) => self.labels.store(&key, bytes).await,
            Err(err) => Err(err),
        };
        match stored {
            Ok(()) => Some(key.to_string()),
            Err(err) => {
                warn!(target = "mfn.archive", line = request.line, key = %key, error = %err, "label_not_stored");
                None
            }
        }
    }
}

/// Purchase every available rate; unavailable ones are never sent.
pub async fn purchase_labels(
    purchaser: Purchaser,
    quoted: Vec<QuotedShipment>,
) -> Vec<Result<ShipmentOutcome, ItemFailure>> {
    let mut tasks = JoinSet::new();
    for item in quoted.into_iter().filter(|q| q.rate.is_available()) {
        let purchaser = purchaser.clone();
        tasks.spawn(async move { purchaser.purchase(item).await });
    }

    let mut results = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(result) => {
                match &result {
                    Ok(outcome) => crate::metrics::item_outcome(
                        STAGE,
                        match outcome.kind {
                            OutcomeKind::Purchased => "purchased",
                            OutcomeKind::Reconciled => "reconciled",
                        },
                    ),
                    Err(failure) => {
                        error!(target = "mfn.purchase", line = failure.line, order_id = %failure.order_id, error = %failure.message, "purchase_failed");
                        crate::metrics::item_outcome(STAGE, "failed");
                    }
                }
                results.push(result);
            }
            Err(err) => error!(target = "mfn.purchase", error = %err, "purchase_task_aborted"),
        }
    }
    results
}
