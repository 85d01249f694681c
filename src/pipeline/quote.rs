use crate::models::{CarrierOffer, ItemFailure, QuotedShipment, SelectedRate, ShipmentRequest};
use crate::spapi::{FulfillmentError, MerchantFulfillment};
use crate::throttle::Throttle;
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

pub const STAGE: &str = "quote";

fn price_key(offer: &CarrierOffer) -> f64 {
    offer.price
}

/// Cheapest offer of `allowed_carrier`. The sort is stable, so the first
/// offer seen wins a price tie.
pub fn select_cheapest(offers: Vec<CarrierOffer>, allowed_carrier: &str) -> SelectedRate {
    let mut eligible: Vec<CarrierOffer> = offers
        .into_iter()
        .filter(|offer| offer.carrier_name == allowed_carrier)
        .collect();
    eligible.sort_by(|a, b| {
        price_key(a)
            .partial_cmp(&price_key(b))
            .unwrap_or(Ordering::Equal)
    });
    eligible
        .into_iter()
        .next()
        .map(SelectedRate::Available)
        .unwrap_or(SelectedRate::Unavailable)
}

pub async fn quote(
    api: &dyn MerchantFulfillment,
    throttle: &Throttle,
    request: ShipmentRequest,
    allowed_carrier: &str,
) -> Result<QuotedShipment, ItemFailure> {
    let response = throttle
        .schedule(api.eligible_shipping_services(&request))
        .await
        .map_err(|err| ItemFailure::new(&request, STAGE, err.to_string()))?;

    let rate = match response {
        Ok(offers) => {
            let rate = select_cheapest(offers, allowed_carrier);
            info!(
                target = "mfn.quote",
                line = request.line,
                order_id = %request.order_id,
                carrier = %rate.carrier_label(),
                service = %rate.service_label(),
                rate = %rate.price_label(),
                "quoted"
            );
            rate
        }
        Err(FulfillmentError::NotFound(detail)) => {
            warn!(target = "mfn.quote", line = request.line, order_id = %request.order_id, detail = %detail, "order_not_found_check_cancelled");
            SelectedRate::Unavailable
        }
        Err(err) => return Err(ItemFailure::new(&request, STAGE, err.to_string())),
    };
    Ok(QuotedShipment { request, rate })
}

/// Quote every request through the shared gate. Results arrive in completion order.
pub async fn shop_rates(
    api: Arc<dyn MerchantFulfillment>,
    throttle: Throttle,
    requests: Vec<ShipmentRequest>,
    allowed_carrier: Arc<str>,
) -> Vec<Result<QuotedShipment, ItemFailure>> {
    let mut tasks = JoinSet::new();
    for request in requests {
        let api = api.clone();
        let throttle = throttle.clone();
        let allowed_carrier = allowed_carrier.clone();
        tasks.spawn(async move { quote(api.as_ref(), &throttle, request, &allowed_carrier).await });
    }

    let mut results = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(result) => {
                match &result {
                    Ok(quoted) => crate::metrics::item_outcome(
                        STAGE,
                        if quoted.rate.is_available() { "available" } else { "unavailable" },
                    ),
                    Err(failure) => {
                        error!(target = "mfn.quote", line = failure.line, order_id = %failure.order_id, error = %failure.message, "quote_failed");
                        crate::metrics::item_outcome(STAGE, "failed");
                    }
                }
                results.push(result);
            }
            Err(err) => error!(target = "mfn.quote", error = %err, "quote_task_aborted"),
        }
    }
    results
}
