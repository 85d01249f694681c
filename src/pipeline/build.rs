use crate::lookup::ReferenceTables;
use crate::models::{OrderRow, ShipmentRequest, Warehouse};
use serde::Serialize;
use tracing::{debug, warn};

const ORDER_ITEM_ID_WIDTH: usize = 14;

/// Run-wide sequence for shipment lines. Values start at 1 and only grow.
#[derive(Debug, Default)]
pub struct LineCounter {
    last: u64,
}

impl LineCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_line(&mut self) -> u64 {
        self.last += 1;
        self.last
    }

    pub fn last(&self) -> u64 {
        self.last
    }
}

/// An order row that produced no requests.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildSkip {
    pub order_id: String,
    pub order_item_id: String,
    pub sku: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct BuildOutput {
    pub requests: Vec<ShipmentRequest>,
    pub skips: Vec<BuildSkip>,
}

/// Left-pads 11 to 13 character ids with zeros to the fixed width of 14.
/// Any other length is returned unchanged.
pub fn pad_order_item_id(raw: &str) -> String {
    let id = raw.trim();
    match id.len() {
        11..=13 => format!("{id:0>width$}", width = ORDER_ITEM_ID_WIDTH),
        ORDER_ITEM_ID_WIDTH => id.to_string(),
        other => {
            warn!(target = "mfn.build", order_item_id = id, length = other, "order_item_id_unpadded");
            id.to_string()
        }
    }
}

/// Expand released order rows into one request per unit, in row order.
pub fn build_requests(
    orders: &[OrderRow],
    tables: &ReferenceTables,
    warehouse: Warehouse,
    counter: &mut LineCounter,
) -> BuildOutput {
    let mut output = BuildOutput::default();
    for row in orders {
        if !tables.is_released(&row.order_id) {
            debug!(target = "mfn.build", order_id = %row.order_id, "order_not_released");
            continue;
        }
        if let Some(tagged) = row.warehouse.filter(|tagged| *tagged != warehouse) {
            debug!(target = "mfn.build", order_id = %row.order_id, warehouse = %tagged, "order_for_other_warehouse");
            continue;
        }

        let sku = tables.resolve_substitute(&row.sku);
        let Some(dimensions) = tables.resolve_dimensions(&sku) else {
            warn!(target = "mfn.build", order_id = %row.order_id, sku = %sku, "dimensions_missing");
            output.skips.push(BuildSkip {
                order_id: row.order_id.clone(),
                order_item_id: row.order_item_id.clone(),
                sku: sku.clone(),
                reason: format!("no package dimensions for `{sku}`"),
            });
            continue;
        };
        let order_item_id = pad_order_item_id(&row.order_item_id);

        for item_line in 1..=row.quantity {
            output.requests.push(ShipmentRequest {
                line: counter.next_line(),
                order_id: row.order_id.clone(),
                order_item_id: order_item_id.clone(),
                item_line,
                latest_ship_date: row.latest_ship_date.clone(),
                origin_sku: row.sku.clone(),
                sku: sku.clone(),
                dimensions: dimensions.clone(),
                warehouse,
            });
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::{DimensionRow, SubstitutionRow};

    fn order(order_id: &str, item_id: &str, quantity: u32, sku: &str) -> OrderRow {
        OrderRow {
            order_id: order_id.into(),
            order_item_id: item_id.into(),
            quantity,
            latest_ship_date: "2026-10-21".into(),
            sku: sku.into(),
            warehouse: None,
        }
    }

    fn tables(released: &[&str]) -> ReferenceTables {
        ReferenceTables::new(
            vec![
                DimensionRow {
                    item_number: "MAT-12".into(),
                    length: 40.0,
                    width: 20.0,
                    height: 8.0,
                    weight_lb: 30.2,
                },
                DimensionRow {
                    item_number: "MAT-12-B".into(),
                    length: 41.0,
                    width: 20.0,
                    height: 8.0,
                    weight_lb: 31.0,
                },
            ],
            vec![SubstitutionRow {
                origin: "MAT-12".into(),
                sub: "MAT-12-B".into(),
            }],
            released.iter().map(|id| id.to_string()),
        )
    }

    #[test]
    fn padding_by_length() {
        assert_eq!(pad_order_item_id("12345678901"), "00012345678901");
        assert_eq!(pad_order_item_id("123456789012"), "00123456789012");
        assert_eq!(pad_order_item_id("1234567890123"), "01234567890123");
        assert_eq!(pad_order_item_id("12345678901234"), "12345678901234");
        assert_eq!(pad_order_item_id("123"), "123");
    }

    #[test]
    fn quantity_expands_into_unit_requests() {
        let mut counter = LineCounter::new();
        let orders = vec![
            order("111-1", "12345678901", 3, "MAT-12"),
            order("222-2", "12345678901234", 2, "MAT-10"),
            order("333-3", "1234567890123", 2, "MAT-12-B"),
        ];
        let out = build_requests(&orders, &tables(&["111-1", "222-2", "333-3"]), Warehouse::Sl, &mut counter);

        let lines: Vec<u64> = out.requests.iter().map(|r| r.line).collect();
        let item_lines: Vec<u32> = out.requests.iter().map(|r| r.item_line).collect();
        assert_eq!(lines, vec![1, 2, 3, 4, 5]);
        assert_eq!(item_lines, vec![1, 2, 3, 1, 2]);
        assert_eq!(counter.last(), 5);

        let first = &out.requests[0];
        assert_eq!(first.order_item_id, "00012345678901");
        assert_eq!(first.origin_sku, "MAT-12");
        assert_eq!(first.sku, "MAT-12-B");
        assert_eq!(first.dimensions.weight, 496);
        assert_eq!(first.ship_from().city, "San Leandro");

        assert_eq!(out.skips.len(), 1);
        assert_eq!(out.skips[0].order_id, "222-2");
    }

    #[test]
    fn unreleased_and_foreign_rows_are_skipped_without_lines() {
        let mut counter = LineCounter::new();
        let mut foreign = order("222-2", "12345678901", 1, "MAT-12");
        foreign.warehouse = Some(Warehouse::Chs1);
        let orders = vec![order("999-9", "12345678901", 4, "MAT-12"), foreign, order("111-1", "12345678901", 1, "MAT-12")];
        let out = build_requests(&orders, &tables(&["111-1", "222-2"]), Warehouse::Sl, &mut counter);

        assert_eq!(out.requests.len(), 1);
        assert_eq!(out.requests[0].order_id, "111-1");
        assert_eq!(out.requests[0].line, 1);
        assert!(out.skips.is_empty());
    }

    #[test]
    fn counter_continues_across_batches() {
        let mut counter = LineCounter::new();
        let tables = tables(&["111-1"]);
        let orders = vec![order("111-1", "12345678901", 2, "MAT-12")];
        let first = build_requests(&orders, &tables, Warehouse::Chs1, &mut counter);
        let second = build_requests(&orders, &tables, Warehouse::Chs1, &mut counter);
        assert_eq!(first.requests.last().map(|r| r.line), Some(2));
        assert_eq!(second.requests.first().map(|r| r.line), Some(3));
    }
}
