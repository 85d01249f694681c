use crate::lookup::{DimensionRow, SubstitutionRow};
use crate::models::{OrderRow, Warehouse};
use calamine::{Reader, open_workbook_auto};
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ORDER_ID: &str = "order-id";
pub const ORDER_ITEM_ID: &str = "order-item-id";
pub const QUANTITY: &str = "quantity-purchased";
pub const LATEST_SHIP_DATE: &str = "latest-ship-date";
pub const SYSTEM_SKU: &str = "system-sku";
pub const WAREHOUSE: &str = "warehouse";

pub const PO_NUMBER: &str = "PO Number";
pub const ITEM_NUMBER: &str = "Item Number";
pub const PACKAGE_LENGTH: &str = "Package Length";
pub const PACKAGE_WIDTH: &str = "Package Width";
pub const PACKAGE_HEIGHT: &str = "Package Height";
pub const PACKAGE_WEIGHT: &str = "Package Weight";

pub const SUB_ORIGIN: &str = "origin";
pub const SUB_TARGET: &str = "sub";

#[derive(Debug, Error)]
pub enum TableError {
    #[error("file not found: {0}")]
    NotFound(PathBuf),
    #[error("unsupported table format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to read {path}: {message}")]
    Read { path: PathBuf, message: String },
    #[error("{table}: missing column `{column}`")]
    MissingColumn { table: String, column: &'static str },
    #[error("{table} row {row}: invalid `{column}` value `{value}`")]
    InvalidValue {
        table: String,
        row: usize,
        column: &'static str,
        value: String,
    },
}

/// Header-addressed rows of the first sheet (or the whole CSV) of a feed file.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<HashMap<String, String>>,
}

impl RawTable {
    pub fn require_columns(&self, columns: &[&'static str]) -> Result<(), TableError> {
        for column in columns {
            if !self.headers.iter().any(|h| h == column) {
                return Err(TableError::MissingColumn {
                    table: self.name.clone(),
                    column,
                });
            }
        }
        Ok(())
    }

    fn cell<'a>(&'a self, row: &'a HashMap<String, String>, column: &str) -> &'a str {
        row.get(column).map(String::as_str).unwrap_or("")
    }

    fn number(
        &self,
        index: usize,
        row: &HashMap<String, String>,
        column: &'static str,
    ) -> Result<f64, TableError> {
        let raw = self.cell(row, column);
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| TableError::InvalidValue {
                table: self.name.clone(),
                row: index + 2,
                column,
                value: raw.to_string(),
            })
    }
}

/// First existing candidate among `<stem>.xlsx`, `<stem>.xls`, `<stem>.csv`.
pub fn locate(dir: &Path, stem: &str) -> Option<PathBuf> {
    ["xlsx", "xls", "csv"]
        .iter()
        .map(|ext| dir.join(format!("{stem}.{ext}")))
        .find(|path| path.exists())
}

pub fn load_table(path: &Path) -> Result<RawTable, TableError> {
    if !path.exists() {
        return Err(TableError::NotFound(path.to_path_buf()));
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    let (headers, records) = match ext.as_str() {
        "csv" => read_csv(path)?,
        "xlsx" | "xls" => read_workbook(path)?,
        _ => return Err(TableError::UnsupportedFormat(ext)),
    };

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let rows = records
        .into_iter()
        .map(|values| {
            headers
                .iter()
                .cloned()
                .zip(values.into_iter().map(|v| v.trim().to_string()))
                .collect::<HashMap<_, _>>()
        })
        .filter(|row| row.values().any(|v| !v.is_empty()))
        .collect();
    Ok(RawTable {
        name,
        headers,
        rows,
    })
}

fn read_csv(path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>), TableError> {
    let read_err = |message: String| TableError::Read {
        path: path.to_path_buf(),
        message,
    };
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|err| read_err(err.to_string()))?;
    let headers = reader
        .headers()
        .map_err(|err| read_err(err.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let mut records = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| read_err(err.to_string()))?;
        records.push(record.iter().map(str::to_string).collect());
    }
    Ok((headers, records))
}

fn read_workbook(path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>), TableError> {
    let read_err = |message: String| TableError::Read {
        path: path.to_path_buf(),
        message,
    };
    let mut workbook = open_workbook_auto(path).map_err(|err| read_err(err.to_string()))?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| read_err("workbook has no sheets".into()))?;
    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|err| read_err(err.to_string()))?;
    let mut rows = range.rows();
    let headers = rows
        .next()
        .ok_or_else(|| read_err("sheet has no header row".into()))?
        .iter()
        .map(|cell| cell.to_string().trim().to_string())
        .collect();
    let records = rows
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .collect();
    Ok((headers, records))
}

pub fn order_rows(table: &RawTable) -> Result<Vec<OrderRow>, TableError> {
    table.require_columns(&[ORDER_ID, ORDER_ITEM_ID, QUANTITY, SYSTEM_SKU])?;
    let with_warehouse = table.headers.iter().any(|h| h == WAREHOUSE);
    table
        .rows
        .iter()
        .enumerate()
        .map(|(index, row)| {
            let quantity = table.number(index, row, QUANTITY)?;
            if quantity < 0.0 || quantity.fract() != 0.0 {
                return Err(TableError::InvalidValue {
                    table: table.name.clone(),
                    row: index + 2,
                    column: QUANTITY,
                    value: table.cell(row, QUANTITY).to_string(),
                });
            }
            let warehouse = if with_warehouse {
                let code = table.cell(row, WAREHOUSE);
                if code.is_empty() {
                    None
                } else {
                    Some(Warehouse::from_code(code).ok_or_else(|| TableError::InvalidValue {
                        table: table.name.clone(),
                        row: index + 2,
                        column: WAREHOUSE,
                        value: code.to_string(),
                    })?)
                }
            } else {
                None
            };
            Ok(OrderRow {
                order_id: table.cell(row, ORDER_ID).to_string(),
                order_item_id: table.cell(row, ORDER_ITEM_ID).to_string(),
                quantity: quantity as u32,
                latest_ship_date: table.cell(row, LATEST_SHIP_DATE).to_string(),
                sku: table.cell(row, SYSTEM_SKU).to_string(),
                warehouse,
            })
        })
        .collect()
}

/// PO numbers of the release feed; an order is processed only when listed here.
pub fn released_orders(table: &RawTable) -> Result<Vec<String>, TableError> {
    table.require_columns(&[PO_NUMBER])?;
    Ok(table
        .rows
        .iter()
        .map(|row| table.cell(row, PO_NUMBER).to_string())
        .collect())
}

/// Package dimensions keyed by item number. Rows without an item number are ignored.
pub fn dimension_rows(table: &RawTable) -> Result<Vec<DimensionRow>, TableError> {
    table.require_columns(&[
        ITEM_NUMBER,
        PACKAGE_LENGTH,
        PACKAGE_WIDTH,
        PACKAGE_HEIGHT,
        PACKAGE_WEIGHT,
    ])?;
    let mut dimensions = Vec::with_capacity(table.rows.len());
    for (index, row) in table.rows.iter().enumerate() {
        if table.cell(row, ITEM_NUMBER).is_empty() {
            continue;
        }
        dimensions.push(DimensionRow {
            item_number: table.cell(row, ITEM_NUMBER).to_string(),
            length: table.number(index, row, PACKAGE_LENGTH)?,
            width: table.number(index, row, PACKAGE_WIDTH)?,
            height: table.number(index, row, PACKAGE_HEIGHT)?,
            weight_lb: table.number(index, row, PACKAGE_WEIGHT)?,
        });
    }
    Ok(dimensions)
}

pub fn substitution_rows(table: &RawTable) -> Result<Vec<SubstitutionRow>, TableError> {
    table.require_columns(&[SUB_ORIGIN, SUB_TARGET])?;
    Ok(table
        .rows
        .iter()
        .map(|row| SubstitutionRow {
            origin: table.cell(row, SUB_ORIGIN).to_string(),
            sub: table.cell(row, SUB_TARGET).to_string(),
        })
        .collect())
}
