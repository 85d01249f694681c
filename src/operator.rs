//! Human checkpoints between pipeline stages.

use crate::lookup::SubstitutionRow;
use crate::models::QuotedShipment;
use async_trait::async_trait;
use std::io::{self, BufRead, Write};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum OperatorError {
    #[error("console unavailable: {0}")]
    Io(String),
}

/// A question put to the operator together with the table it refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub name: &'static str,
    pub summary: String,
    pub question: String,
}

#[async_trait]
pub trait Operator: Send + Sync {
    /// `Ok(false)` means the operator declined and the run must stop.
    async fn confirm(&self, checkpoint: &Checkpoint) -> Result<bool, OperatorError>;
}

/// Prompts on stdout and blocks on stdin until a Y or N answer arrives.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleOperator;

#[async_trait]
impl Operator for ConsoleOperator {
    async fn confirm(&self, checkpoint: &Checkpoint) -> Result<bool, OperatorError> {
        let checkpoint = checkpoint.clone();
        tokio::task::spawn_blocking(move || {
            let stdin = io::stdin();
            let stdout = io::stdout();
            ask(&mut stdin.lock(), &mut stdout.lock(), &checkpoint)
        })
        .await
        .map_err(|err| OperatorError::Io(err.to_string()))?
        .map_err(|err| OperatorError::Io(err.to_string()))
    }
}

/// Approves every checkpoint; used for unattended runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoApprove;

#[async_trait]
impl Operator for AutoApprove {
    async fn confirm(&self, checkpoint: &Checkpoint) -> Result<bool, OperatorError> {
        info!(target = "mfn.cli", checkpoint = checkpoint.name, "checkpoint_auto_approved");
        Ok(true)
    }
}

/// End of input counts as a refusal.
fn ask<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    checkpoint: &Checkpoint,
) -> io::Result<bool> {
    writeln!(output, "{}", checkpoint.summary)?;
    loop {
        write!(output, "{} Select Y to continue, N to exit [Y/N]: ", checkpoint.question)?;
        output.flush()?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(false);
        }
        match line.trim().to_uppercase().as_str() {
            "Y" | "YES" => return Ok(true),
            "N" | "NO" => return Ok(false),
            _ => continue,
        }
    }
}

/// Plain fixed-width table with a header rule.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }
    let mut out = format_row(headers.iter().copied(), &widths);
    out.push('\n');
    out.push_str(
        &widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    for row in rows {
        out.push('\n');
        out.push_str(&format_row(row.iter().map(String::as_str), &widths));
    }
    out
}

fn format_row<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    cells
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}", width = *width))
        .collect::<Vec<_>>()
        .join(" | ")
        .trim_end()
        .to_string()
}

pub fn substitution_checkpoint(rows: &[SubstitutionRow]) -> Checkpoint {
    if rows.is_empty() {
        return Checkpoint {
            name: "confirm_substitutions",
            summary: "No substitution feed provided.".into(),
            question: "Proceed without substitutions?".into(),
        };
    }
    let table = render_table(
        &["origin-sku", "sub-sku"],
        &rows
            .iter()
            .map(|row| vec![row.origin.clone(), row.sub.clone()])
            .collect::<Vec<_>>(),
    );
    Checkpoint {
        name: "confirm_substitutions",
        summary: format!("Substitution feed:\n{table}\n"),
        question: "Is the substitution feed acceptable?".into(),
    }
}

pub fn rate_checkpoint(quoted: &[QuotedShipment]) -> Checkpoint {
    let rows: Vec<Vec<String>> = quoted
        .iter()
        .map(|q| {
            vec![
                q.request.line.to_string(),
                q.request.order_id.clone(),
                q.request.sku.clone(),
                q.rate.carrier_label(),
                q.rate.service_label(),
                q.rate.price_label(),
            ]
        })
        .collect();
    let table = render_table(
        &["lineNo", "AmazonOrderId", "Sub SKU", "carrierName", "shippingServiceId", "rate"],
        &rows,
    );
    Checkpoint {
        name: "confirm_rates",
        summary: format!("Eligible shipping services (lowest rate):\n{table}\n"),
        question: "Are the rates acceptable?".into(),
    }
}
