use tracing::trace;

// Trace-level counters; a subscriber filtering on `mfn.metrics` can aggregate them.

pub fn inc_calls(operation: &'static str) {
    trace!(target = "mfn.metrics", operation = operation, "spapi_calls_total_inc");
}

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    trace!(
        target = "mfn.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_elapsed"
    );
}

pub fn item_outcome(stage: &'static str, outcome: &'static str) {
    trace!(
        target = "mfn.metrics",
        stage = stage,
        outcome = outcome,
        "item_outcome_inc"
    );
}
