//! Prometheus metrics for an acquisition run.
//!
//! Nothing is served over HTTP; [`render`] produces the text exposition that
//! the CLI writes to a textfile-collector path at the end of a run.

use once_cell::sync::Lazy;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

/// Items finished, by outcome.
pub static ITEMS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("labelfetch_items_total", "Shipment items processed"),
        &["outcome"], // "saved", "verification_exhausted", "failed"
    )
    .unwrap()
});

/// Candidates attempted, by outcome.
pub static CANDIDATES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("labelfetch_candidates_total", "Label candidates attempted"),
        &["outcome"], // "saved", "rejected", "preview_failed", "save_failed", "text_unavailable"
    )
    .unwrap()
});

/// Stage failures, by stage.
pub static STAGE_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("labelfetch_stage_failures_total", "Recorded stage failures"),
        &["stage"],
    )
    .unwrap()
});

/// Wall time per item, by outcome.
pub static ITEM_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "labelfetch_item_duration_seconds",
            "Time spent acquiring one item",
        )
        .buckets(vec![1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        &["outcome"],
    )
    .unwrap()
});

pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(ITEMS.clone()),
        Box::new(CANDIDATES.clone()),
        Box::new(STAGE_FAILURES.clone()),
        Box::new(ITEM_DURATION.clone()),
    ]
}

/// Text exposition of all metrics.
pub fn render() -> Result<String, prometheus::Error> {
    let registry = Registry::new();
    for metric in all_metrics() {
        registry.register(metric)?;
    }

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_touched_metrics() {
        ITEMS.with_label_values(&["saved"]).inc();
        STAGE_FAILURES.with_label_values(&["open_preview"]).inc();

        let text = render().unwrap();
        assert!(text.contains("labelfetch_items_total{outcome=\"saved\"}"));
        assert!(text.contains("labelfetch_stage_failures_total{stage=\"open_preview\"}"));
    }

    #[test]
    fn test_render_twice() {
        // Each render uses a fresh registry.
        assert!(render().is_ok());
        assert!(render().is_ok());
    }
}
