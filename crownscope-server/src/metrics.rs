use metrics::counter;
use std::sync::atomic::{AtomicU64, Ordering};

/// Request counters for `/area`, exported at `/metrics`
#[derive(Debug, Default)]
pub struct ServiceMetrics {
    requests_total: AtomicU64,
    trees_detected_total: AtomicU64,
    invalid_requests_total: AtomicU64,
    failed_requests_total: AtomicU64,
    empty_results_total: AtomicU64,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        counter!("crownscope_requests_total").increment(1);
    }

    /// A completed analysis, with or without detections.
    pub fn record_analysis(&self, trees: usize) {
        if trees == 0 {
            self.empty_results_total.fetch_add(1, Ordering::Relaxed);
            counter!("crownscope_empty_results_total").increment(1);
        } else {
            self.trees_detected_total.fetch_add(trees as u64, Ordering::Relaxed);
            counter!("crownscope_trees_detected_total").increment(trees as u64);
        }
    }

    pub fn record_invalid(&self) {
        self.invalid_requests_total.fetch_add(1, Ordering::Relaxed);
        counter!("crownscope_invalid_requests_total").increment(1);
    }

    pub fn record_failure(&self) {
        self.failed_requests_total.fetch_add(1, Ordering::Relaxed);
        counter!("crownscope_failed_requests_total").increment(1);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn trees_detected_total(&self) -> u64 {
        self.trees_detected_total.load(Ordering::Relaxed)
    }

    pub fn render_prometheus(&self) -> String {
        let series = [
            ("crownscope_requests_total", "Total /area requests", &self.requests_total),
            ("crownscope_trees_detected_total", "Total tree crowns detected", &self.trees_detected_total),
            ("crownscope_invalid_requests_total", "Requests rejected as invalid input", &self.invalid_requests_total),
            ("crownscope_failed_requests_total", "Requests that failed during processing", &self.failed_requests_total),
            ("crownscope_empty_results_total", "Analyses with no trees detected", &self.empty_results_total),
        ];

        let mut out = String::new();
        for (name, help, value) in series {
            out.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {}\n",
                value.load(Ordering::Relaxed)
            ));
        }
        out
    }
}
