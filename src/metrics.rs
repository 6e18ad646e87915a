use axum::{routing::get, Router};
use metrics::{describe_counter, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Installs the Prometheus recorder and publishes the panel size.
    pub fn init(strategies: usize) -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder()?;

        describe_counter!("spamfilter_submissions_total", "Evaluated submissions by outcome");
        describe_counter!("spamfilter_rejected_total", "Submissions rejected as spam");
        describe_counter!("spamfilter_strategy_faults_total", "Strategy calls that failed or panicked");
        describe_counter!("spamfilter_strategy_timeouts_total", "Strategy calls cut off by the timeout");
        describe_histogram!("spamfilter_strategy_ms", "Strategy call latency in milliseconds");

        gauge!("spamfilter_strategies_registered").set(strategies as f64);

        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
