use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::collections::HashSet;

pub struct Metrics {
    request_counter: IntCounterVec,
    prediction_duration: HistogramVec,
    backend_failures: IntCounterVec,
    hands_detected: IntCounter,
    backends_available: IntGauge,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let request_counter = IntCounterVec::new(
            Opts::new("requests_total", "Total number of requests"),
            &["route"],
        )?;

        let boundaries = generate_boundaries((5, 25, 50, 250, 1000));
        let prediction_duration = HistogramVec::new(
            HistogramOpts::new(
                "prediction_duration_ms",
                "Duration of prediction operations in milliseconds",
            )
            .buckets(boundaries),
            &["route"],
        )?;

        let backend_failures = IntCounterVec::new(
            Opts::new(
                "backend_failures_total",
                "Backend invocations that produced no prediction",
            ),
            &["backend", "kind"],
        )?;

        let hands_detected = IntCounter::new(
            "hands_detected_total",
            "Hands for which at least one backend produced a prediction",
        )?;

        let backends_available =
            IntGauge::new("backends_available", "Classifier backends currently loaded")?;

        registry.register(Box::new(request_counter.clone()))?;
        registry.register(Box::new(prediction_duration.clone()))?;
        registry.register(Box::new(backend_failures.clone()))?;
        registry.register(Box::new(hands_detected.clone()))?;
        registry.register(Box::new(backends_available.clone()))?;

        Ok(Metrics {
            request_counter,
            prediction_duration,
            backend_failures,
            hands_detected,
            backends_available,
            registry,
        })
    }

    pub fn record_request(&self, route: &str) {
        self.request_counter.with_label_values(&[route]).inc();
    }

    pub fn record_prediction_duration(&self, duration_ms: u64, route: &str) {
        self.prediction_duration
            .with_label_values(&[route])
            .observe(duration_ms as f64);
    }

    pub fn record_backend_failure(&self, backend: &str, kind: &str) {
        self.backend_failures
            .with_label_values(&[backend, kind])
            .inc();
    }

    pub fn record_hands_detected(&self, hands: usize) {
        self.hands_detected.inc_by(hands as u64);
    }

    pub fn set_backends_available(&self, count: usize) {
        self.backends_available.set(count as i64);
    }

    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&metric_families, &mut buffer)?;

        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn generate_boundaries(parts: (i32, i32, i32, i32, i32)) -> Vec<f64> {
    let first_step: usize = 5;
    let middle_step: usize = 5;
    let end_step: usize = 50;
    let tail_step: usize = 250;
    let first_part = (parts.0..=parts.1).step_by(first_step);
    let middle_part = (parts.1..=parts.2).step_by(middle_step);
    let end_part = (parts.2..=parts.3).step_by(end_step);
    let tail_part = (parts.3..=parts.4).step_by(tail_step);

    let mut seen = HashSet::new();
    first_part
        .chain(middle_part)
        .chain(end_part)
        .chain(tail_part)
        .filter(|&x| seen.insert(x))
        .map(|x| x as f64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_boundaries() {
        let parts = (5, 15, 25, 125, 625);
        let get = generate_boundaries(parts);
        let expected = vec![5.0, 10.0, 15.0, 20.0, 25.0, 75.0, 125.0, 375.0, 625.0];

        assert_eq!(get, expected);
    }

    #[test]
    fn test_encode_exposes_recorded_metrics() {
        let metrics = Metrics::new().unwrap();
        metrics.record_request("/predict");
        metrics.record_backend_failure("landmark", "timeout");
        metrics.set_backends_available(1);

        let text = metrics.encode().unwrap();

        assert!(text.contains("requests_total{route=\"/predict\"} 1"));
        assert!(text.contains("backend_failures_total{backend=\"landmark\",kind=\"timeout\"} 1"));
        assert!(text.contains("backends_available 1"));
    }
}
