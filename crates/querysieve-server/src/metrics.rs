use prometheus::{
    histogram_opts, opts, Encoder, HistogramVec, IntCounterVec, Registry, TextEncoder,
};

/// Server metrics on a registry owned by the app state.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub filter_passes: IntCounterVec,
    pub error_responses: IntCounterVec,
    pub request_seconds: HistogramVec,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let filter_passes = IntCounterVec::new(
            opts!("querysieve_filter_passes_total", "List queries served by resource"),
            &["resource"],
        )?;
        let error_responses = IntCounterVec::new(
            opts!("querysieve_error_responses_total", "Error responses by status"),
            &["status"],
        )?;
        let request_seconds = HistogramVec::new(
            histogram_opts!(
                "querysieve_request_seconds",
                "Request latency",
                vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
            ),
            &["method"],
        )?;
        registry.register(Box::new(filter_passes.clone()))?;
        registry.register(Box::new(error_responses.clone()))?;
        registry.register(Box::new(request_seconds.clone()))?;
        Ok(Self {
            registry,
            filter_passes,
            error_responses,
            request_seconds,
        })
    }

    /// Text exposition format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        let _ = encoder.encode(&self.registry.gather(), &mut buf);
        String::from_utf8(buf).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_exposition() {
        let m = Metrics::new().unwrap();
        m.filter_passes.with_label_values(&["users"]).inc();
        m.error_responses.with_label_values(&["404"]).inc_by(2);
        let text = m.render();
        assert!(text.contains(r#"querysieve_filter_passes_total{resource="users"} 1"#));
        assert!(text.contains(r#"querysieve_error_responses_total{status="404"} 2"#));
    }

    #[test]
    fn registries_are_independent() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.filter_passes.with_label_values(&["users"]).inc();
        assert!(!b.render().contains("resource=\"users\""));
    }
}
