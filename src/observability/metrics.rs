use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub refreshes_total: IntCounterVec,
    pub refresh_duration_seconds: HistogramVec,
    pub degraded_fetches_total: IntCounter,
    pub accepts_total: IntCounterVec,
    pub refusals_total: IntCounter,
    pub position_samples_total: IntCounterVec,
    pub candidates_on_board: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let refreshes_total = IntCounterVec::new(
            Opts::new("refreshes_total", "Total candidate refreshes by outcome"),
            &["outcome"],
        )
        .expect("valid refreshes_total metric");

        let refresh_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "refresh_duration_seconds",
                "Duration of refresh executions in seconds",
            ),
            &["outcome"],
        )
        .expect("valid refresh_duration_seconds metric");

        let degraded_fetches_total = IntCounter::new(
            "degraded_fetches_total",
            "Fetches served by the unfiltered legacy fallback (radius filtering not in effect)",
        )
        .expect("valid degraded_fetches_total metric");

        let accepts_total = IntCounterVec::new(
            Opts::new("accepts_total", "Accept attempts by outcome"),
            &["outcome"],
        )
        .expect("valid accepts_total metric");

        let refusals_total = IntCounter::new("refusals_total", "Reservations refused by the driver")
            .expect("valid refusals_total metric");

        let position_samples_total = IntCounterVec::new(
            Opts::new("position_samples_total", "Position sampling cycles by outcome"),
            &["outcome"],
        )
        .expect("valid position_samples_total metric");

        let candidates_on_board = IntGauge::new(
            "candidates_on_board",
            "Current number of new requests on the board",
        )
        .expect("valid candidates_on_board metric");

        registry
            .register(Box::new(refreshes_total.clone()))
            .expect("register refreshes_total");
        registry
            .register(Box::new(refresh_duration_seconds.clone()))
            .expect("register refresh_duration_seconds");
        registry
            .register(Box::new(degraded_fetches_total.clone()))
            .expect("register degraded_fetches_total");
        registry
            .register(Box::new(accepts_total.clone()))
            .expect("register accepts_total");
        registry
            .register(Box::new(refusals_total.clone()))
            .expect("register refusals_total");
        registry
            .register(Box::new(position_samples_total.clone()))
            .expect("register position_samples_total");
        registry
            .register(Box::new(candidates_on_board.clone()))
            .expect("register candidates_on_board");

        Self {
            registry,
            refreshes_total,
            refresh_duration_seconds,
            degraded_fetches_total,
            accepts_total,
            refusals_total,
            position_samples_total,
            candidates_on_board,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
