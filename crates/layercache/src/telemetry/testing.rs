// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Test helpers for asserting on logs and metrics.

use std::io::Write;
use std::sync::Arc;

use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::data::{AggregatedMetrics, Metric, MetricData, ResourceMetrics, ScopeMetrics};
use opentelemetry_sdk::metrics::{InMemoryMetricExporter, SdkMeterProvider};
use parking_lot::Mutex;
use tracing_subscriber::fmt::MakeWriter;

/// Collects metrics in memory and asserts on their attributes.
#[derive(Debug)]
pub(crate) struct MetricTester {
    exporter: InMemoryMetricExporter,
    provider: SdkMeterProvider,
}

impl MetricTester {
    pub fn new() -> Self {
        let exporter = InMemoryMetricExporter::default();
        Self {
            provider: SdkMeterProvider::builder().with_periodic_exporter(exporter.clone()).build(),
            exporter,
        }
    }

    pub fn meter_provider(&self) -> &SdkMeterProvider {
        &self.provider
    }

    pub fn assert_attributes_contain(&self, expected: &[KeyValue]) {
        self.provider.force_flush().expect("flush metrics");
        let collected: Vec<KeyValue> = self
            .exporter
            .get_finished_metrics()
            .expect("finished metrics")
            .iter()
            .flat_map(ResourceMetrics::scope_metrics)
            .flat_map(ScopeMetrics::metrics)
            .flat_map(attributes_of)
            .collect();

        for attr in expected {
            assert!(collected.contains(attr), "attribute {attr:?} not found in {collected:?}");
        }
    }
}

macro_rules! points {
    ($data:expr) => {
        match $data {
            MetricData::Gauge(d) => d.data_points().flat_map(|p| p.attributes().cloned()).collect::<Vec<_>>(),
            MetricData::Sum(d) => d.data_points().flat_map(|p| p.attributes().cloned()).collect::<Vec<_>>(),
            MetricData::Histogram(d) => d.data_points().flat_map(|p| p.attributes().cloned()).collect::<Vec<_>>(),
            MetricData::ExponentialHistogram(d) => d.data_points().flat_map(|p| p.attributes().cloned()).collect::<Vec<_>>(),
        }
    };
}

fn attributes_of(metric: &Metric) -> Vec<KeyValue> {
    match metric.data() {
        AggregatedMetrics::F64(data) => points!(data),
        AggregatedMetrics::U64(data) => points!(data),
        AggregatedMetrics::I64(data) => points!(data),
    }
}

/// Captures formatted `tracing` output in a shared buffer.
#[derive(Debug, Clone, Default)]
pub(crate) struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }

    pub fn assert_contains(&self, expected: &str) {
        let output = self.output();
        assert!(output.contains(expected), "log output does not contain '{expected}', got:\n{output}");
    }

    /// Returns a subscriber writing into this capture; install it with `set_default`.
    pub fn subscriber(&self) -> impl tracing::Subscriber {
        use tracing_subscriber::layer::SubscriberExt;
        tracing_subscriber::registry().with(tracing_subscriber::fmt::layer().with_writer(self.clone()).with_ansi(false))
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureWriter(Arc::clone(&self.buffer))
    }
}

pub(crate) struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

impl Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
