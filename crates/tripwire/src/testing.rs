// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::io::Write;
use std::sync::{Arc, Mutex};

use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::data::{AggregatedMetrics, MetricData, ResourceMetrics, ScopeMetrics};
use opentelemetry_sdk::metrics::{InMemoryMetricExporter, SdkMeterProvider};
use tracing_subscriber::fmt::MakeWriter;

use crate::HasErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FooKind {
    Foo,
    Bar,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FooError {
    pub(crate) kind: FooKind,
    pub(crate) val: u32,
}

impl FooError {
    pub(crate) fn new(val: u32) -> Self {
        Self { kind: FooKind::Foo, val }
    }

    pub(crate) fn bar(val: u32) -> Self {
        Self { kind: FooKind::Bar, val }
    }
}

impl std::fmt::Display for FooError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "foo error {}", self.val)
    }
}

impl std::error::Error for FooError {}

impl HasErrorKind for FooError {
    type Kind = FooKind;

    fn error_kind(&self) -> Self::Kind {
        self.kind
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BarError;

impl std::fmt::Display for BarError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("bar error")
    }
}

impl std::error::Error for BarError {}

/// Captures `tracing` output for assertions. Use with `set_default()` for thread-local capture.
#[derive(Debug, Clone, Default)]
pub(crate) struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn output(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock().unwrap()).to_string()
    }

    pub(crate) fn assert_contains(&self, expected: &str) {
        let output = self.output();
        assert!(output.contains(expected), "log output does not contain '{expected}', got:\n{output}");
    }

    pub(crate) fn subscriber(&self) -> impl tracing::Subscriber {
        use tracing_subscriber::layer::SubscriberExt;

        tracing_subscriber::registry().with(tracing_subscriber::fmt::layer().with_writer(self.clone()).with_ansi(false))
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogCaptureWriter {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

pub(crate) struct LogCaptureWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl Write for LogCaptureWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Collects `OTel` metrics exported by a circuit for assertions.
#[derive(Debug)]
pub(crate) struct MetricTester {
    exporter: InMemoryMetricExporter,
    provider: SdkMeterProvider,
}

impl MetricTester {
    pub(crate) fn new() -> Self {
        let exporter = InMemoryMetricExporter::default();

        Self {
            provider: SdkMeterProvider::builder().with_periodic_exporter(exporter.clone()).build(),
            exporter,
        }
    }

    pub(crate) fn meter_provider(&self) -> &SdkMeterProvider {
        &self.provider
    }

    /// Returns the attribute sets of every data point of the named metric.
    pub(crate) fn data_points(&self, metric_name: &str) -> Vec<Vec<KeyValue>> {
        self.provider.force_flush().unwrap();

        self.exporter
            .get_finished_metrics()
            .unwrap()
            .iter()
            .flat_map(ResourceMetrics::scope_metrics)
            .flat_map(ScopeMetrics::metrics)
            .filter(|metric| metric.name() == metric_name)
            .flat_map(|metric| match metric.data() {
                AggregatedMetrics::U64(MetricData::Sum(sum)) => sum
                    .data_points()
                    .map(|point| point.attributes().cloned().collect::<Vec<_>>())
                    .collect::<Vec<_>>(),
                _ => Vec::new(),
            })
            .collect()
    }

    /// Returns the total of the named counter over data points carrying all of the given attributes.
    pub(crate) fn sum(&self, metric_name: &str, expected: &[KeyValue]) -> u64 {
        self.latest_metric(metric_name, |data| match data {
            AggregatedMetrics::U64(MetricData::Sum(sum)) => Some(
                sum.data_points()
                    .filter(|point| expected.iter().all(|kv| point.attributes().any(|attr| attr == kv)))
                    .map(|point| point.value())
                    .sum(),
            ),
            _ => None,
        })
        .unwrap_or_default()
    }

    /// Returns the last recorded value of the named gauge for data points carrying all of the
    /// given attributes.
    pub(crate) fn gauge_value(&self, metric_name: &str, expected: &[KeyValue]) -> Option<f64> {
        self.latest_metric(metric_name, |data| match data {
            AggregatedMetrics::F64(MetricData::Gauge(gauge)) => gauge
                .data_points()
                .filter(|point| expected.iter().all(|kv| point.attributes().any(|attr| attr == kv)))
                .map(|point| point.value())
                .last(),
            _ => None,
        })
    }

    // Cumulative exports repeat earlier points, so only the most recent export is inspected.
    fn latest_metric<T>(&self, metric_name: &str, read: impl Fn(&AggregatedMetrics) -> Option<T>) -> Option<T> {
        self.provider.force_flush().unwrap();

        let exported = self.exporter.get_finished_metrics().unwrap();
        exported
            .last()?
            .scope_metrics()
            .flat_map(ScopeMetrics::metrics)
            .filter(|metric| metric.name() == metric_name)
            .find_map(|metric| read(metric.data()))
    }

    /// Asserts that one data point of the named metric carries all of the given attributes.
    pub(crate) fn assert_data_point(&self, metric_name: &str, expected: &[KeyValue]) {
        let points = self.data_points(metric_name);

        assert!(
            points.iter().any(|point| expected.iter().all(|kv| point.contains(kv))),
            "no data point of {metric_name} contains {expected:?}, got: {points:?}"
        );
    }
}
