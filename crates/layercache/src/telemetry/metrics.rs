// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! OpenTelemetry instruments of one cache.

use std::time::Duration;

use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter, MeterProvider};
use opentelemetry::{InstrumentationScope, KeyValue};

use crate::telemetry::attributes;

const SCOPE: &str = "layercache";
const SCOPE_VERSION: &str = env!("CARGO_PKG_VERSION");
const SCHEMA_URL: &str = "https://opentelemetry.io/schemas/1.47.0";

/// Returns a meter scoped to this crate.
pub(crate) fn create_meter(provider: &dyn MeterProvider) -> Meter {
    let scope = InstrumentationScope::builder(SCOPE)
        .with_version(SCOPE_VERSION)
        .with_schema_url(SCHEMA_URL)
        .build();
    provider.meter_with_scope(scope)
}

/// Event counter, operation latency and local layer size.
#[derive(Debug)]
pub(crate) struct Instruments {
    events: Counter<u64>,
    durations: Histogram<f64>,
    size: Gauge<u64>,
}

impl Instruments {
    pub(crate) fn new(meter: &Meter) -> Self {
        Self {
            events: meter
                .u64_counter("cache.event.count")
                .with_description("Cache events by operation and activity")
                .with_unit("{event}")
                .build(),
            durations: meter
                .f64_histogram("cache.operation.duration")
                .with_description("Wall time of timed cache operations")
                .with_unit("s")
                .build(),
            size: meter
                .u64_gauge("cache.size")
                .with_description("Entries held by the local layer")
                .with_unit("{entry}")
                .build(),
        }
    }

    pub(crate) fn event(&self, name: &str, operation: &'static str, activity: &'static str, duration: Option<Duration>) {
        let attrs = [
            KeyValue::new(attributes::CACHE_NAME, name.to_string()),
            KeyValue::new(attributes::CACHE_OPERATION_NAME, operation),
            KeyValue::new(attributes::CACHE_ACTIVITY_NAME, activity),
        ];
        self.events.add(1, &attrs);
        if let Some(duration) = duration {
            self.durations.record(duration.as_secs_f64(), &attrs);
        }
    }

    pub(crate) fn size(&self, name: &str, entries: usize) {
        self.size
            .record(entries as u64, &[KeyValue::new(attributes::CACHE_NAME, name.to_string())]);
    }
}
